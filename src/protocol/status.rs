//! Job execution status codec
//!
//! Maps the closed set of job execution statuses to and from the strings the
//! Jobs service puts on the wire. Unrecognized strings are not an error: they
//! decode to [`JobExecutionStatus::Unknown`].

use std::fmt;

pub const QUEUED_STR: &str = "QUEUED";
pub const IN_PROGRESS_STR: &str = "IN_PROGRESS";
pub const FAILED_STR: &str = "FAILED";
pub const SUCCEEDED_STR: &str = "SUCCEEDED";
pub const CANCELED_STR: &str = "CANCELED";
pub const REJECTED_STR: &str = "REJECTED";

/// Status of a single job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JobExecutionStatus {
    /// Uninitialized default, never transmitted
    #[default]
    NotSet,
    Queued,
    InProgress,
    Failed,
    Succeeded,
    Canceled,
    Rejected,
    /// Any status string outside the supported list
    Unknown,
}

impl JobExecutionStatus {
    /// Every status that has a wire representation
    pub const TRANSMITTABLE: [JobExecutionStatus; 6] = [
        JobExecutionStatus::Queued,
        JobExecutionStatus::InProgress,
        JobExecutionStatus::Failed,
        JobExecutionStatus::Succeeded,
        JobExecutionStatus::Canceled,
        JobExecutionStatus::Rejected,
    ];

    /// Wire string for this status, `None` for `NotSet` and `Unknown`
    pub fn as_wire_str(self) -> Option<&'static str> {
        match self {
            JobExecutionStatus::Queued => Some(QUEUED_STR),
            JobExecutionStatus::InProgress => Some(IN_PROGRESS_STR),
            JobExecutionStatus::Failed => Some(FAILED_STR),
            JobExecutionStatus::Succeeded => Some(SUCCEEDED_STR),
            JobExecutionStatus::Canceled => Some(CANCELED_STR),
            JobExecutionStatus::Rejected => Some(REJECTED_STR),
            JobExecutionStatus::NotSet | JobExecutionStatus::Unknown => None,
        }
    }

    /// Case-sensitive exact match against the wire strings
    pub fn from_wire_str(s: &str) -> Self {
        match s {
            QUEUED_STR => JobExecutionStatus::Queued,
            IN_PROGRESS_STR => JobExecutionStatus::InProgress,
            FAILED_STR => JobExecutionStatus::Failed,
            SUCCEEDED_STR => JobExecutionStatus::Succeeded,
            CANCELED_STR => JobExecutionStatus::Canceled,
            REJECTED_STR => JobExecutionStatus::Rejected,
            _ => JobExecutionStatus::Unknown,
        }
    }

    /// Terminal statuses end the execution; the service will not hand it out again
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobExecutionStatus::Failed
                | JobExecutionStatus::Succeeded
                | JobExecutionStatus::Canceled
                | JobExecutionStatus::Rejected
        )
    }
}

/// `statusToString` in free-function form
pub fn status_to_string(status: JobExecutionStatus) -> Option<&'static str> {
    status.as_wire_str()
}

/// `stringToStatus` in free-function form
pub fn string_to_status(s: &str) -> JobExecutionStatus {
    JobExecutionStatus::from_wire_str(s)
}

impl fmt::Display for JobExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_wire_str() {
            Some(s) => f.write_str(s),
            None if *self == JobExecutionStatus::NotSet => f.write_str("NOT_SET"),
            None => f.write_str("UNKNOWN"),
        }
    }
}
