//! Outbound request encoding
//!
//! Requests are rendered into caller-supplied byte buffers. Each encoder runs
//! twice over the same field list: once against a byte counter to learn the
//! exact size, then against the destination. A request that does not fit
//! fails with `BufferTooSmall` before a single byte is written, so the
//! destination never holds a truncated document.

use crate::error::{JobsError, JobsResult};
use crate::protocol::status::JobExecutionStatus;
use std::fmt::{self, Write};

/// `statusDetails` value attached to an update or start-next request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDetails<'a> {
    /// Pre-serialized JSON object, emitted verbatim
    Object(&'a str),
    /// Plain text, emitted as an escaped JSON string
    Text(&'a str),
}

impl<'a> StatusDetails<'a> {
    /// A well-formed JSON object is passed through; anything else,
    /// including text that merely starts with `{`, is sent as a string
    pub fn detect(details: &'a str) -> Self {
        let is_object = details.trim_start().starts_with('{')
            && serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(details).is_ok();
        if is_object {
            StatusDetails::Object(details)
        } else {
            StatusDetails::Text(details)
        }
    }
}

/// Report the status of one job execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateRequest<'a> {
    /// 0 means do not check
    pub expected_version: i64,
    /// 0 means latest
    pub execution_number: i64,
    pub status: JobExecutionStatus,
    pub status_details: Option<StatusDetails<'a>>,
    pub include_job_execution_state: bool,
    pub include_job_document: bool,
    pub client_token: Option<&'a str>,
}

impl<'a> UpdateRequest<'a> {
    pub fn new(status: JobExecutionStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_status_details(mut self, details: StatusDetails<'a>) -> Self {
        self.status_details = Some(details);
        self
    }

    pub fn with_client_token(mut self, token: &'a str) -> Self {
        self.client_token = Some(token);
        self
    }
}

/// Fetch one job execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescribeRequest<'a> {
    /// 0 means latest
    pub execution_number: i64,
    pub include_job_document: bool,
    pub client_token: Option<&'a str>,
}

/// Start the next pending execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartNextPendingRequest<'a> {
    pub status_details: Option<StatusDetails<'a>>,
    pub client_token: Option<&'a str>,
}

/// Body for bodiless queries such as GetPending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryRequest<'a> {
    pub client_token: Option<&'a str>,
}

pub fn encode_update(request: &UpdateRequest<'_>, dest: &mut [u8]) -> JobsResult<usize> {
    let status = request.status.as_wire_str().ok_or_else(|| {
        JobsError::invalid_request(format!("cannot send update with status {}", request.status))
    })?;

    encode_bounded(dest, |obj| {
        obj.string_field("status", status)?;
        if let Some(details) = request.status_details {
            obj.details_field(details)?;
        }
        if request.expected_version != 0 {
            obj.int_field("expectedVersion", request.expected_version)?;
        }
        if request.execution_number != 0 {
            obj.int_field("executionNumber", request.execution_number)?;
        }
        obj.bool_field("includeJobExecutionState", request.include_job_execution_state)?;
        obj.bool_field("includeJobDocument", request.include_job_document)?;
        if let Some(token) = request.client_token {
            obj.string_field("clientToken", token)?;
        }
        Ok(())
    })
}

pub fn encode_describe(request: &DescribeRequest<'_>, dest: &mut [u8]) -> JobsResult<usize> {
    encode_bounded(dest, |obj| {
        if request.execution_number != 0 {
            obj.int_field("executionNumber", request.execution_number)?;
        }
        obj.bool_field("includeJobDocument", request.include_job_document)?;
        if let Some(token) = request.client_token {
            obj.string_field("clientToken", token)?;
        }
        Ok(())
    })
}

pub fn encode_start_next_pending(
    request: &StartNextPendingRequest<'_>,
    dest: &mut [u8],
) -> JobsResult<usize> {
    encode_bounded(dest, |obj| {
        if let Some(details) = request.status_details {
            obj.details_field(details)?;
        }
        if let Some(token) = request.client_token {
            obj.string_field("clientToken", token)?;
        }
        Ok(())
    })
}

pub fn encode_query(request: &QueryRequest<'_>, dest: &mut [u8]) -> JobsResult<usize> {
    encode_bounded(dest, |obj| {
        if let Some(token) = request.client_token {
            obj.string_field("clientToken", token)?;
        }
        Ok(())
    })
}

/// Measure, then write if the result fits
fn encode_bounded<F>(dest: &mut [u8], fields: F) -> JobsResult<usize>
where
    F: Fn(&mut ObjectWriter<'_>) -> fmt::Result,
{
    let mut counter = ByteCounter(0);
    write_object(&mut counter, &fields).map_err(|_| {
        JobsError::invalid_request("request could not be rendered")
    })?;
    let needed = counter.0;

    if needed > dest.len() {
        return Err(JobsError::BufferTooSmall {
            needed,
            capacity: dest.len(),
        });
    }

    let mut writer = SliceWriter { dest, len: 0 };
    write_object(&mut writer, &fields).map_err(|_| JobsError::BufferTooSmall {
        needed,
        capacity: writer.dest.len(),
    })?;
    Ok(writer.len)
}

fn write_object<F>(sink: &mut dyn Write, fields: &F) -> fmt::Result
where
    F: Fn(&mut ObjectWriter<'_>) -> fmt::Result,
{
    sink.write_char('{')?;
    let mut obj = ObjectWriter { sink, first: true };
    fields(&mut obj)?;
    obj.sink.write_char('}')
}

struct ObjectWriter<'s> {
    sink: &'s mut dyn Write,
    first: bool,
}

impl ObjectWriter<'_> {
    fn key(&mut self, key: &str) -> fmt::Result {
        if !self.first {
            self.sink.write_char(',')?;
        }
        self.first = false;
        write_json_string(self.sink, key)?;
        self.sink.write_char(':')
    }

    fn string_field(&mut self, key: &str, value: &str) -> fmt::Result {
        self.key(key)?;
        write_json_string(self.sink, value)
    }

    fn int_field(&mut self, key: &str, value: i64) -> fmt::Result {
        self.key(key)?;
        write!(self.sink, "{value}")
    }

    fn bool_field(&mut self, key: &str, value: bool) -> fmt::Result {
        self.key(key)?;
        self.sink.write_str(if value { "true" } else { "false" })
    }

    fn details_field(&mut self, details: StatusDetails<'_>) -> fmt::Result {
        match details {
            StatusDetails::Object(raw) => {
                self.key("statusDetails")?;
                self.sink.write_str(raw)
            }
            StatusDetails::Text(text) => self.string_field("statusDetails", text),
        }
    }
}

fn write_json_string(sink: &mut dyn Write, value: &str) -> fmt::Result {
    sink.write_char('"')?;
    for ch in value.chars() {
        match ch {
            '"' => sink.write_str("\\\"")?,
            '\\' => sink.write_str("\\\\")?,
            '\n' => sink.write_str("\\n")?,
            '\r' => sink.write_str("\\r")?,
            '\t' => sink.write_str("\\t")?,
            '\u{08}' => sink.write_str("\\b")?,
            '\u{0c}' => sink.write_str("\\f")?,
            c if (c as u32) < 0x20 => write!(sink, "\\u{:04x}", c as u32)?,
            c => sink.write_char(c)?,
        }
    }
    sink.write_char('"')
}

struct ByteCounter(usize);

impl Write for ByteCounter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

struct SliceWriter<'b> {
    dest: &'b mut [u8],
    len: usize,
}

impl Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        let slot = self.dest.get_mut(self.len..end).ok_or(fmt::Error)?;
        slot.copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}
