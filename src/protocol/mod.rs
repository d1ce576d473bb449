//! Jobs wire protocol
//!
//! Topic names, the status codec and the outbound request encoders. Nothing in
//! here touches the transport.

pub mod requests;
pub mod status;
pub mod topics;

pub use requests::{
    encode_describe, encode_query, encode_start_next_pending, encode_update, DescribeRequest,
    QueryRequest, StartNextPendingRequest, StatusDetails, UpdateRequest,
};
pub use status::{status_to_string, string_to_status, JobExecutionStatus};
pub use topics::{
    build_topic, topic_matches_filter, JobId, JobOperation, JobTopic, ReplyFilter,
    MAX_JOB_ID_LEN, MAX_JOB_TOPIC_LEN, MAX_THING_NAME_LEN,
};
