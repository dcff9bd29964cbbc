//! # Inbound Ports
//!
//! API the relay exposes to callers that want something submitted.

use crate::domain::{PayloadKey, RelayError, SubmissionPayload, SubmissionRecord};
use async_trait::async_trait;

/// Submission API - inbound port.
#[async_trait]
pub trait SubmissionApi: Send + Sync {
    /// Submit `payload` as a signed transaction.
    ///
    /// If a submission for the same payload key is still in flight, the
    /// existing record is returned and nothing is broadcast.
    async fn submit(&self, payload: SubmissionPayload) -> Result<SubmissionRecord, RelayError>;

    /// Latest record for `key`, live or archived.
    fn record(&self, key: &PayloadKey) -> Option<SubmissionRecord>;

    /// Records that are still pending or sent.
    fn in_flight(&self) -> Vec<SubmissionRecord>;
}
