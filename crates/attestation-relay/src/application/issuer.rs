//! # Request Issuer
//!
//! Submits one attestation request, either once or repeatedly at a fixed
//! interval until stopped.

use crate::domain::{AttestationRequest, RelayError, SubmissionPayload, SubmissionRecord};
use crate::ports::SubmissionApi;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Request issuer.
pub struct RequestIssuer {
    api: Arc<dyn SubmissionApi>,
    request: AttestationRequest,
    interval: Duration,
}

impl RequestIssuer {
    /// Issue `request` through `api` every `interval`.
    pub fn new(api: Arc<dyn SubmissionApi>, request: AttestationRequest, interval: Duration) -> Self {
        Self {
            api,
            request,
            interval,
        }
    }

    /// Submit the request a single time.
    pub async fn issue_once(&self) -> Result<SubmissionRecord, RelayError> {
        let record = self
            .api
            .submit(SubmissionPayload::Request(self.request))
            .await?;
        info!(
            id = %hex::encode(self.request.request_id),
            status = ?record.status,
            "[relay] Attestation request submitted"
        );
        Ok(record)
    }

    /// Resubmit until `shutdown` flips to `true`. Returns the number of
    /// submissions made.
    ///
    /// Failures are logged and do not stop the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut issued = 0u64;
        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.issue_once().await {
                error!("[relay] Attestation request failed: {}", e);
            }
            issued += 1;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(issued, "[relay] Request issuer stopped");
        issued
    }
}
