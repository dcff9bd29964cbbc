//! # Application Module
//!
//! Application services orchestrating the domain and outbound ports.

pub mod aggregator;
pub mod collector;
pub mod issuer;
pub mod service;
pub mod submission;

pub use aggregator::{BufferAggregator, IngestOutcome};
pub use collector::{CollectorSettings, EventCollector, PollOutcome};
pub use issuer::RequestIssuer;
pub use service::{BufferFinalizer, RelayService};
pub use submission::{SubmissionDriver, SubmissionPolicy};
