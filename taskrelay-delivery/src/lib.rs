//! Durable delivery of execution records to the master
//!
//! Records are staged on disk by [`ResultBuffer`] before any network I/O and
//! only removed after the master acknowledged them. [`DeliveryPipeline`]
//! drives the immediate send and the periodic resend sweep.

pub mod buffer;
pub mod error;
pub mod pipeline;
pub mod sender;

pub use buffer::{is_staged_name, staged_name, ResultBuffer};
pub use error::{DeliveryError, Result};
pub use pipeline::{DeliveryPipeline, ReportOutcome, SweepSummary};
pub use sender::{HttpSender, RecordSender, JSON_CONTENT_TYPE};
