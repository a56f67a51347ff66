//! Bulk dispatch: job description and the controller that runs it.

pub mod controller;
pub mod job;

pub use controller::{
    DispatchController, DispatchOutcome, DispatchProgress, DispatchStarted, DispatchState,
    DispatchSummary,
};
pub use job::{Attachment, DispatchJob, MAX_MESSAGE_CHARS};
