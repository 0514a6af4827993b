//! Hardware-agnostic work submission protocol for the DSA offload system.
//!
//! This crate implements the handshake between a submitting thread and an
//! accelerator work queue: posting a descriptor through a doorbell with
//! bounded retry, spin-polling the completion record, interpreting the
//! completion status, and transparently resuming a transfer after a
//! recoverable partial page fault. The hardware-specific pieces (the fence
//! and the doorbell store) sit behind the [`WorkQueue`] trait so the protocol
//! runs unmodified against real hardware or the simulated device model.

use thiserror::Error;

/// Completion interpretation and the submit/poll/resume state machine.
pub mod engine;

/// Bounded spin poller for the completion record.
pub mod poll;

/// The narrow portal capability the protocol drives.
pub mod portal;

/// Scripted in-process device model for protocol tests.
pub mod sim;

/// Bounded-retry doorbell submitter.
pub mod submit;

pub use engine::{RetryLimits, TransferReport, mem_move};
pub use portal::{PostResult, WorkQueue};

/// Default number of doorbell post attempts before a submission is declared
/// failed. A dedicated queue in good health accepts on the first attempt.
pub const ENQ_RETRY_MAX: u32 = 1024;

/// Default number of poll iterations before a completion wait is declared
/// failed. This bounds wait time as a policy choice; it does not imply the
/// device will never complete.
pub const POLL_RETRY_MAX: u32 = 10_000_000;

/// Terminal outcomes of a transfer, one variant per reportable failure.
///
/// Everything here is fatal to the transfer: transient conditions (a full
/// queue, a still-running operation, a recoverable fault) are retried or
/// resumed internally and only promoted to an error once their budget is
/// exhausted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DsaError {
    /// The requested length cannot be expressed in a descriptor.
    #[error("transfer of {len} bytes is outside the supported range 1..={max}")]
    InvalidTransferSize { len: usize, max: u32 },

    /// Source and destination regions differ in length.
    #[error("source length {src} does not match destination length {dst}")]
    LengthMismatch { src: usize, dst: usize },

    /// The work queue reported full for every attempt in the budget.
    #[error("work queue enqueue retry limit exceeded after {attempts} attempts")]
    EnqueueRetryExceeded { attempts: u32 },

    /// The completion record stayed pending for the whole poll budget.
    #[error("completion status poll retry limit exceeded after {iterations} iterations")]
    PollRetryExceeded { iterations: u32 },

    /// The device claimed more completed bytes than the descriptor covered.
    #[error("device reported {completed} bytes completed with only {remaining} remaining")]
    CompletionOverrun { completed: u32, remaining: u32 },

    /// The device reported a non-recoverable status for the descriptor.
    #[error("descriptor failed with status {status:#04x}")]
    DescriptorFailed { status: u8 },
}
