use dsa_common::completion::{self, CompletionRecord};
use dsa_common::descriptor::WorkDescriptor;
use log::{debug, warn};

use crate::portal::WorkQueue;
use crate::{DsaError, ENQ_RETRY_MAX, POLL_RETRY_MAX, poll, submit};

/// Retry budgets for one transfer. Both budgets apply afresh to every
/// resumed attempt after a recoverable fault.
#[derive(Debug, Clone, Copy)]
pub struct RetryLimits {
    /// Doorbell post attempts per submission.
    pub enqueue: u32,
    /// Poll iterations per submission.
    pub poll: u32,
}

impl Default for RetryLimits {
    fn default() -> Self {
        Self {
            enqueue: ENQ_RETRY_MAX,
            poll: POLL_RETRY_MAX,
        }
    }
}

/// Summary of a successfully completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    /// Total bytes moved.
    pub bytes: usize,
    /// Recoverable page faults that were resolved and resumed along the way.
    pub faults_resumed: u32,
}

/// Protocol state for one transfer.
///
/// `Submitting` and `Polling` cycle through the retry loop; the terminal
/// outcomes (success, hard failure, exhausted budget) leave the loop through
/// `Completed` or through an error return.
enum State {
    /// Re-arm the completion record, fence, and post the descriptor.
    Submitting,
    /// Spin on the completion record until the device reports back.
    Polling,
    /// Interpret a device-written status byte.
    Completed(u8),
}

/// Moves `src` into `dst` through the accelerator work queue.
///
/// Builds one memory-move descriptor and drives it to a terminal state:
/// doorbell post with bounded retry, bounded spin poll, then completion
/// interpretation. A recoverable partial page fault is resolved by touching
/// the faulting page and resubmitting a descriptor for the remaining tail, so
/// completed work is never redone.
///
/// The regions may overlap; the device gives `memmove` semantics. Lengths
/// must match, be non-zero, and fit the descriptor's 32-bit size field.
/// The device's own maximum transfer capability is not probed here and
/// remains a caller obligation.
///
/// Once a post is accepted the descriptor cannot be withdrawn; there is no
/// cancellation path, only the retry budgets in `limits`.
pub fn mem_move<Q: WorkQueue>(
    wq: &mut Q,
    src: &[u8],
    dst: &mut [u8],
    limits: &RetryLimits,
) -> Result<TransferReport, DsaError> {
    if src.len() != dst.len() {
        return Err(DsaError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    let total = src.len();
    if total == 0 || total > u32::MAX as usize {
        return Err(DsaError::InvalidTransferSize {
            len: total,
            max: u32::MAX,
        });
    }

    let mut comp = CompletionRecord::new();
    let mut desc = WorkDescriptor::memmove(
        src.as_ptr() as u64,
        dst.as_mut_ptr() as u64,
        total as u32,
        &raw mut comp as u64,
    );

    let mut completed: usize = 0;
    let mut faults_resumed: u32 = 0;
    let mut state = State::Submitting;

    loop {
        state = match state {
            State::Submitting => {
                comp.reset();
                wq.fence();
                submit::post_with_retry(wq, &desc, limits.enqueue)?;
                State::Polling
            }
            State::Polling => State::Completed(poll::wait_for_completion(&comp, limits.poll)?),
            State::Completed(status) => {
                if status == completion::SUCCESS {
                    completed += desc.xfer_size as usize;
                    debug_assert_eq!(completed, total);
                    debug!("memmove of {total} bytes complete after {faults_resumed} resumed faults");
                    return Ok(TransferReport {
                        bytes: total,
                        faults_resumed,
                    });
                } else if completion::code(status) == completion::PAGE_FAULT_NOBOF {
                    let done = comp.bytes_completed();
                    // A completed count past the remaining length is a
                    // protocol violation, not a resumable fault; resuming
                    // would wrap the length into a wild descriptor.
                    if done > desc.xfer_size {
                        return Err(DsaError::CompletionOverrun {
                            completed: done,
                            remaining: desc.xfer_size,
                        });
                    }
                    warn!(
                        "recoverable page fault at {:#x} after {done} of {} bytes; resuming",
                        comp.fault_addr(),
                        desc.xfer_size
                    );
                    touch(comp.fault_addr(), completion::is_write_fault(status));
                    completed += done as usize;
                    desc.advance(done);
                    debug_assert_eq!(completed + desc.xfer_size as usize, total);
                    faults_resumed += 1;
                    State::Submitting
                } else {
                    return Err(DsaError::DescriptorFailed { status });
                }
            }
        };
    }
}

/// Forces the OS to back the page containing `addr`.
///
/// A read fault needs only a load; a write fault needs the byte written back
/// so a copy-on-write or not-yet-dirtied page becomes writable to the device.
fn touch(addr: u64, write: bool) {
    let p = addr as *mut u8;
    // SAFETY: the device reports fault addresses inside the source or
    // destination region of the in-flight descriptor, which the caller of
    // mem_move keeps borrowed for the duration of the transfer.
    unsafe {
        let byte = p.read_volatile();
        if write {
            p.write_volatile(byte);
        }
    }
}
