use std::cell::Cell;
use std::collections::VecDeque;
use std::ptr;

use dsa_common::completion::{self, CompletionRecord};
use dsa_common::descriptor::{OpFlags, Opcode, WorkDescriptor};

use crate::portal::{PostResult, WorkQueue};

/// One scripted device response, consumed per doorbell post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimStep {
    /// Reject the post: the queue reports full.
    Busy,
    /// Accept, copy the full remaining length, report success.
    Complete,
    /// Accept, copy `after` bytes, then report a recoverable page fault on a
    /// write access at the first uncopied destination byte.
    WriteFault { after: u32 },
    /// Accept, copy `after` bytes, then report a recoverable page fault on a
    /// read access at the first uncopied source byte.
    ReadFault { after: u32 },
    /// Accept and report a hard failure with the given raw status, moving
    /// nothing.
    Fail { status: u8 },
    /// Accept and never write the completion record.
    Silent,
}

/// Software model of a dedicated work queue, driven by a response script.
///
/// Each post consumes the next [`SimStep`]; an exhausted script models a
/// permanently full queue. Accepted descriptors are executed immediately and
/// synchronously: the model dereferences the source, destination, and
/// completion addresses exactly like the device would, so posted descriptors
/// must reference buffers that stay live for the whole transfer.
///
/// The model also records what a protocol test wants to assert on: every
/// accepted descriptor, the number of posts and fences, and whether a stale
/// non-zero completion status was ever visible at post time.
#[derive(Debug, Default)]
pub struct SimQueue {
    script: VecDeque<SimStep>,
    /// Doorbell posts observed, including rejected ones.
    pub posts: u32,
    /// Copies of every accepted descriptor, in submission order.
    pub submitted: Vec<WorkDescriptor>,
    /// Set if an accepted post found the completion record not re-zeroed.
    pub stale_status_seen: bool,
    fences: Cell<u32>,
}

impl SimQueue {
    pub fn new(script: impl IntoIterator<Item = SimStep>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Store fences observed.
    pub fn fences(&self) -> u32 {
        self.fences.get()
    }
}

impl WorkQueue for SimQueue {
    fn fence(&self) {
        self.fences.set(self.fences.get() + 1);
    }

    fn post(&mut self, desc: &WorkDescriptor) -> PostResult {
        self.posts += 1;
        let Some(step) = self.script.pop_front() else {
            return PostResult::Busy;
        };
        if step == SimStep::Busy {
            return PostResult::Busy;
        }

        assert_eq!(desc.opcode(), Opcode::MemMove as u8, "sim device only models memory move");
        assert!(
            desc.flags()
                .contains(OpFlags::REQUEST_COMPLETION_RECORD | OpFlags::COMPLETION_ADDR_VALID),
            "descriptor must request a completion record for the poller to make progress"
        );
        assert!(desc.xfer_size > 0, "zero-length descriptor reached the device");

        self.submitted.push(*desc);

        // SAFETY: completion_addr points at the live record the submitter
        // bound into the descriptor.
        let comp = unsafe { &*(desc.completion_addr as *const CompletionRecord) };
        if comp.status() != completion::PENDING {
            self.stale_status_seen = true;
        }

        match step {
            SimStep::Busy => unreachable!(),
            SimStep::Silent => {}
            SimStep::Complete => execute(desc, desc.xfer_size, desc.xfer_size, completion::SUCCESS, 0),
            SimStep::WriteFault { after } => {
                // The claimed count is forwarded as-is so a device that
                // overstates its progress can be modelled; only in-bounds
                // bytes actually move.
                let copied = after.min(desc.xfer_size);
                let status = completion::PAGE_FAULT_NOBOF | completion::FAULT_WRITE;
                execute(desc, copied, after, status, desc.dst_addr + u64::from(copied));
            }
            SimStep::ReadFault { after } => {
                let copied = after.min(desc.xfer_size);
                execute(desc, copied, after, completion::PAGE_FAULT_NOBOF, desc.src_addr + u64::from(copied));
            }
            SimStep::Fail { status } => {
                assert_ne!(status, completion::PENDING, "a completion status of zero never arrives");
                execute(desc, 0, 0, status, 0);
            }
        }
        PostResult::Accepted
    }
}

/// Performs the device side of one accepted descriptor: copy a prefix, then
/// publish the completion record, payload before status. `claimed` may
/// exceed the remaining length to model a misbehaving device; `copy_len`
/// never does.
fn execute(desc: &WorkDescriptor, copy_len: u32, claimed: u32, status: u8, fault_addr: u64) {
    // SAFETY: the descriptor addresses were derived from live buffers owned
    // by the caller of mem_move; `copy_len <= xfer_size` keeps the copy in
    // bounds, and ptr::copy gives the memmove overlap semantics the real
    // device has.
    unsafe {
        ptr::copy(desc.src_addr as *const u8, desc.dst_addr as *mut u8, copy_len as usize);
    }
    // SAFETY: as for the stale-status check above.
    let comp = unsafe { &*(desc.completion_addr as *const CompletionRecord) };
    comp.complete(status, claimed, fault_addr);
}
