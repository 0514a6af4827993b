use dsa_common::descriptor::WorkDescriptor;

/// Outcome of one doorbell post attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostResult {
    /// The device accepted the descriptor and now owns it until it writes
    /// the completion record.
    Accepted,
    /// The queue was momentarily full; the post may be retried immediately.
    Busy,
}

/// The doorbell-post capability of a mapped work queue.
///
/// This is the only hardware-specific seam in the protocol. The real backend
/// implements `fence` with a store fence instruction and `post` with a single
/// atomic 64-byte doorbell store; the simulated device implements them in
/// software. Everything above this trait is portable.
pub trait WorkQueue {
    /// Orders all prior ordinary memory writes ahead of the next post.
    ///
    /// Must execute between the last write to the descriptor or completion
    /// record and the doorbell store, otherwise the device may observe a
    /// partially written descriptor or a stale completion status.
    fn fence(&self);

    /// Attempts to hand `desc` to the device with one doorbell store.
    ///
    /// Returns [`PostResult::Busy`] when the queue rejected the post. After
    /// [`PostResult::Accepted`] the descriptor must not be mutated and the
    /// completion record must not be reset until the device reports back.
    fn post(&mut self, desc: &WorkDescriptor) -> PostResult;
}
