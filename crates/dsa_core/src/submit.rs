use dsa_common::descriptor::WorkDescriptor;
use log::trace;

use crate::portal::{PostResult, WorkQueue};
use crate::DsaError;

/// Posts `desc` to the work queue, retrying a full queue up to `budget`
/// attempts in total.
///
/// Retries are immediate: a full dedicated queue drains in well under a
/// microsecond, so backing off would cost more than spinning. Exhausting the
/// budget is terminal; no higher layer retries a failed submission.
///
/// The caller must have fenced after its last descriptor write and zeroed the
/// completion record before calling.
pub fn post_with_retry<Q: WorkQueue>(wq: &mut Q, desc: &WorkDescriptor, budget: u32) -> Result<(), DsaError> {
    for attempt in 0..budget {
        if wq.post(desc) == PostResult::Accepted {
            trace!("descriptor accepted on attempt {}", attempt + 1);
            return Ok(());
        }
    }
    Err(DsaError::EnqueueRetryExceeded { attempts: budget })
}

#[cfg(test)]
mod tests {
    use dsa_common::completion::CompletionRecord;
    use dsa_common::descriptor::WorkDescriptor;

    use super::post_with_retry;
    use crate::sim::{SimQueue, SimStep};
    use crate::DsaError;

    fn pinned_descriptor(comp: &mut CompletionRecord) -> WorkDescriptor {
        WorkDescriptor::memmove(0, 0, 1, &raw mut *comp as u64)
    }

    #[test]
    fn accepts_after_transient_busy() {
        let mut comp = CompletionRecord::new();
        let desc = pinned_descriptor(&mut comp);
        let mut wq = SimQueue::new([SimStep::Busy, SimStep::Busy, SimStep::Silent]);

        post_with_retry(&mut wq, &desc, 8).unwrap();
        assert_eq!(wq.posts, 3);
    }

    #[test]
    fn permanently_full_queue_consumes_exactly_the_budget() {
        let mut comp = CompletionRecord::new();
        let desc = pinned_descriptor(&mut comp);
        // An empty script models a queue that reports full forever.
        let mut wq = SimQueue::new([]);

        let err = post_with_retry(&mut wq, &desc, 1024).unwrap_err();
        assert_eq!(err, DsaError::EnqueueRetryExceeded { attempts: 1024 });
        assert_eq!(wq.posts, 1024);
    }
}
