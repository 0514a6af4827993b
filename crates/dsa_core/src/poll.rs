use std::sync::atomic::{Ordering, fence};

use dsa_common::completion::{self, CompletionRecord};

use crate::DsaError;

/// Busy-waits until the device writes a non-zero status into `comp`, up to
/// `budget` iterations.
///
/// Each iteration issues a CPU pause hint to ease contention and power while
/// spinning. There is no sleeping and no interrupt path: the workload targets
/// device latencies where yielding would cost more than the wait itself.
///
/// On success the raw status byte is returned after an acquire fence, so the
/// record's remaining fields and the destination buffer may be read safely.
/// Exhausting the budget is terminal for the transfer.
pub fn wait_for_completion(comp: &CompletionRecord, budget: u32) -> Result<u8, DsaError> {
    for _ in 0..budget {
        let status = comp.status();
        if status != completion::PENDING {
            // The device writes the payload fields before the status byte;
            // pair that with an acquire before reading them.
            fence(Ordering::Acquire);
            return Ok(status);
        }
        std::hint::spin_loop();
    }
    Err(DsaError::PollRetryExceeded { iterations: budget })
}

#[cfg(test)]
mod tests {
    use dsa_common::completion::{self, CompletionRecord};

    use super::wait_for_completion;
    use crate::DsaError;

    #[test]
    fn observes_an_already_written_status() {
        let comp = CompletionRecord::new();
        comp.complete(completion::SUCCESS, 0, 0);
        assert_eq!(wait_for_completion(&comp, 16), Ok(completion::SUCCESS));
    }

    #[test]
    fn silent_device_consumes_exactly_the_budget() {
        let comp = CompletionRecord::new();
        let err = wait_for_completion(&comp, 10_000).unwrap_err();
        assert_eq!(err, DsaError::PollRetryExceeded { iterations: 10_000 });
    }
}
