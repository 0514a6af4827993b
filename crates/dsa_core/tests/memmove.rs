//! End-to-end protocol tests against the scripted device model.

use dsa_core::sim::{SimQueue, SimStep};
use dsa_core::{DsaError, RetryLimits, mem_move};
use rand::RngCore;

const LEN: usize = 10240;

fn limits() -> RetryLimits {
    RetryLimits::default()
}

#[test]
fn immediate_success_moves_every_byte() {
    let src = vec![0xAAu8; LEN];
    let mut dst = vec![0xBBu8; LEN];
    let mut wq = SimQueue::new([SimStep::Complete]);

    let report = mem_move(&mut wq, &src, &mut dst, &limits()).unwrap();

    assert_eq!(dst, src);
    assert_eq!(report.bytes, LEN);
    assert_eq!(report.faults_resumed, 0);
    assert_eq!(wq.posts, 1);
    assert_eq!(wq.fences(), 1);
}

#[test]
fn random_contents_survive_the_transfer() {
    let mut src = vec![0u8; LEN];
    rand::thread_rng().fill_bytes(&mut src);
    let mut dst = vec![0u8; LEN];
    let mut wq = SimQueue::new([SimStep::Complete]);

    mem_move(&mut wq, &src, &mut dst, &limits()).unwrap();
    assert_eq!(dst, src);
}

#[test]
fn write_fault_resumes_with_only_the_tail() {
    let src = vec![0xAAu8; LEN];
    let mut dst = vec![0xBBu8; LEN];
    let mut wq = SimQueue::new([SimStep::WriteFault { after: 4096 }, SimStep::Complete]);

    let report = mem_move(&mut wq, &src, &mut dst, &limits()).unwrap();

    assert_eq!(dst, src);
    assert_eq!(report.faults_resumed, 1);
    assert_eq!(wq.submitted.len(), 2);

    let first = &wq.submitted[0];
    let resumed = &wq.submitted[1];
    assert_eq!(first.xfer_size, LEN as u32);
    assert_eq!(resumed.src_addr, first.src_addr + 4096);
    assert_eq!(resumed.dst_addr, first.dst_addr + 4096);
    assert_eq!(resumed.xfer_size, LEN as u32 - 4096);
}

#[test]
fn read_fault_is_resumed_the_same_way() {
    let src = vec![0x5Au8; LEN];
    let mut dst = vec![0u8; LEN];
    let mut wq = SimQueue::new([SimStep::ReadFault { after: 512 }, SimStep::Complete]);

    let report = mem_move(&mut wq, &src, &mut dst, &limits()).unwrap();
    assert_eq!(dst, src);
    assert_eq!(report.faults_resumed, 1);
}

#[test]
fn every_resume_preserves_the_length_invariant() {
    let src = vec![0xC3u8; LEN];
    let mut dst = vec![0u8; LEN];
    let mut wq = SimQueue::new([
        SimStep::WriteFault { after: 1000 },
        SimStep::WriteFault { after: 2000 },
        SimStep::ReadFault { after: 96 },
        SimStep::Complete,
    ]);

    let report = mem_move(&mut wq, &src, &mut dst, &limits()).unwrap();
    assert_eq!(dst, src);
    assert_eq!(report.faults_resumed, 3);

    // original_length == bytes_completed_so_far + remaining_length,
    // at every iteration.
    let mut completed = 0u64;
    for (desc, done) in wq.submitted.iter().zip([1000u64, 2000, 96]) {
        assert_eq!(completed + u64::from(desc.xfer_size), LEN as u64);
        completed += done;
    }
    assert_eq!(wq.submitted.last().unwrap().xfer_size as u64, LEN as u64 - completed);
}

#[test]
fn completion_record_is_rezeroed_before_every_attempt() {
    let src = vec![0x11u8; LEN];
    let mut dst = vec![0u8; LEN];
    let mut wq = SimQueue::new([
        SimStep::WriteFault { after: 64 },
        SimStep::Busy,
        SimStep::WriteFault { after: 64 },
        SimStep::Complete,
    ]);

    mem_move(&mut wq, &src, &mut dst, &limits()).unwrap();
    assert!(!wq.stale_status_seen);
    // One fence per submission round, not per doorbell attempt.
    assert_eq!(wq.fences(), 3);
}

#[test]
fn transient_busy_is_retried_within_one_submission() {
    let src = vec![0x22u8; LEN];
    let mut dst = vec![0u8; LEN];
    let mut wq = SimQueue::new([SimStep::Busy, SimStep::Busy, SimStep::Complete]);

    mem_move(&mut wq, &src, &mut dst, &limits()).unwrap();
    assert_eq!(wq.posts, 3);
    assert_eq!(wq.fences(), 1);
}

#[test]
fn permanently_full_queue_exhausts_the_enqueue_budget() {
    let src = vec![0u8; 64];
    let mut dst = vec![0u8; 64];
    let mut wq = SimQueue::new([]);
    let limits = RetryLimits { enqueue: 32, ..limits() };

    let err = mem_move(&mut wq, &src, &mut dst, &limits).unwrap_err();
    assert_eq!(err, DsaError::EnqueueRetryExceeded { attempts: 32 });
    assert_eq!(wq.posts, 32);
}

#[test]
fn silent_device_exhausts_the_poll_budget_and_leaves_dst_alone() {
    let src = vec![0xAAu8; LEN];
    let mut dst = vec![0xBBu8; LEN];
    let mut wq = SimQueue::new([SimStep::Silent]);
    let limits = RetryLimits { poll: 5000, ..limits() };

    let err = mem_move(&mut wq, &src, &mut dst, &limits).unwrap_err();
    assert_eq!(err, DsaError::PollRetryExceeded { iterations: 5000 });
    assert!(dst.iter().all(|&b| b == 0xBB));
}

#[test]
fn overrun_completed_count_is_a_hard_failure() {
    let src = vec![0u8; 64];
    let mut dst = vec![0u8; 64];
    let mut wq = SimQueue::new([SimStep::WriteFault { after: 65 }]);

    let err = mem_move(&mut wq, &src, &mut dst, &limits()).unwrap_err();
    assert_eq!(
        err,
        DsaError::CompletionOverrun { completed: 65, remaining: 64 }
    );
}

#[test]
fn hard_failure_surfaces_the_raw_status() {
    let src = vec![0u8; 64];
    let mut dst = vec![0u8; 64];
    let mut wq = SimQueue::new([SimStep::Fail { status: 0x10 }]);

    let err = mem_move(&mut wq, &src, &mut dst, &limits()).unwrap_err();
    assert_eq!(err, DsaError::DescriptorFailed { status: 0x10 });
}

#[test]
fn zero_length_is_rejected_before_any_post() {
    let mut wq = SimQueue::new([SimStep::Complete]);
    let err = mem_move(&mut wq, &[], &mut [], &limits()).unwrap_err();
    assert_eq!(
        err,
        DsaError::InvalidTransferSize { len: 0, max: u32::MAX }
    );
    assert_eq!(wq.posts, 0);
}

#[test]
fn mismatched_lengths_are_rejected() {
    let src = vec![0u8; 128];
    let mut dst = vec![0u8; 64];
    let mut wq = SimQueue::new([SimStep::Complete]);

    let err = mem_move(&mut wq, &src, &mut dst, &limits()).unwrap_err();
    assert_eq!(err, DsaError::LengthMismatch { src: 128, dst: 64 });
}
