use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::ptr;

use dsa_common::descriptor::WorkDescriptor;
use dsa_common::portal::PORTAL_SIZE;
use dsa_core::{PostResult, WorkQueue};
use log::debug;

use crate::PortalError;

/// An exclusively owned mapping of one dedicated work queue's doorbell page.
///
/// The portal is the submission session: descriptors are posted through it
/// for as long as it lives, and the page is unmapped when it drops, on every
/// exit path. Nothing here arbitrates between submitters; a dedicated queue
/// has exactly one.
#[derive(Debug)]
pub struct DedicatedPortal {
    base: *mut libc::c_void,
}

impl DedicatedPortal {
    /// Opens `path` (a `/dev/dsa/wqX.Y` node) and maps its doorbell page.
    ///
    /// The page is mapped write-only and populated up front so the first
    /// doorbell store does not take a soft fault on the submission path.
    pub fn open(path: &Path) -> Result<Self, PortalError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| PortalError::Open { path: path.into(), source })?;

        // SAFETY: plain file-backed mapping request; the result is checked
        // before use and the fd may be closed once the mapping exists.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                PORTAL_SIZE,
                libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_POPULATE,
                file.as_raw_fd(),
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(PortalError::Map(io::Error::last_os_error()));
        }

        debug!("mapped work queue portal {} ({PORTAL_SIZE} bytes)", path.display());
        Ok(Self { base })
    }
}

impl Drop for DedicatedPortal {
    fn drop(&mut self) {
        // SAFETY: base came from a successful mmap of PORTAL_SIZE bytes and
        // is unmapped exactly once.
        unsafe {
            libc::munmap(self.base, PORTAL_SIZE);
        }
    }
}

impl WorkQueue for DedicatedPortal {
    fn fence(&self) {
        // SFENCE drains prior ordinary stores (the descriptor and the zeroed
        // completion record) before the doorbell store can be issued.
        //
        // SAFETY: sfence has no operands and no side effects beyond ordering.
        unsafe { std::arch::x86_64::_mm_sfence() }
    }

    fn post(&mut self, desc: &WorkDescriptor) -> PostResult {
        // SAFETY: the portal page is mapped for writing for the lifetime of
        // self, and &WorkDescriptor guarantees a 64-byte-aligned, 64-byte
        // readable source.
        if unsafe { movdir64b(self.base.cast(), desc) } {
            PostResult::Busy
        } else {
            PostResult::Accepted
        }
    }
}

/// Posts one 64-byte descriptor to the portal atomically.
///
/// Returns true when the queue did not accept the post. On a dedicated queue
/// the store always lands; the flag check keeps the submitter correct on
/// portals with shared-queue semantics, where ZF reports a full queue.
///
/// # Safety
/// * `portal` must be a mapped, writable work queue portal.
/// * `desc` must be valid for a 64-byte read at 64-byte alignment.
#[inline(always)]
unsafe fn movdir64b(portal: *mut u8, desc: *const WorkDescriptor) -> bool {
    let full: u8;
    // MOVDIR64B (66 0F 38 F8 /r) with the portal in rax and the descriptor
    // memory operand in rdx, the same encoding the kernel uses.
    unsafe {
        std::arch::asm!(
            ".byte 0x66, 0x0f, 0x38, 0xf8, 0x02",
            "setz {full}",
            full = out(reg_byte) full,
            in("rax") portal,
            in("rdx") desc,
            options(nostack),
        );
    }
    full != 0
}
