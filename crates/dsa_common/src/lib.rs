//! Common hardware definitions shared across the DSA offload system.
//!
//! This crate provides the fixed wire layouts the Data Streaming Accelerator
//! consumes and produces: the 64-byte work descriptor, the 32-byte completion
//! record, and the opcode/flag/status encodings that tie them together. The
//! definitions are used by the submission protocol, the hardware backend, and
//! the simulated device model, and must match the device specification
//! bit-for-bit.

#![no_std]

// Work queue portal geometry.
//
// A dedicated work queue exposes one doorbell page. Descriptors are handed to
// the device by a single 64-byte store into that page, so both the portal
// mapping size and the descriptor alignment are fixed by hardware.
pub mod portal {
    /// Size of the mapped doorbell region for one work queue.
    ///
    /// The portal is a single page; any 64-byte-aligned offset within it
    /// accepts a descriptor. The mapping collaborator maps exactly this much.
    pub const PORTAL_SIZE: usize = 4096;

    /// Size of one work descriptor in bytes.
    ///
    /// The doorbell instruction transfers exactly this many bytes as one
    /// atomic store, which is why the descriptor layout may never grow.
    pub const DESCRIPTOR_SIZE: usize = 64;

    /// Required alignment of a work descriptor.
    ///
    /// The 64-byte doorbell store requires a naturally aligned source
    /// operand; an unaligned descriptor is undefined at the hardware level.
    pub const DESCRIPTOR_ALIGN: usize = 64;
}

/// Work descriptor layout and construction.
///
/// A descriptor describes one operation for the accelerator. Exactly one
/// descriptor is outstanding per transfer in this design; on a partial
/// completion the same descriptor is shrunk in place and resubmitted.
pub mod descriptor {
    use bitflags::bitflags;

    /// Bit position of the opcode within the second descriptor dword.
    ///
    /// The low 24 bits of that dword carry the operation flags; the opcode
    /// occupies the top byte.
    pub const OPCODE_SHIFT: u32 = 24;

    /// Operation codes understood by the accelerator.
    ///
    /// Only `MemMove` is issued by this system; the neighbouring codes are
    /// listed to document the encoding space.
    #[repr(u8)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Opcode {
        /// No operation; completes immediately.
        Nop = 0x00,
        /// Process a batch of descriptors from memory.
        Batch = 0x01,
        /// Wait for previously submitted descriptors to complete.
        Drain = 0x02,
        /// Copy `xfer_size` bytes from source to destination. Overlapping
        /// regions are handled like `memmove`.
        MemMove = 0x03,
        /// Fill the destination with a repeating pattern.
        Fill = 0x04,
    }

    bitflags! {
        /// Operation flags carried in the low 24 bits of the flags/opcode dword.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct OpFlags: u32 {
            /// Order this descriptor after prior descriptors in a batch.
            const FENCE = 0x0001;
            /// Block on page faults instead of reporting a partial completion.
            const BLOCK_ON_FAULT = 0x0002;
            /// The completion record address field is valid. Must be set
            /// whenever `REQUEST_COMPLETION_RECORD` is set.
            const COMPLETION_ADDR_VALID = 0x0004;
            /// Write a completion record when the operation finishes. The
            /// poller relies on this: without it a successful operation never
            /// updates the status byte.
            const REQUEST_COMPLETION_RECORD = 0x0008;
            /// Raise a completion interrupt. Unused here; this design polls.
            const REQUEST_COMPLETION_INTERRUPT = 0x0010;
            /// Hint to direct data writes into the CPU cache.
            const CACHE_CONTROL = 0x0200;
        }
    }

    /// One unit of work for the accelerator, in device wire format.
    ///
    /// The record is 64 bytes and 64-byte aligned because it is transferred
    /// to the doorbell by a single atomic wide store. Addresses are device
    /// virtual addresses; in a user work queue they equal process virtual
    /// addresses.
    #[repr(C, align(64))]
    #[derive(Debug, Clone, Copy)]
    pub struct WorkDescriptor {
        /// Process address space ID and privilege bits. Left zero from user
        /// space; the kernel fills the PASID on submission.
        pub pasid: u32,
        /// Operation flags in bits 0..24, opcode in bits 24..32.
        pub flags_opcode: u32,
        /// Address the device writes the completion record to.
        pub completion_addr: u64,
        /// Source address of the transfer.
        pub src_addr: u64,
        /// Destination address of the transfer.
        pub dst_addr: u64,
        /// Remaining transfer length in bytes. Must be non-zero.
        pub xfer_size: u32,
        /// Interrupt handle; unused when polling.
        pub int_handle: u16,
        _rsvd: [u8; 26],
    }

    impl WorkDescriptor {
        /// Builds a memory-move descriptor covering `xfer_size` bytes.
        ///
        /// The flags request a completion record (with a valid record
        /// address) and cache-directed writes, matching the polling protocol:
        /// the submitter spins on the record this descriptor points at.
        ///
        /// Callers must validate the inputs first; the device treats a zero
        /// length or an inaccessible address as undefined behaviour.
        pub fn memmove(src_addr: u64, dst_addr: u64, xfer_size: u32, completion_addr: u64) -> Self {
            let flags =
                OpFlags::REQUEST_COMPLETION_RECORD | OpFlags::COMPLETION_ADDR_VALID | OpFlags::CACHE_CONTROL;
            Self {
                pasid: 0,
                flags_opcode: ((Opcode::MemMove as u32) << OPCODE_SHIFT) | flags.bits(),
                completion_addr,
                src_addr,
                dst_addr,
                xfer_size,
                int_handle: 0,
                _rsvd: [0; 26],
            }
        }

        /// Shrinks the descriptor past `bytes` already completed by the device.
        ///
        /// Used when resuming after a recoverable partial fault: both
        /// addresses advance and the remaining length drops by the same
        /// amount, so the resubmitted descriptor covers only the tail.
        pub fn advance(&mut self, bytes: u32) {
            debug_assert!(bytes <= self.xfer_size);
            self.src_addr += u64::from(bytes);
            self.dst_addr += u64::from(bytes);
            self.xfer_size -= bytes;
        }

        /// Operation code encoded in this descriptor.
        pub fn opcode(&self) -> u8 {
            (self.flags_opcode >> OPCODE_SHIFT) as u8
        }

        /// Operation flags encoded in this descriptor.
        pub fn flags(&self) -> OpFlags {
            OpFlags::from_bits_truncate(self.flags_opcode & ((1 << OPCODE_SHIFT) - 1))
        }
    }
}

/// Completion record layout and status encodings.
///
/// The device writes the record asynchronously after processing a
/// descriptor. The zero-to-nonzero transition of the status byte is the only
/// synchronization point between the device and the submitting thread, so the
/// submitter must zero the byte before every doorbell post and read it
/// volatilely while waiting.
pub mod completion {
    use core::cell::UnsafeCell;

    /// Status byte value meaning "not yet completed".
    ///
    /// The poller treats this as the pending sentinel; every other value
    /// means the device has finished with the descriptor.
    pub const PENDING: u8 = 0x00;

    /// The operation completed fully.
    pub const SUCCESS: u8 = 0x01;

    /// The operation stalled on a non-resident page with block-on-fault
    /// disabled. A prefix of the transfer completed; the record carries the
    /// faulting address and the completed byte count. This is the only
    /// recoverable status.
    pub const PAGE_FAULT_NOBOF: u8 = 0x03;

    /// Mask extracting the operation result from the status byte. The
    /// remaining bit carries auxiliary fault information.
    pub const CODE_MASK: u8 = 0x7f;

    /// Status bit set when a reported fault happened on a write access.
    pub const FAULT_WRITE: u8 = 0x80;

    /// Operation-result subcode of a raw status byte.
    pub fn code(status: u8) -> u8 {
        status & CODE_MASK
    }

    /// Whether a fault status reports a write access (as opposed to a read).
    pub fn is_write_fault(status: u8) -> bool {
        status & FAULT_WRITE != 0
    }

    /// Device-written record reporting the outcome of one descriptor.
    ///
    /// 32 bytes, 32-byte aligned so it never straddles a cache line. The
    /// device-written fields live in `UnsafeCell`s because the producer
    /// mutates them while the submitter holds a shared reference; `UnsafeCell`
    /// has the same in-memory representation as its payload, so the wire
    /// layout is unchanged. The payload fields are valid only once the status
    /// byte is non-zero.
    #[repr(C, align(32))]
    #[derive(Debug)]
    pub struct CompletionRecord {
        status: UnsafeCell<u8>,
        _result: UnsafeCell<u8>,
        _rsvd: u16,
        bytes_completed: UnsafeCell<u32>,
        fault_addr: UnsafeCell<u64>,
        _rsvd2: [u64; 2],
    }

    impl CompletionRecord {
        /// A zeroed (pending) record, ready to be bound to a descriptor.
        pub const fn new() -> Self {
            Self {
                status: UnsafeCell::new(PENDING),
                _result: UnsafeCell::new(0),
                _rsvd: 0,
                bytes_completed: UnsafeCell::new(0),
                fault_addr: UnsafeCell::new(0),
                _rsvd2: [0; 2],
            }
        }

        /// Reads the status byte.
        ///
        /// Volatile because the device updates the field outside the
        /// compiler's view; a plain read could be hoisted out of a poll loop.
        pub fn status(&self) -> u8 {
            // SAFETY: the cell always holds an initialized byte.
            unsafe { self.status.get().read_volatile() }
        }

        /// Bytes completed before a partial fault. Meaningful only when the
        /// status subcode is [`PAGE_FAULT_NOBOF`].
        pub fn bytes_completed(&self) -> u32 {
            // SAFETY: read only after a non-zero status has been observed
            // behind an acquire fence; the device no longer writes by then.
            unsafe { *self.bytes_completed.get() }
        }

        /// Address that faulted, for fault statuses.
        pub fn fault_addr(&self) -> u64 {
            // SAFETY: as for `bytes_completed`.
            unsafe { *self.fault_addr.get() }
        }

        /// Re-arms the record for the next submission attempt.
        ///
        /// Must run before every doorbell post so a stale status from a
        /// previous attempt can never satisfy the poller.
        pub fn reset(&mut self) {
            // SAFETY: exclusive access; no submission is outstanding while
            // the consumer re-arms the record.
            unsafe { self.status.get().write_volatile(PENDING) }
        }

        /// Publishes an outcome the way the device does: payload fields
        /// first, then the status byte last.
        ///
        /// This is the producer side of the record; only a device (or a
        /// device model) calls it, through a shared reference.
        pub fn complete(&self, status: u8, bytes_completed: u32, fault_addr: u64) {
            // SAFETY: the cells make shared-reference writes sound, and the
            // consumer reads the payload only after observing the status.
            unsafe {
                *self.bytes_completed.get() = bytes_completed;
                *self.fault_addr.get() = fault_addr;
                self.status.get().write_volatile(status);
            }
        }
    }

    impl Default for CompletionRecord {
        fn default() -> Self {
            Self::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use core::mem::{align_of, size_of};

    use super::completion::{self, CompletionRecord};
    use super::descriptor::{OpFlags, Opcode, WorkDescriptor};
    use super::portal;

    #[test]
    fn descriptor_matches_wire_layout() {
        assert_eq!(size_of::<WorkDescriptor>(), portal::DESCRIPTOR_SIZE);
        assert_eq!(align_of::<WorkDescriptor>(), portal::DESCRIPTOR_ALIGN);
    }

    #[test]
    fn completion_record_matches_wire_layout() {
        assert_eq!(size_of::<CompletionRecord>(), 32);
        assert_eq!(align_of::<CompletionRecord>(), 32);
    }

    #[test]
    fn memmove_descriptor_encodes_opcode_and_flags() {
        let desc = WorkDescriptor::memmove(0x1000, 0x2000, 512, 0x3000);
        assert_eq!(desc.opcode(), Opcode::MemMove as u8);
        assert_eq!(
            desc.flags(),
            OpFlags::REQUEST_COMPLETION_RECORD | OpFlags::COMPLETION_ADDR_VALID | OpFlags::CACHE_CONTROL
        );
        assert_eq!(desc.src_addr, 0x1000);
        assert_eq!(desc.dst_addr, 0x2000);
        assert_eq!(desc.xfer_size, 512);
        assert_eq!(desc.completion_addr, 0x3000);
    }

    #[test]
    fn advance_shrinks_toward_the_tail() {
        let mut desc = WorkDescriptor::memmove(0x1000, 0x2000, 512, 0x3000);
        desc.advance(128);
        assert_eq!(desc.src_addr, 0x1080);
        assert_eq!(desc.dst_addr, 0x2080);
        assert_eq!(desc.xfer_size, 384);
    }

    #[test]
    fn status_byte_decomposes_into_code_and_direction() {
        assert_eq!(completion::code(completion::PAGE_FAULT_NOBOF | completion::FAULT_WRITE), completion::PAGE_FAULT_NOBOF);
        assert!(completion::is_write_fault(0x83));
        assert!(!completion::is_write_fault(0x03));
        assert_eq!(completion::code(completion::SUCCESS), completion::SUCCESS);
    }

    #[test]
    fn complete_publishes_status_and_payload() {
        let comp = CompletionRecord::new();
        comp.complete(completion::PAGE_FAULT_NOBOF | completion::FAULT_WRITE, 4096, 0x1000);
        assert_eq!(comp.status(), 0x83);
        assert_eq!(comp.bytes_completed(), 4096);
        assert_eq!(comp.fault_addr(), 0x1000);
    }

    #[test]
    fn reset_rearms_a_completed_record() {
        let mut comp = CompletionRecord::new();
        comp.complete(completion::SUCCESS, 0, 0);
        comp.reset();
        assert_eq!(comp.status(), completion::PENDING);
    }
}
