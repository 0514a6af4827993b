//! x86_64/Linux backend for the DSA offload system.
//!
//! Implements the two hardware-specific pieces the protocol crate leaves
//! abstract: finding a usable dedicated work queue through the kernel's DSA
//! sysfs tree, and driving its mapped doorbell page with `SFENCE` +
//! `MOVDIR64B`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Sysfs scan for an enabled, dedicated, user-mode work queue.
pub mod discover;

/// Owned mapping of a work queue doorbell page.
pub mod portal;

pub use discover::find_dedicated_queue;
pub use portal::DedicatedPortal;

#[cfg(not(all(target_arch = "x86_64", target_os = "linux")))]
compile_error!("dsa_hw posts descriptors with MOVDIR64B through a Linux work queue node and requires x86_64-linux");

/// Failures establishing a work queue session. All of these are fatal
/// preconditions of a transfer and are never retried.
#[derive(Debug, Error)]
pub enum PortalError {
    /// No enabled dedicated user-mode work queue exists on this host.
    #[error("no usable dedicated work queue found")]
    NoUsableQueue,

    /// The work queue device node could not be opened.
    #[error("failed to open work queue {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The doorbell page could not be mapped.
    #[error("failed to map work queue portal: {0}")]
    Map(#[source] io::Error),
}
