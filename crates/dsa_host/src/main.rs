//! Demo driver: one offloaded memory move through a dedicated work queue,
//! verified byte-for-byte afterwards.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use dsa_core::{ENQ_RETRY_MAX, POLL_RETRY_MAX, RetryLimits, mem_move};
use dsa_hw::{DedicatedPortal, find_dedicated_queue};
use log::info;

#[derive(Parser)]
#[command(about = "Offload a memory move to a dedicated DSA work queue")]
struct Cli {
    /// Transfer length in bytes.
    #[arg(long, default_value_t = 10240)]
    length: usize,
    /// Work queue device node; discovered via sysfs when omitted.
    #[arg(long)]
    wq: Option<PathBuf>,
    /// Doorbell post attempts per submission.
    #[arg(long, default_value_t = ENQ_RETRY_MAX)]
    enqueue_retries: u32,
    /// Completion poll iterations per submission.
    #[arg(long, default_value_t = POLL_RETRY_MAX)]
    poll_retries: u32,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let src = vec![0xAAu8; cli.length];
    let mut dst = vec![0xBBu8; cli.length];

    let node = match cli.wq {
        Some(path) => path,
        None => find_dedicated_queue()?,
    };
    let mut portal = DedicatedPortal::open(&node)?;
    info!("moving {} bytes through {}", cli.length, node.display());

    let limits = RetryLimits {
        enqueue: cli.enqueue_retries,
        poll: cli.poll_retries,
    };
    let report = mem_move(&mut portal, &src, &mut dst, &limits)?;

    if dst != src {
        bail!("destination does not match source after {} bytes", report.bytes);
    }
    println!(
        "memmove successful: {} bytes, {} resumed faults",
        report.bytes, report.faults_resumed
    );
    Ok(())
}
