use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::PortalError;

const DSA_SYSFS: &str = "/sys/bus/dsa/devices";
const DSA_DEV_DIR: &str = "/dev/dsa";

/// Finds the device node of an enabled, dedicated, user-mode work queue.
///
/// Scans the kernel's DSA bus for `wq*` entries and takes the first one that
/// is user-type, dedicated-mode, enabled, and has a matching `/dev/dsa` node.
/// [`PortalError::NoUsableQueue`] is a fatal precondition of any transfer and
/// must not be retried.
pub fn find_dedicated_queue() -> Result<PathBuf, PortalError> {
    scan(Path::new(DSA_SYSFS), Path::new(DSA_DEV_DIR))
}

fn scan(sysfs: &Path, dev_dir: &Path) -> Result<PathBuf, PortalError> {
    let entries = fs::read_dir(sysfs).map_err(|_| PortalError::NoUsableQueue)?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("wq") {
            continue;
        }
        let wq = entry.path();
        let mode = attr(&wq, "mode");
        let wq_type = attr(&wq, "type");
        let state = attr(&wq, "state");
        if mode.as_deref() != Some("dedicated")
            || wq_type.as_deref() != Some("user")
            || state.as_deref() != Some("enabled")
        {
            debug!(
                "skipping {name}: mode={mode:?} type={wq_type:?} state={state:?}"
            );
            continue;
        }
        let node = dev_dir.join(name.as_ref());
        if !node.exists() {
            debug!("skipping {name}: no device node at {}", node.display());
            continue;
        }
        info!("using dedicated work queue {name}");
        return Ok(node);
    }
    Err(PortalError::NoUsableQueue)
}

fn attr(wq: &Path, name: &str) -> Option<String> {
    fs::read_to_string(wq.join(name))
        .ok()
        .map(|value| value.trim().to_string())
}
