use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::debug;

const EXPORT_SETTLE_ATTEMPTS: u32 = 20;
const EXPORT_SETTLE_DELAY: Duration = Duration::from_millis(25);

/// An output line driven through the sysfs GPIO interface.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    pin: u32,
    value_path: PathBuf,
}

impl SysfsGpio {
    /// Export `pin` under `root` (normally `/sys/class/gpio`) and configure it as an output.
    pub fn open_output(root: &Path, pin: u32) -> Result<Self> {
        let line_dir = root.join(format!("gpio{pin}"));
        if !line_dir.exists() {
            fs::write(root.join("export"), pin.to_string())
                .with_context(|| format!("failed to export GPIO {pin} via {}", root.display()))?;
            wait_for_line(&line_dir)?;
            debug!(pin, path = %line_dir.display(), "exported GPIO line");
        }

        let direction = line_dir.join("direction");
        fs::write(&direction, "out")
            .with_context(|| format!("failed to set {} to output", direction.display()))?;

        Ok(Self {
            pin,
            value_path: line_dir.join("value"),
        })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn set(&self, high: bool) -> Result<()> {
        fs::write(&self.value_path, if high { "1" } else { "0" })
            .with_context(|| format!("failed to write {}", self.value_path.display()))
    }
}

// udev applies permissions to freshly exported lines asynchronously.
fn wait_for_line(line_dir: &Path) -> Result<()> {
    for _ in 0..EXPORT_SETTLE_ATTEMPTS {
        if line_dir.join("value").exists() {
            return Ok(());
        }
        thread::sleep(EXPORT_SETTLE_DELAY);
    }
    bail!("{} did not appear after export", line_dir.display())
}
