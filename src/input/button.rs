use std::time::{Duration, Instant};

use tracing::debug;

/// Drops transitions that follow the previous accepted one too closely.
#[derive(Debug, Clone)]
pub struct Debouncer {
    debounce: Duration,
    last_transition: Option<Instant>,
}

impl Debouncer {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            last_transition: None,
        }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_transition
            && now.saturating_duration_since(last) < self.debounce
        {
            debug!("debounced transition");
            return false;
        }
        self.last_transition = Some(now);
        true
    }
}

/// Doubling reconnect delay, capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub const INITIAL: Duration = Duration::from_secs(1);
    pub const MAX: Duration = Duration::from_secs(30);

    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            next: initial,
            initial,
            max,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Self::INITIAL, Self::MAX)
    }
}

#[cfg(target_os = "linux")]
pub use device::spawn_button_listener;

#[cfg(target_os = "linux")]
mod device {
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::str::FromStr;
    use std::thread::{self, JoinHandle};
    use std::time::Instant;

    use anyhow::{Context, Result, anyhow, bail};
    use crossbeam_channel::Sender;
    use evdev::{Device, EventSummary, KeyCode};
    use tracing::{debug, info, warn};

    use super::{Backoff, Debouncer};
    use crate::config::TriggerConfig;
    use crate::events::InputEvent;

    /// Watch the GPIO button (exposed by `gpio-keys`) and send a trigger per press.
    pub fn spawn_button_listener(cfg: TriggerConfig, tx: Sender<InputEvent>) -> Result<JoinHandle<()>> {
        let key = KeyCode::from_str(&cfg.button_key)
            .map_err(|_| anyhow!("unknown key code: {}", cfg.button_key))?;
        thread::Builder::new()
            .name("button".into())
            .spawn(move || listen(cfg, key, tx))
            .context("failed to spawn button listener")
    }

    fn listen(cfg: TriggerConfig, key: KeyCode, tx: Sender<InputEvent>) {
        let mut backoff = Backoff::default();
        let mut debouncer = Debouncer::new(cfg.debounce);
        loop {
            let (mut device, path) = match open_device(cfg.button_device.as_deref(), key) {
                Ok(found) => found,
                Err(err) => {
                    let delay = backoff.next_delay();
                    warn!(error = %err, retry_in = ?delay, "button device unavailable");
                    thread::sleep(delay);
                    continue;
                }
            };
            backoff.reset();
            info!(device = %path.display(), ?key, "listening for trigger button");

            loop {
                let events = match device.fetch_events() {
                    Ok(events) => events,
                    Err(err) => {
                        warn!(device = %path.display(), error = %err, "button device lost");
                        break;
                    }
                };
                for event in events {
                    if let EventSummary::Key(_, code, 1) = event.destructure()
                        && code == key
                        && debouncer.accept(Instant::now())
                        && tx.send(InputEvent::Trigger).is_err()
                    {
                        debug!("input channel closed; button listener exiting");
                        return;
                    }
                }
            }
        }
    }

    fn open_device(configured: Option<&Path>, key: KeyCode) -> Result<(Device, PathBuf)> {
        if let Some(path) = configured {
            let device =
                Device::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            ensure_key(&device, path, key)?;
            return Ok((device, path.to_path_buf()));
        }
        for dir in ["/dev/input/by-path", "/dev/input"] {
            if let Some(found) = scan_dir(Path::new(dir), key)? {
                return Ok(found);
            }
        }
        bail!("no input devices advertising {key:?} found");
    }

    fn scan_dir(dir: &Path, key: KeyCode) -> Result<Option<(Device, PathBuf)>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read directory {}", dir.display()));
            }
        };

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| name.contains("event"))
            })
            .collect();
        candidates.sort();

        for path in candidates {
            let device = match Device::open(&path) {
                Ok(device) => device,
                Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                    warn!(device = %path.display(), "no permission to read device");
                    continue;
                }
                Err(err) => {
                    debug!(device = %path.display(), error = %err, "skipping device");
                    continue;
                }
            };
            if ensure_key(&device, &path, key).is_ok() {
                return Ok(Some((device, path)));
            }
        }
        Ok(None)
    }

    fn ensure_key(device: &Device, path: &Path, key: KeyCode) -> Result<()> {
        let Some(keys) = device.supported_keys() else {
            bail!("{} does not advertise any keys", path.display());
        };
        if !keys.contains(key) {
            bail!("{} does not support {key:?}", path.display());
        }
        Ok(())
    }
}
