use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use image::{ImageReader, Rgba, RgbaImage};
use tracing::{debug, warn};

use super::flash::{FlashRequest, FlashTrigger};
use super::{ServiceHandle, Worker};
use crate::config::{CameraConfig, SimulationConfig};
use crate::platform::shell::{CommandRunner, CommandTemplate, run_checked};

/// Something that produces one still per call.
pub trait Camera: Send {
    fn capture(&mut self) -> Result<RgbaImage>;
}

/// Camera driven by an external capture command such as `rpicam-still`.
pub struct CommandCamera {
    runner: CommandRunner,
    template: CommandTemplate,
    scratch: PathBuf,
}

impl CommandCamera {
    pub fn new(cfg: &CameraConfig, runner: CommandRunner) -> Self {
        Self {
            runner,
            template: CommandTemplate::new(cfg.command.clone()),
            scratch: cfg.scratch_path.clone(),
        }
    }
}

impl Camera for CommandCamera {
    fn capture(&mut self) -> Result<RgbaImage> {
        match fs::remove_file(&self.scratch) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to clear stale capture {}", self.scratch.display())
                });
            }
        }
        let command = self.template.render(&self.scratch);
        run_checked(&self.runner, &command).context("capture command failed")?;
        let frame = ImageReader::open(&self.scratch)
            .with_context(|| format!("capture command produced no {}", self.scratch.display()))?
            .with_guessed_format()?
            .decode()
            .with_context(|| format!("failed to decode {}", self.scratch.display()))?;
        Ok(frame.to_rgba8())
    }
}

/// Camera stand-in returning a fixed still or a generated test card.
pub struct SyntheticCamera {
    still: Option<RgbaImage>,
    size: (u32, u32),
    latency: Duration,
    shots: u32,
}

impl SyntheticCamera {
    pub const DEFAULT_SIZE: (u32, u32) = (1014, 540);

    pub fn new(still: Option<RgbaImage>, latency: Duration) -> Self {
        Self {
            still,
            size: Self::DEFAULT_SIZE,
            latency,
            shots: 0,
        }
    }

    pub fn from_config(cfg: &SimulationConfig) -> Result<Self> {
        let still = cfg
            .camera_still
            .as_ref()
            .map(|path| {
                image::open(path)
                    .map(|img| img.to_rgba8())
                    .with_context(|| format!("failed to load simulated still {}", path.display()))
            })
            .transpose()?;
        Ok(Self::new(still, cfg.camera_latency))
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = (width.max(1), height.max(1));
        self
    }

    fn test_card(&self) -> RgbaImage {
        let (width, height) = self.size;
        let tint = (self.shots.wrapping_mul(67) % 256) as u8;
        RgbaImage::from_fn(width, height, |x, y| {
            let r = (x * 255 / width) as u8;
            let g = (y * 255 / height) as u8;
            Rgba([r, g, tint, 255])
        })
    }
}

impl Camera for SyntheticCamera {
    fn capture(&mut self) -> Result<RgbaImage> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        self.shots = self.shots.wrapping_add(1);
        debug!(shot = self.shots, "simulated capture");
        Ok(match &self.still {
            Some(still) => still.clone(),
            None => self.test_card(),
        })
    }
}

/// Fires the flash and takes one still per request.
pub struct CaptureWorker {
    camera: Box<dyn Camera>,
    flash: Option<FlashTrigger>,
}

impl CaptureWorker {
    pub fn new(camera: Box<dyn Camera>, flash: Option<FlashTrigger>) -> Self {
        Self { camera, flash }
    }
}

impl Worker for CaptureWorker {
    type Request = ();
    type Output = Arc<RgbaImage>;
    const NAME: &'static str = "capture";

    fn perform(&mut self, (): ()) -> Result<Arc<RgbaImage>> {
        if let Some(flash) = &self.flash
            && let Err(err) = flash.request(FlashRequest::Fire)
        {
            warn!(error = %err, "flash unavailable; capturing without it");
        }
        let frame = self.camera.capture()?;
        debug!(width = frame.width(), height = frame.height(), "frame captured");
        Ok(Arc::new(frame))
    }
}

pub type CaptureService = ServiceHandle<CaptureWorker>;

impl ServiceHandle<CaptureWorker> {
    /// Start a capture; poll [`ServiceHandle::take_result`] for the frame.
    pub fn start_photo(&self) -> Result<u64, crate::error::ServiceError> {
        self.request(())
    }
}
