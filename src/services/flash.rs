use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::{Requester, ServiceHandle, Worker};
use crate::config::FlashConfig;
use crate::error::ServiceError;
use crate::platform::gpio::SysfsGpio;

/// Something that can switch the flash on and off.
pub trait FlashLine: Send {
    fn set_active(&mut self, active: bool) -> Result<()>;
}

/// Flash trigger wired to a sysfs GPIO line.
#[derive(Debug)]
pub struct GpioFlash {
    gpio: SysfsGpio,
    active_low: bool,
}

impl GpioFlash {
    pub fn open(cfg: &FlashConfig) -> Result<Self> {
        let gpio = SysfsGpio::open_output(&cfg.sysfs_root, cfg.gpio_pin)
            .with_context(|| format!("failed to claim flash GPIO {}", cfg.gpio_pin))?;
        let mut flash = Self {
            gpio,
            active_low: cfg.active_low,
        };
        flash.set_active(false)?;
        Ok(flash)
    }
}

impl FlashLine for GpioFlash {
    fn set_active(&mut self, active: bool) -> Result<()> {
        self.gpio.set(active != self.active_low)
    }
}

/// Stand-in used when the flash is disabled.
#[derive(Debug, Default)]
pub struct NoopFlash;

impl FlashLine for NoopFlash {
    fn set_active(&mut self, active: bool) -> Result<()> {
        debug!(active, "simulated flash");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashRequest {
    /// Fire for a capture, honouring the pre-flash delay.
    Fire,
    /// Startup blink: no delay, followed by a gap as long as the pulse.
    Blink,
}

pub struct FlashWorker {
    line: Box<dyn FlashLine>,
    pre_flash_delay: Duration,
    pulse: Duration,
}

impl FlashWorker {
    pub fn new(line: Box<dyn FlashLine>, cfg: &FlashConfig) -> Self {
        Self {
            line,
            pre_flash_delay: cfg.pre_flash_delay,
            pulse: cfg.pulse,
        }
    }

    fn pulse(&mut self) -> Result<()> {
        self.line.set_active(true)?;
        thread::sleep(self.pulse);
        self.line.set_active(false)
    }
}

impl Worker for FlashWorker {
    type Request = FlashRequest;
    type Output = ();
    const NAME: &'static str = "flash";

    fn perform(&mut self, request: FlashRequest) -> Result<()> {
        match request {
            FlashRequest::Fire => {
                if !self.pre_flash_delay.is_zero() {
                    thread::sleep(self.pre_flash_delay);
                }
                self.pulse()
            }
            FlashRequest::Blink => {
                self.pulse()?;
                thread::sleep(self.pulse);
                Ok(())
            }
        }
    }

    fn release(&mut self) {
        if let Err(err) = self.line.set_active(false) {
            warn!(error = ?err, "failed to switch flash off on release");
        }
    }
}

pub type FlashService = ServiceHandle<FlashWorker>;

/// Fire-and-forget handle other services use to pop the flash.
pub type FlashTrigger = Requester<FlashWorker>;

impl ServiceHandle<FlashWorker> {
    pub fn trigger(&self) -> Result<(), ServiceError> {
        self.request(FlashRequest::Fire).map(drop)
    }

    /// Queue `blinks` startup blinks so the operator can see the flash works.
    pub fn self_test(&self, blinks: u32) -> Result<(), ServiceError> {
        if blinks > 0 {
            info!(blinks, "flash self-test");
        }
        for _ in 0..blinks {
            self.request(FlashRequest::Blink)?;
        }
        Ok(())
    }
}
