#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use crossbeam_channel::Receiver;
use image::{Rgba, RgbaImage};
use photo_booth::assets::MediaSequence;
use photo_booth::config::{
    CompositeConfig, Configuration, DisplayConfig, LayoutConfig, Rect, SessionTimeouts,
};
use photo_booth::events::PrintJob;
use photo_booth::persistence::{Persistence, SessionRecord};
use photo_booth::processing::compositor::Compositor;
use photo_booth::processing::screens::ScreenComposer;
use photo_booth::services::capture::{Camera, SyntheticCamera};
use photo_booth::services::print::Printer;
use photo_booth::services::{CaptureService, CaptureWorker, PrintService, PrintWorker};
use photo_booth::session::{MachineParts, SessionMachine, SessionState};

pub const STEP: Duration = Duration::from_millis(100);
/// Extra clock advance after a tick that blocked on the camera or the compositor.
pub const SETTLE: Duration = Duration::from_millis(500);
pub const COUNTDOWN_FRAMES: usize = 3;

/// A small booth: 64x96 screen, 100ms prepare/preview, 1s confirm.
pub fn config() -> Configuration {
    let mut cfg = Configuration::default();
    cfg.display = DisplayConfig {
        width: 64,
        height: 96,
        ..DisplayConfig::default()
    };
    cfg.layout = LayoutConfig {
        top_text: Rect::new(0, 0, 64, 16),
        bottom_text: Rect::new(0, 80, 64, 16),
        frame_preview: Rect::new(0, 16, 64, 48),
        confirm_preview: Rect::new(16, 0, 32, 64),
        confirm_text: Rect::new(0, 64, 64, 32),
        ..LayoutConfig::default()
    };
    cfg.composite = CompositeConfig {
        strip_background: None,
        strip_size: [20, 60],
        slot_size: [16, 16],
        slots: vec![[2, 2], [2, 22], [2, 42]],
        print_background: None,
        print_size: [40, 60],
        print_offsets: vec![[0, 0], [20, 0]],
    };
    cfg.timeouts = SessionTimeouts {
        prepare: STEP,
        frame_preview: STEP,
        confirm: Duration::from_secs(1),
        session: Duration::from_secs(60),
        capture: Duration::from_secs(2),
    };
    cfg.capture.poll_interval = Duration::from_millis(1);
    cfg.printing.dwell = Duration::ZERO;
    cfg.rng_seed = Some(11);
    cfg.validated().expect("test configuration is valid")
}

fn solid(width: u32, height: u32, value: u8) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([value, value, value, 255]))
}

pub struct BoothBuilder {
    pub cfg: Configuration,
    pub camera: Box<dyn Camera>,
    pub printer: Box<dyn Printer>,
    pub persistence: Option<Box<dyn Persistence>>,
    pub spool: tempfile::TempDir,
}

impl BoothBuilder {
    pub fn new() -> Self {
        Self {
            cfg: config(),
            camera: Box::new(SyntheticCamera::new(None, Duration::ZERO).with_size(32, 18)),
            printer: Box::new(RecordingPrinter::default()),
            persistence: None,
            spool: tempfile::tempdir().unwrap(),
        }
    }

    /// The returned directory holds spooled print sheets; keep it alive with the machine.
    pub fn build(self) -> (SessionMachine, tempfile::TempDir) {
        let cfg = self.cfg;
        let (w, h) = (cfg.display.width, cfg.display.height);
        let idle = MediaSequence::from_frames(vec![solid(w, h, 10), solid(w, h, 20)]).unwrap();
        let countdown = MediaSequence::from_frames(
            (0..COUNTDOWN_FRAMES as u8).map(|i| solid(w, h, 100 + i)).collect(),
        )
        .unwrap();
        let capture = CaptureService::start(CaptureWorker::new(self.camera, None)).unwrap();
        let printer = PrintService::start(PrintWorker::new(
            self.printer,
            cfg.printing.dwell,
            self.spool.path(),
        ))
        .unwrap();
        let parts = MachineParts {
            capture,
            printer,
            idle,
            countdown,
            compositor: Compositor::from_config(&cfg.composite).unwrap(),
            screens: ScreenComposer::new(&cfg.display, &cfg.layout),
            persistence: self.persistence,
            first_session_id: 1,
        };
        (SessionMachine::new(&cfg, parts, Instant::now()), self.spool)
    }
}

/// Tick (without advancing the clock) until `target` is reached.
pub fn tick_until(
    machine: &mut SessionMachine,
    now: Instant,
    target: SessionState,
    visited: &mut Vec<SessionState>,
) {
    for _ in 0..(COUNTDOWN_FRAMES + 5) {
        if machine.state() == target {
            return;
        }
        machine.tick(now, false).unwrap();
        record(machine, visited);
    }
    assert_eq!(machine.state(), target);
}

/// Tick in real time until `target` or a five second deadline.
pub fn wait_for_state(machine: &mut SessionMachine, now: Instant, target: SessionState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while machine.state() != target && Instant::now() < deadline {
        machine.tick(now, false).unwrap();
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(machine.state(), target);
}

pub fn record(machine: &SessionMachine, visited: &mut Vec<SessionState>) {
    if visited.last() != Some(&machine.state()) {
        visited.push(machine.state());
    }
}

/// Printer that records the copies it prints, optionally waiting for a go-ahead per job.
#[derive(Clone, Default)]
pub struct RecordingPrinter {
    pub printed: Arc<Mutex<Vec<(u64, u32)>>>,
    pub gate: Option<Receiver<()>>,
}

impl Printer for RecordingPrinter {
    fn probe(&mut self) -> Result<()> {
        Ok(())
    }

    fn print(&mut self, _sheet: &Path, job: &PrintJob) -> Result<()> {
        if let Some(gate) = &self.gate {
            gate.recv().map_err(|_| anyhow!("gate closed"))?;
        }
        self.printed.lock().unwrap().push((job.session_id, job.copy));
        Ok(())
    }
}

/// Camera that never produces a frame.
pub struct BrokenCamera;

impl Camera for BrokenCamera {
    fn capture(&mut self) -> Result<RgbaImage> {
        Err(anyhow!("sensor not detected"))
    }
}

/// Printer whose every job fails.
pub struct JammedPrinter;

impl Printer for JammedPrinter {
    fn probe(&mut self) -> Result<()> {
        Ok(())
    }

    fn print(&mut self, _sheet: &Path, _job: &PrintJob) -> Result<()> {
        Err(anyhow!("paper jam"))
    }
}

/// Storage that rejects every session.
pub struct FailingPersistence;

impl Persistence for FailingPersistence {
    fn save(&mut self, _record: &SessionRecord<'_>) -> Result<PathBuf> {
        Err(anyhow!("disk full"))
    }
}

/// Walk a fresh machine through a complete capture run. Returns the clock at `ConfirmPrint`.
pub fn drive_to_confirm(machine: &mut SessionMachine, start: Instant) -> Instant {
    let mut visited = Vec::new();
    let mut now = start;
    machine.tick(now, true).unwrap();
    for n in 1..=3u8 {
        now += STEP + SETTLE;
        machine.tick(now, false).unwrap();
        let shot = photo_booth::session::Shot::new(n).unwrap();
        tick_until(machine, now, SessionState::Captured(shot), &mut visited);
    }
    now += STEP + SETTLE;
    machine.tick(now, false).unwrap();
    assert_eq!(machine.state(), SessionState::ConfirmPrint);
    now
}
