use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};
use image::RgbaImage;
use tracing::{debug, info, warn};

use super::Renderer;
use crate::events::InputEvent;
use crate::processing::screens::Frame;

/// Renderer for kiosks without a compositor: logs screen changes and
/// optionally mirrors the screen into a PNG snapshot.
pub struct HeadlessRenderer {
    input: Receiver<InputEvent>,
    quit: bool,
    snapshot: Option<Snapshot>,
    last_captions: Option<String>,
}

struct Snapshot {
    path: PathBuf,
    interval: Duration,
    written_at: Option<Instant>,
    last_image: Option<Arc<RgbaImage>>,
}

impl HeadlessRenderer {
    pub fn new(input: Receiver<InputEvent>) -> Self {
        Self {
            input,
            quit: false,
            snapshot: None,
            last_captions: None,
        }
    }

    /// Write what would be on screen to `path`, at most once per `interval`.
    pub fn with_snapshots(mut self, path: impl Into<PathBuf>, interval: Duration) -> Self {
        self.snapshot = Some(Snapshot {
            path: path.into(),
            interval,
            written_at: None,
            last_image: None,
        });
        self
    }
}

impl Snapshot {
    fn offer(&mut self, image: &Arc<RgbaImage>, now: Instant) {
        if self
            .last_image
            .as_ref()
            .is_some_and(|last| Arc::ptr_eq(last, image))
        {
            return;
        }
        if self
            .written_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.interval)
        {
            return;
        }
        match image.save(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "snapshot written"),
            Err(err) => warn!(path = %self.path.display(), error = %err, "failed to write snapshot"),
        }
        self.written_at = Some(now);
        self.last_image = Some(Arc::clone(image));
    }
}

impl Renderer for HeadlessRenderer {
    fn display(&mut self, frame: &Frame) {
        let captions = frame.caption_text();
        if self.last_captions.as_deref() != Some(captions.as_str()) {
            if !captions.is_empty() {
                info!(text = %captions.replace('\n', " "), "screen");
            }
            self.last_captions = Some(captions);
        }
        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.offer(&frame.image, Instant::now());
        }
    }

    fn poll_trigger(&mut self) -> bool {
        let mut triggered = false;
        loop {
            match self.input.try_recv() {
                Ok(InputEvent::Trigger) => triggered = true,
                Ok(InputEvent::Quit) => self.quit = true,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        triggered
    }

    fn quit_requested(&self) -> bool {
        self.quit
    }
}
