use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::RgbaImage;
use tracing::{debug, error, info, warn};

use super::context::SessionContext;
use super::state::{SessionEvent, SessionState, SessionStateChange, Shot};
use crate::assets::MediaSequence;
use crate::config::{CaptureConfig, Configuration, SessionTimeouts, TextConfig};
use crate::error::SessionError;
use crate::events::PrintJob;
use crate::persistence::{Persistence, SessionRecord};
use crate::processing::compositor::Compositor;
use crate::processing::screens::{Frame, ScreenComposer};
use crate::services::{CaptureService, PrintService};

/// Collaborators the machine owns for the lifetime of the kiosk.
pub struct MachineParts {
    pub capture: CaptureService,
    pub printer: PrintService,
    pub idle: MediaSequence,
    pub countdown: MediaSequence,
    pub compositor: Compositor,
    pub screens: ScreenComposer,
    pub persistence: Option<Box<dyn Persistence>>,
    pub first_session_id: u64,
}

/// Drives one guest at a time from idle to printed strip, one tick per rendered frame.
pub struct SessionMachine {
    state: SessionState,
    entered_at: Instant,
    session_started: Option<Instant>,
    /// Frames shown in the current state; indexes the countdown.
    ticks_in_state: usize,
    idle_tick: usize,
    ctx: SessionContext,
    parts: MachineParts,
    timeouts: SessionTimeouts,
    capture_cfg: CaptureConfig,
    texts: TextConfig,
    failed_sessions: u32,
    screen: Frame,
    preview: Option<Frame>,
    summary_backdrop: Option<Arc<RgbaImage>>,
}

impl SessionMachine {
    pub fn new(cfg: &Configuration, parts: MachineParts, now: Instant) -> Self {
        let ctx = SessionContext::new(parts.first_session_id, &cfg.printing, &cfg.texts, cfg.rng_seed);
        let screen = parts.screens.media(parts.idle.cycle(0));
        Self {
            state: SessionState::Idle,
            entered_at: now,
            session_started: None,
            ticks_in_state: 0,
            idle_tick: 0,
            ctx,
            parts,
            timeouts: cfg.timeouts.clone(),
            capture_cfg: cfg.capture.clone(),
            texts: cfg.texts.clone(),
            failed_sessions: 0,
            screen,
            preview: None,
            summary_backdrop: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// The screen produced by the latest tick.
    pub fn screen(&self) -> &Frame {
        &self.screen
    }

    pub fn failed_sessions(&self) -> u32 {
        self.failed_sessions
    }

    pub fn printer(&self) -> &PrintService {
        &self.parts.printer
    }

    /// Advance the session by one tick and build the next screen.
    ///
    /// Any error abandons the current session; the caller decides whether it is fatal.
    pub fn tick(&mut self, now: Instant, triggered: bool) -> Result<(), SessionError> {
        let outcome = self.step(now, triggered);
        if let Err(err) = &outcome
            && self.state != SessionState::Idle
        {
            warn!(error = %err, state = %self.state, "abandoning session");
            self.enter_idle(now);
        }
        self.render(now);
        outcome
    }

    /// Ask every owned service to stop. Does not wait for them.
    pub fn stop_services(&self) {
        self.parts.capture.stop();
        self.parts.printer.stop();
    }

    fn step(&mut self, now: Instant, triggered: bool) -> Result<(), SessionError> {
        if let Some(started) = self.session_started
            && now.saturating_duration_since(started) >= self.timeouts.session
            && self.state.transition(SessionEvent::SessionTimedOut).is_some()
        {
            info!(session = self.ctx.session_id(), "session timed out");
            self.apply(SessionEvent::SessionTimedOut, now);
            return Ok(());
        }

        if triggered && !self.state.accepts_trigger() {
            debug!(state = %self.state, "trigger ignored");
        }

        match self.state {
            SessionState::Idle => {
                if triggered && self.apply(SessionEvent::Trigger, now) {
                    self.session_started = Some(now);
                }
            }
            SessionState::Prepare => {
                if self.elapsed(now) >= self.timeouts.prepare {
                    self.apply(SessionEvent::PrepareElapsed, now);
                }
            }
            SessionState::Countdown(shot) => {
                if self.ticks_in_state >= self.parts.countdown.len() {
                    self.take_photo(shot, now)?;
                }
            }
            SessionState::Captured(shot) => {
                if self.elapsed(now) >= self.timeouts.frame_preview {
                    if shot.is_last() {
                        self.finish_session(now)?;
                    } else {
                        self.apply(SessionEvent::PreviewElapsed, now);
                    }
                }
            }
            SessionState::ConfirmPrint => {
                if triggered {
                    self.start_printing(now)?;
                } else if self.elapsed(now) >= self.timeouts.confirm {
                    info!(session = self.ctx.session_id(), "print not confirmed");
                    self.apply(SessionEvent::ConfirmTimedOut, now);
                }
            }
            SessionState::Printing => self.track_printing(now, triggered)?,
        }
        Ok(())
    }

    fn take_photo(&mut self, shot: Shot, now: Instant) -> Result<(), SessionError> {
        let started = Instant::now();
        let outcome = self.capture_blocking(shot);
        // The preview timer starts once the frame is in hand.
        let now = now + started.elapsed();
        let frame = match outcome {
            Ok(frame) => frame,
            Err(err) => {
                self.failed_sessions += 1;
                error!(
                    shot = %shot,
                    failed_sessions = self.failed_sessions,
                    "capture failed; abandoning session"
                );
                self.apply(SessionEvent::CaptureAborted, now);
                if self.failed_sessions >= self.capture_cfg.max_failed_sessions {
                    return Err(SessionError::CameraUnresponsive {
                        sessions: self.failed_sessions,
                    });
                }
                return Err(err);
            }
        };

        let captured = self.ctx.capture(Arc::clone(&frame))?;
        let top = self.ctx.texts().top_phrase(&self.texts, captured.index());
        let bottom = captured.next().map(|next| {
            let lead = self.ctx.texts().bottom_phrase(&self.texts, captured.index() + 1);
            format!("{lead}\n{}", self.photo_label(next))
        });
        self.preview = Some(self.parts.screens.preview(&frame, top, bottom.as_deref()));
        self.apply(SessionEvent::Captured, now);
        Ok(())
    }

    /// Request a still and poll until it arrives, retrying a bounded number of times.
    fn capture_blocking(&self, shot: Shot) -> Result<Arc<RgbaImage>, SessionError> {
        let capture = &self.parts.capture;
        let attempts = self.capture_cfg.attempts;
        for attempt in 1..=attempts {
            let generation = capture.start_photo()?;
            let deadline = Instant::now() + self.timeouts.capture;
            debug!(shot = %shot, attempt, generation, "capture requested");
            loop {
                if let Some(frame) = capture.take_result() {
                    return Ok(frame);
                }
                if capture.queue_depth() == 0 {
                    // The worker finished without a result; re-check once for a late store.
                    if let Some(frame) = capture.take_result() {
                        return Ok(frame);
                    }
                    warn!(shot = %shot, attempt, "capture failed");
                    break;
                }
                if Instant::now() >= deadline {
                    warn!(shot = %shot, attempt, timeout = ?self.timeouts.capture, "capture timed out");
                    break;
                }
                thread::sleep(self.capture_cfg.poll_interval);
            }
        }
        Err(SessionError::CaptureTimedOut { shot, attempts })
    }

    fn finish_session(&mut self, now: Instant) -> Result<(), SessionError> {
        let started = Instant::now();
        if let Err(err) = self.ctx.composite(&self.parts.compositor) {
            self.apply(SessionEvent::CompositeFailed, now);
            return Err(err);
        }
        self.failed_sessions = 0;
        self.persist();
        self.summary_backdrop = self
            .ctx
            .composite_image()
            .map(|strip| self.parts.screens.summary_backdrop(strip));
        self.apply(SessionEvent::CompositeReady, now + started.elapsed());
        Ok(())
    }

    fn persist(&mut self) {
        let Some(store) = self.parts.persistence.as_mut() else {
            return;
        };
        let (Some(composite), Some(print_image)) = (self.ctx.composite_image(), self.ctx.print_image())
        else {
            return;
        };
        let record = SessionRecord {
            session_id: self.ctx.session_id(),
            frames: self.ctx.frames(),
            composite,
            print_image,
        };
        match store.save(&record) {
            Ok(path) => self.ctx.set_print_path(path),
            Err(err) => warn!(
                session = self.ctx.session_id(),
                error = ?err,
                "failed to save session; continuing"
            ),
        }
    }

    fn start_printing(&mut self, now: Instant) -> Result<(), SessionError> {
        let copies = self.ctx.requested_copies();
        for copy in 1..=copies {
            self.enqueue_copy(copy)?;
        }
        info!(session = self.ctx.session_id(), copies, "printing");
        self.apply(SessionEvent::Trigger, now);
        Ok(())
    }

    fn track_printing(&mut self, now: Instant, triggered: bool) -> Result<(), SessionError> {
        if triggered {
            match self.ctx.add_copy() {
                Some(copy) => {
                    self.enqueue_copy(copy)?;
                    info!(session = self.ctx.session_id(), copies = copy, "extra copy requested");
                    self.apply(SessionEvent::PrintMore, now);
                }
                None => debug!(max = self.ctx.max_copies(), "copy limit reached"),
            }
        }

        let printer = &self.parts.printer;
        // Read the flag first: the queue depth is updated before it is raised.
        let changed = printer.changed();
        let depth = printer.queue_depth();
        if changed {
            let pending = u32::try_from(depth).unwrap_or(u32::MAX);
            self.ctx
                .set_printed_copies(self.ctx.requested_copies().saturating_sub(pending));
        }
        if depth == 0 {
            if !printer.is_done() {
                warn!(session = self.ctx.session_id(), "last print job failed");
            }
            self.ctx.set_printed_copies(self.ctx.requested_copies());
            self.apply(SessionEvent::PrintFinished, now);
        }
        Ok(())
    }

    fn enqueue_copy(&self, copy: u32) -> Result<(), SessionError> {
        let Some(image) = self.ctx.print_image() else {
            return Err(SessionError::IncompleteSession {
                have: self.ctx.frames().len(),
                needed: Shot::COUNT,
            });
        };
        self.parts.printer.enqueue(PrintJob {
            session_id: self.ctx.session_id(),
            copy,
            image: Arc::clone(image),
            path: self.ctx.print_path().cloned(),
        })?;
        Ok(())
    }

    /// Feed `event` through the transition table. Returns whether the state moved.
    fn apply(&mut self, event: SessionEvent, now: Instant) -> bool {
        let Some(to) = self.state.transition(event) else {
            debug!(state = %self.state, ?event, "event not accepted");
            return false;
        };
        let change = SessionStateChange {
            from: self.state,
            to,
        };
        if change.from != change.to {
            info!(
                from = %change.from,
                to = %change.to,
                session = self.ctx.session_id(),
                "session state change"
            );
        }
        if to == SessionState::Idle {
            self.enter_idle(now);
        } else {
            self.state = to;
            self.entered_at = now;
            self.ticks_in_state = 0;
        }
        true
    }

    fn enter_idle(&mut self, now: Instant) {
        self.state = SessionState::Idle;
        self.entered_at = now;
        self.ticks_in_state = 0;
        self.session_started = None;
        self.preview = None;
        self.summary_backdrop = None;
        self.ctx.reset();
    }

    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.entered_at)
    }

    fn photo_label(&self, shot: Shot) -> String {
        fill(&self.texts.photo_label, &[("n", shot.to_string())])
    }

    fn render(&mut self, now: Instant) {
        let screens = &self.parts.screens;
        self.screen = match self.state {
            SessionState::Idle => {
                let frame = screens.media(self.parts.idle.cycle(self.idle_tick));
                self.idle_tick = self.idle_tick.wrapping_add(1);
                frame
            }
            SessionState::Prepare => {
                let lead = self.ctx.texts().bottom_phrase(&self.texts, 0);
                let footer = format!("{lead}\n{}", self.photo_label(Shot::FIRST));
                screens.prepare(&self.texts.prepare_heading, &footer)
            }
            SessionState::Countdown(_) => {
                let frame = screens.media(self.parts.countdown.frame(self.ticks_in_state));
                self.ticks_in_state += 1;
                frame
            }
            SessionState::Captured(_) => match &self.preview {
                Some(preview) => preview.clone(),
                None => screens.notice(""),
            },
            SessionState::ConfirmPrint => {
                let left = self.timeouts.confirm.saturating_sub(self.elapsed(now));
                let left = Duration::from_secs(left.as_secs() + u64::from(left.subsec_nanos() > 0));
                let text = fill(
                    &self.texts.confirm_prompt,
                    &[("timeout", humantime::format_duration(left).to_string())],
                );
                self.summary(&text)
            }
            SessionState::Printing => {
                let total = self.ctx.requested_copies();
                let current = (self.ctx.printed_copies() + 1).min(total);
                let text = fill(
                    &self.texts.printing_progress,
                    &[("current", current.to_string()), ("total", total.to_string())],
                );
                self.summary(&text)
            }
        };
    }

    fn summary(&self, text: &str) -> Frame {
        match &self.summary_backdrop {
            Some(backdrop) => self.parts.screens.summary(backdrop, text),
            None => self.parts.screens.notice(text),
        }
    }
}

/// Substitute `{key}` placeholders in `template`.
pub fn fill(template: &str, values: &[(&str, String)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("{{{key}}}"), value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_replaces_every_placeholder() {
        assert_eq!(
            fill(
                "Printing {current} of {total}, {current}!",
                &[("current", "2".into()), ("total", "3".into())]
            ),
            "Printing 2 of 3, 2!"
        );
        assert_eq!(fill("Photo {n}", &[]), "Photo {n}");
    }
}
