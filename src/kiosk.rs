use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::PrintingConfig;
use crate::error::SessionError;
use crate::processing::screens::ScreenComposer;
use crate::rate::RateLimiter;
use crate::render::Renderer;
use crate::services::print::Printer;
use crate::session::SessionMachine;
use crate::session::machine::fill;

const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Run the control loop until the operator quits, the token is cancelled, or a fatal error occurs.
pub fn run(
    machine: &mut SessionMachine,
    renderer: &mut dyn Renderer,
    rate: &mut RateLimiter,
    cancel: &CancellationToken,
) -> Result<(), SessionError> {
    info!(period = ?rate.period(), "kiosk loop started");
    let outcome = loop {
        if cancel.is_cancelled() {
            info!("shutdown requested");
            break Ok(());
        }
        let triggered = renderer.poll_trigger();
        if renderer.quit_requested() {
            info!("quit requested by operator");
            break Ok(());
        }

        let result = machine.tick(Instant::now(), triggered);
        renderer.display(machine.screen());
        match result {
            Ok(()) => {}
            Err(err) if err.is_fatal() => break Err(err),
            Err(err) => warn!(error = %err, "session error"),
        }
        rate.sleep();
    };
    machine.stop_services();
    outcome
}

/// Probe the printer until it answers, showing a waiting screen meanwhile.
pub fn await_printer(
    printer: &mut dyn Printer,
    cfg: &PrintingConfig,
    notice: &str,
    screens: &ScreenComposer,
    renderer: &mut dyn Renderer,
    cancel: &CancellationToken,
) -> Result<()> {
    for attempt in 1..=cfg.startup_attempts {
        let err = match printer.probe() {
            Ok(()) => {
                info!(attempt, "printer ready");
                return Ok(());
            }
            Err(err) => err,
        };
        warn!(attempt, of = cfg.startup_attempts, error = %err, "printer not ready");
        let text = fill(
            notice,
            &[
                ("attempt", attempt.to_string()),
                ("total", cfg.startup_attempts.to_string()),
            ],
        );
        renderer.display(&screens.notice(&text));

        if attempt == cfg.startup_attempts {
            break;
        }
        let deadline = Instant::now() + cfg.startup_retry_interval;
        while Instant::now() < deadline {
            renderer.poll_trigger();
            if cancel.is_cancelled() || renderer.quit_requested() {
                bail!("cancelled while waiting for the printer");
            }
            thread::sleep(WAIT_SLICE.min(deadline.saturating_duration_since(Instant::now())));
        }
    }
    bail!(
        "printer unavailable after {} attempt(s)",
        cfg.startup_attempts
    )
}
