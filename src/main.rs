//! Binary entrypoint for the photo booth kiosk.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use crossbeam_channel::unbounded;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use photo_booth::assets::load_sequence;
use photo_booth::config::Configuration;
use photo_booth::input;
use photo_booth::kiosk;
use photo_booth::persistence::{DiskPersistence, Persistence};
use photo_booth::platform::shell::shell_runner;
use photo_booth::processing::compositor::Compositor;
use photo_booth::processing::screens::ScreenComposer;
use photo_booth::rate::RateLimiter;
use photo_booth::render::HeadlessRenderer;
use photo_booth::services::capture::{Camera, CommandCamera, SyntheticCamera};
use photo_booth::services::flash::{FlashLine, GpioFlash, NoopFlash};
use photo_booth::services::print::{LpPrinter, Printer, SimulatedPrinter};
use photo_booth::services::{CaptureService, CaptureWorker, FlashService, FlashWorker, PrintService, PrintWorker};
use photo_booth::session::{MachineParts, SessionMachine};

#[derive(Debug, Parser)]
#[command(name = "photo-booth", version, about = "Walk-up photo booth kiosk")]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Replace camera, flash and printer with simulated devices
    #[arg(long)]
    simulate: bool,

    /// Deterministic RNG seed for phrase selection
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(format!("warn,photo_booth={level}")),
    };
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut cfg = Configuration::from_yaml_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if cli.simulate {
        cfg.simulate_everything();
    }
    if cli.seed.is_some() {
        cfg.rng_seed = cli.seed;
    }
    let cfg = cfg.validated().context("invalid configuration values")?;
    info!(config = %cli.config.display(), simulation = ?cfg.simulation, "configuration loaded");

    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sigterm.recv() => {
                            info!("SIGTERM received; initiating shutdown");
                            cancel.cancel();
                        }
                    }
                }
                Err(err) => warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }

    let kiosk_cancel = cancel.clone();
    let outcome = tokio::task::spawn_blocking(move || run_kiosk(cfg, kiosk_cancel))
        .await
        .context("kiosk thread panicked")?;
    cancel.cancel();
    outcome
}

fn run_kiosk(cfg: Configuration, cancel: CancellationToken) -> Result<()> {
    let (input_tx, input_rx) = unbounded();
    if cfg.trigger.keyboard {
        input::spawn_keyboard_listener(input_tx.clone())?;
    }
    if cfg.trigger.button {
        #[cfg(target_os = "linux")]
        input::button::spawn_button_listener(cfg.trigger.clone(), input_tx.clone())?;
        #[cfg(not(target_os = "linux"))]
        warn!("trigger.button is only supported on Linux; ignoring");
    }
    drop(input_tx);

    let mut renderer = HeadlessRenderer::new(input_rx);
    if let Some(path) = &cfg.display.snapshot_path {
        renderer = renderer.with_snapshots(path, cfg.display.snapshot_interval);
    }
    let screens = ScreenComposer::new(&cfg.display, &cfg.layout);
    let size = screens.size();

    let idle = load_sequence(&cfg.assets.idle, size)
        .with_context(|| format!("failed to load idle media {}", cfg.assets.idle.display()))?;
    let countdown = load_sequence(&cfg.assets.countdown, size).with_context(|| {
        format!(
            "failed to load countdown media {}",
            cfg.assets.countdown.display()
        )
    })?;
    let compositor = Compositor::from_config(&cfg.composite)?;

    let (persistence, first_session_id) = match DiskPersistence::new(&cfg.storage.save_dir)
        .and_then(|store| Ok((store.next_session_id()?, store)))
    {
        Ok((next, store)) => (Some(Box::new(store) as Box<dyn Persistence>), next),
        Err(err) => {
            warn!(error = ?err, "sessions will not be saved");
            (None, 1)
        }
    };

    let flash_line: Box<dyn FlashLine> = if cfg.simulation.disable_flash {
        Box::new(NoopFlash)
    } else {
        Box::new(GpioFlash::open(&cfg.flash).context("flash unavailable (try --simulate)")?)
    };
    let flash = FlashService::start(FlashWorker::new(flash_line, &cfg.flash))?;
    flash.self_test(cfg.flash.self_test_blinks)?;

    let camera: Box<dyn Camera> = if cfg.simulation.disable_camera {
        Box::new(SyntheticCamera::from_config(&cfg.simulation)?)
    } else {
        Box::new(CommandCamera::new(&cfg.camera, shell_runner()))
    };
    let capture = CaptureService::start(CaptureWorker::new(camera, Some(flash.requester())))?;

    let (mut printer, dwell): (Box<dyn Printer>, _) = if cfg.simulation.disable_printer {
        (Box::new(SimulatedPrinter), cfg.simulation.print_latency)
    } else {
        (
            Box::new(LpPrinter::new(&cfg.printing, shell_runner())),
            cfg.printing.dwell,
        )
    };
    kiosk::await_printer(
        printer.as_mut(),
        &cfg.printing,
        &cfg.texts.waiting_for_printer,
        &screens,
        &mut renderer,
        &cancel,
    )?;
    let printer = PrintService::start(PrintWorker::new(printer, dwell, &cfg.printing.spool_dir))?;

    let parts = MachineParts {
        capture,
        printer,
        idle,
        countdown,
        compositor,
        screens,
        persistence,
        first_session_id,
    };
    let mut machine = SessionMachine::new(&cfg, parts, Instant::now());
    let mut rate = RateLimiter::new(cfg.frame_rate);

    let outcome = kiosk::run(&mut machine, &mut renderer, &mut rate, &cancel);
    flash.stop();
    outcome.context("kiosk stopped on a fatal error")?;
    info!("kiosk stopped");
    Ok(())
}
