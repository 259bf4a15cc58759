use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::platform::shell::CommandTemplate;
use crate::session::Shot;

/// Placeholder replaced with the capture destination in camera commands.
pub const OUTPUT_PLACEHOLDER: &str = "@OUTPUT@";

pub const DEFAULT_CAMERA_COMMAND: &str =
    "rpicam-still --nopreview --immediate --width 2028 --height 1080 --encoding png -o @OUTPUT@";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Target render loop frequency in ticks per second.
    pub frame_rate: u32,
    pub display: DisplayConfig,
    pub assets: AssetPaths,
    pub timeouts: SessionTimeouts,
    pub capture: CaptureConfig,
    pub camera: CameraConfig,
    pub flash: FlashConfig,
    pub printing: PrintingConfig,
    pub layout: LayoutConfig,
    pub composite: CompositeConfig,
    pub texts: TextConfig,
    pub storage: StorageConfig,
    pub trigger: TriggerConfig,
    pub simulation: SimulationConfig,
    /// Fixed seed for phrase selection (useful for tests and demos).
    pub rng_seed: Option<u64>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut cfg: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if let Some(base) = path.parent() {
            cfg.resolve_relative_paths(base);
        }
        Ok(cfg)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(self.frame_rate > 0, "frame-rate must be greater than zero");
        self.display
            .validate()
            .context("invalid display configuration")?;
        self.timeouts
            .validate()
            .context("invalid timeouts configuration")?;
        self.capture
            .validate()
            .context("invalid capture configuration")?;
        self.camera
            .validate()
            .context("invalid camera configuration")?;
        self.printing
            .validate()
            .context("invalid printing configuration")?;
        self.layout
            .validate(&self.display)
            .context("invalid layout configuration")?;
        self.composite
            .validate()
            .context("invalid composite configuration")?;
        self.texts
            .validate()
            .context("invalid texts configuration")?;
        ensure!(
            !self.storage.save_dir.as_os_str().is_empty(),
            "storage.save-dir must not be empty"
        );
        Ok(self)
    }

    /// Force every hardware service onto its simulated implementation.
    pub fn simulate_everything(&mut self) {
        self.simulation = SimulationConfig {
            disable_camera: true,
            disable_flash: true,
            disable_printer: true,
            ..self.simulation.clone()
        };
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() && !path.as_os_str().is_empty() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.assets.idle);
        resolve(&mut self.assets.countdown);
        resolve(&mut self.storage.save_dir);
        for path in [
            self.composite.strip_background.as_mut(),
            self.composite.print_background.as_mut(),
            self.simulation.camera_still.as_mut(),
            self.display.snapshot_path.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            resolve(path);
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            display: DisplayConfig::default(),
            assets: AssetPaths::default(),
            timeouts: SessionTimeouts::default(),
            capture: CaptureConfig::default(),
            camera: CameraConfig::default(),
            flash: FlashConfig::default(),
            printing: PrintingConfig::default(),
            layout: LayoutConfig::default(),
            composite: CompositeConfig::default(),
            texts: TextConfig::default(),
            storage: StorageConfig::default(),
            trigger: TriggerConfig::default(),
            simulation: SimulationConfig::default(),
            rng_seed: None,
        }
    }
}

/// Pixel rectangle on the display or a composite canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.saturating_add(self.width) <= width
            && self.y.saturating_add(self.height) <= height
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// Fill colour behind generated screens.
    pub background: [u8; 3],
    /// Where the headless renderer writes what would be on screen.
    pub snapshot_path: Option<PathBuf>,
    /// Minimum spacing between snapshot writes.
    #[serde(with = "humantime_serde")]
    pub snapshot_interval: Duration,
}

impl DisplayConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.width > 0 && self.height > 0,
            "display.width and display.height must be greater than zero"
        );
        Ok(())
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            background: [0, 0, 0],
            snapshot_path: None,
            snapshot_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct AssetPaths {
    /// Media cycled while the booth waits for a guest.
    pub idle: PathBuf,
    /// Media played before every capture.
    pub countdown: PathBuf,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            idle: PathBuf::from("resources/home.gif"),
            countdown: PathBuf::from("resources/countdown"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SessionTimeouts {
    /// How long the "get ready" screen stays up before the first countdown.
    #[serde(with = "humantime_serde")]
    pub prepare: Duration,
    /// How long each captured frame is previewed.
    #[serde(with = "humantime_serde")]
    pub frame_preview: Duration,
    /// How long the print prompt waits before cancelling the session.
    #[serde(with = "humantime_serde")]
    pub confirm: Duration,
    /// Upper bound for one whole session, measured from the first trigger.
    #[serde(with = "humantime_serde")]
    pub session: Duration,
    /// Upper bound for a single capture attempt.
    #[serde(with = "humantime_serde")]
    pub capture: Duration,
}

impl SessionTimeouts {
    fn validate(&self) -> Result<()> {
        ensure!(
            !self.confirm.is_zero(),
            "timeouts.confirm must be greater than zero"
        );
        ensure!(
            !self.capture.is_zero(),
            "timeouts.capture must be greater than zero"
        );
        ensure!(
            self.session > self.confirm,
            "timeouts.session must be longer than timeouts.confirm"
        );
        Ok(())
    }
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            prepare: Duration::from_secs(2),
            frame_preview: Duration::from_secs(2),
            confirm: Duration::from_secs(15),
            session: Duration::from_secs(300),
            capture: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// Capture requests issued per shot before the session is abandoned.
    pub attempts: u32,
    /// Interval between completion polls while waiting on the camera.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Consecutive abandoned sessions tolerated before the kiosk gives up.
    pub max_failed_sessions: u32,
}

impl CaptureConfig {
    fn validate(&self) -> Result<()> {
        ensure!(self.attempts >= 1, "capture.attempts must be >= 1");
        ensure!(
            !self.poll_interval.is_zero(),
            "capture.poll-interval must be greater than zero"
        );
        ensure!(
            self.max_failed_sessions >= 1,
            "capture.max-failed-sessions must be >= 1"
        );
        Ok(())
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            attempts: 2,
            poll_interval: Duration::from_millis(50),
            max_failed_sessions: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CameraConfig {
    /// Shell command that writes one still to `@OUTPUT@`.
    pub command: String,
    /// Scratch file handed to the capture command.
    pub scratch_path: PathBuf,
}

impl CameraConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            CommandTemplate::new(self.command.as_str()).needs_output(),
            "camera.command must contain the {OUTPUT_PLACEHOLDER} placeholder"
        );
        Ok(())
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_CAMERA_COMMAND.to_string(),
            scratch_path: std::env::temp_dir().join("photo-booth-frame.png"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct FlashConfig {
    /// BCM GPIO line wired to the flash trigger.
    pub gpio_pin: u32,
    /// Delay between the capture request and the flash pulse.
    #[serde(with = "humantime_serde")]
    pub pre_flash_delay: Duration,
    /// How long the line is held active per pulse.
    #[serde(with = "humantime_serde")]
    pub pulse: Duration,
    /// Whether the flash fires when the line is driven low.
    pub active_low: bool,
    /// Blinks fired at startup so the operator can see the flash works.
    pub self_test_blinks: u32,
    pub sysfs_root: PathBuf,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            gpio_pin: 22,
            pre_flash_delay: Duration::ZERO,
            pulse: Duration::from_millis(100),
            active_low: true,
            self_test_blinks: 2,
            sysfs_root: PathBuf::from("/sys/class/gpio"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PrintingConfig {
    pub max_copies: u32,
    pub default_copies: u32,
    /// Pause after each physical print so the printer finishes before the next job.
    #[serde(with = "humantime_serde")]
    pub dwell: Duration,
    /// CUPS destination; the server default is used when unset.
    pub printer: Option<String>,
    /// Job title shown in the CUPS queue.
    pub job_title: String,
    /// Extra `lp -o` options.
    pub options: Vec<String>,
    /// Where print sheets are written when the session was not persisted.
    pub spool_dir: PathBuf,
    /// Printer probes at startup before giving up.
    pub startup_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub startup_retry_interval: Duration,
}

impl PrintingConfig {
    fn validate(&self) -> Result<()> {
        ensure!(self.max_copies >= 1, "printing.max-copies must be >= 1");
        ensure!(
            (1..=self.max_copies).contains(&self.default_copies),
            "printing.default-copies must be between 1 and printing.max-copies"
        );
        ensure!(
            self.startup_attempts >= 1,
            "printing.startup-attempts must be >= 1"
        );
        ensure!(
            !self.job_title.trim().is_empty(),
            "printing.job-title must not be blank"
        );
        Ok(())
    }
}

impl Default for PrintingConfig {
    fn default() -> Self {
        Self {
            max_copies: 4,
            default_copies: 1,
            dwell: Duration::from_secs(19),
            printer: None,
            job_title: "photo-booth".to_string(),
            options: vec!["fit-to-page".to_string()],
            spool_dir: std::env::temp_dir().join("photo-booth-spool"),
            startup_attempts: 10,
            startup_retry_interval: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub top_text: Rect,
    pub bottom_text: Rect,
    pub font_size: f32,
    pub frame_preview: Rect,
    pub confirm_preview: Rect,
    pub confirm_text: Rect,
    pub confirm_font_size: f32,
}

impl LayoutConfig {
    fn validate(&self, display: &DisplayConfig) -> Result<()> {
        let rects = [
            ("top-text", self.top_text),
            ("bottom-text", self.bottom_text),
            ("frame-preview", self.frame_preview),
            ("confirm-preview", self.confirm_preview),
            ("confirm-text", self.confirm_text),
        ];
        for (name, rect) in rects {
            ensure!(
                rect.fits_within(display.width, display.height),
                "layout.{name} must be non-empty and fit inside the {}x{} display",
                display.width,
                display.height
            );
        }
        ensure!(
            self.font_size > 0.0 && self.confirm_font_size > 0.0,
            "layout font sizes must be positive"
        );
        Ok(())
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            top_text: Rect::new(10, 30, 1060, 400),
            bottom_text: Rect::new(10, 1490, 1060, 400),
            font_size: 130.0,
            frame_preview: Rect::new(33, 500, 1014, 540),
            confirm_preview: Rect::new(323, 30, 434, 1224),
            confirm_text: Rect::new(10, 1280, 1060, 600),
            confirm_font_size: 100.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CompositeConfig {
    /// Decorative strip background; a white canvas when unset.
    pub strip_background: Option<PathBuf>,
    pub strip_size: [u32; 2],
    /// Size every captured frame is scaled to inside the strip.
    pub slot_size: [u32; 2],
    /// Top-left corner of each photo slot, in capture order.
    pub slots: Vec<[u32; 2]>,
    pub print_background: Option<PathBuf>,
    pub print_size: [u32; 2],
    /// Where copies of the strip land on the print sheet.
    pub print_offsets: Vec<[u32; 2]>,
}

impl CompositeConfig {
    fn validate(&self) -> Result<()> {
        let [strip_w, strip_h] = self.strip_size;
        let [slot_w, slot_h] = self.slot_size;
        let [print_w, print_h] = self.print_size;
        ensure!(
            self.slots.len() == Shot::COUNT,
            "composite.slots must list exactly {} slots, one per photo (got {})",
            Shot::COUNT,
            self.slots.len()
        );
        for [x, y] in &self.slots {
            ensure!(
                Rect::new(*x, *y, slot_w, slot_h).fits_within(strip_w, strip_h),
                "composite slot at ({x}, {y}) does not fit inside the {strip_w}x{strip_h} strip"
            );
        }
        ensure!(
            !self.print_offsets.is_empty(),
            "composite.print-offsets must list at least one offset"
        );
        for [x, y] in &self.print_offsets {
            ensure!(
                Rect::new(*x, *y, strip_w, strip_h).fits_within(print_w, print_h),
                "strip at ({x}, {y}) does not fit inside the {print_w}x{print_h} print sheet"
            );
        }
        Ok(())
    }
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            strip_background: None,
            strip_size: [620, 1748],
            slot_size: [573, 343],
            slots: vec![[22, 103], [22, 533], [22, 963]],
            print_background: None,
            print_size: [1240, 1748],
            print_offsets: vec![[0, 0]],
        }
    }
}

/// Phrases shown on the session screens.
///
/// `{n}`, `{timeout}`, `{current}` and `{total}` are substituted where noted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TextConfig {
    /// Praise shown above each captured frame.
    pub top_phrases: Vec<String>,
    /// Lead-ins shown before the next photo number.
    pub bottom_phrases: Vec<String>,
    pub prepare_heading: String,
    /// Label for the upcoming photo (`{n}`).
    pub photo_label: String,
    /// Print prompt (`{timeout}`).
    pub confirm_prompt: String,
    /// Progress caption while printing (`{current}`, `{total}`).
    pub printing_progress: String,
    pub waiting_for_printer: String,
}

impl TextConfig {
    /// Distinct top phrases drawn per session, one per captured frame.
    ///
    /// Fixed rather than configurable: every session shows exactly three previews,
    /// so only the phrase pools are configuration.
    pub const TOP_PER_SESSION: usize = Shot::COUNT;
    /// Distinct bottom phrases drawn per session: the prepare screen plus two previews.
    pub const BOTTOM_PER_SESSION: usize = Shot::COUNT;

    fn validate(&self) -> Result<()> {
        ensure!(
            self.top_phrases.len() >= Self::TOP_PER_SESSION,
            "texts.top-phrases needs at least {} entries",
            Self::TOP_PER_SESSION
        );
        ensure!(
            self.bottom_phrases.len() >= Self::BOTTOM_PER_SESSION,
            "texts.bottom-phrases needs at least {} entries",
            Self::BOTTOM_PER_SESSION
        );
        Ok(())
    }
}

impl Default for TextConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            top_phrases: owned(&[
                "Fantastic!",
                "Awesome!",
                "Looking sharp!",
                "Not bad at all!",
                "Beautiful!",
                "Boom!",
                "Brilliant!",
            ]),
            bottom_phrases: owned(&[
                "Here it comes",
                "Right now",
                "On its way",
                "Any second now",
                "Three, two, one",
                "Stepping in",
                "Jumping in",
                "Flying in",
            ]),
            prepare_heading: "Get ready for\nthe photo!".to_string(),
            photo_label: "Photo {n}".to_string(),
            confirm_prompt: "Press the button\nto print!\nWait {timeout}\nto cancel!".to_string(),
            printing_progress: "Press the button\nfor more copies!\nPrinting {current} of {total}..."
                .to_string(),
            waiting_for_printer: "Waiting for the printer...\nAttempt {attempt} of {total}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Every session is saved under `<save-dir>/<session-id>/`.
    pub save_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("saved_images"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TriggerConfig {
    /// Accept Enter/space/`t` on an interactive terminal as the trigger and `q` as quit.
    pub keyboard: bool,
    /// Listen for the GPIO button through evdev (gpio-keys overlay).
    pub button: bool,
    /// Input device path; auto-detected from the key code when unset.
    pub button_device: Option<PathBuf>,
    /// evdev key name emitted by the button, e.g. `KEY_ENTER`.
    pub button_key: String,
    /// Transitions closer together than this are treated as contact bounce.
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            keyboard: true,
            button: false,
            button_device: None,
            button_key: "KEY_ENTER".to_string(),
            debounce: Duration::from_millis(20),
        }
    }
}

/// Per-device switches substituting synthetic services for missing hardware.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub disable_camera: bool,
    pub disable_flash: bool,
    pub disable_printer: bool,
    /// Still returned by the simulated camera; a generated test card when unset.
    pub camera_still: Option<PathBuf>,
    /// Artificial latency of the simulated camera.
    #[serde(with = "humantime_serde")]
    pub camera_latency: Duration,
    /// Artificial latency of the simulated printer.
    #[serde(with = "humantime_serde")]
    pub print_latency: Duration,
}
