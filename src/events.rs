use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;

/// Operator input delivered to the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Button press or keyboard equivalent.
    Trigger,
    /// Operator asked the kiosk to exit.
    Quit,
}

/// One copy of a session's print sheet headed for the printer.
#[derive(Debug, Clone)]
pub struct PrintJob {
    pub session_id: u64,
    /// 1-based copy number within the session.
    pub copy: u32,
    pub image: Arc<RgbaImage>,
    /// Persisted print sheet, when the session was saved.
    pub path: Option<PathBuf>,
}
