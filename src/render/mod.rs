pub mod headless;

use crate::processing::screens::Frame;

pub use headless::HeadlessRenderer;

/// The display surface plus the operator's input, as seen by the control loop.
pub trait Renderer {
    /// Show `frame` until the next call.
    fn display(&mut self, frame: &Frame);

    /// Whether a trigger arrived since the last poll. Never blocks.
    fn poll_trigger(&mut self) -> bool;

    fn quit_requested(&self) -> bool;
}
