use std::sync::Arc;

use image::{Rgba, RgbaImage};

use super::layout::place_contained;
use crate::config::{DisplayConfig, LayoutConfig, Rect};

/// Text to draw over a screen. Glyph rendering is left to the display surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub text: String,
    pub area: Rect,
    pub font_size: f32,
}

/// One complete screen handed to the renderer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbaImage>,
    pub captions: Vec<Caption>,
}

impl Frame {
    /// Same pixels and captions as `other`, without comparing pixel data.
    pub fn same_as(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.image, &other.image) && self.captions == other.captions
    }

    pub fn caption_text(&self) -> String {
        self.captions
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

/// Builds every screen the booth shows, placing images and captions per the layout.
#[derive(Debug, Clone)]
pub struct ScreenComposer {
    layout: LayoutConfig,
    blank: Arc<RgbaImage>,
}

impl ScreenComposer {
    pub fn new(display: &DisplayConfig, layout: &LayoutConfig) -> Self {
        let [r, g, b] = display.background;
        Self {
            layout: layout.clone(),
            blank: Arc::new(RgbaImage::from_pixel(
                display.width,
                display.height,
                Rgba([r, g, b, 255]),
            )),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.blank.dimensions()
    }

    /// Full-screen media frame (idle loop, countdown).
    pub fn media(&self, image: &Arc<RgbaImage>) -> Frame {
        Frame {
            image: Arc::clone(image),
            captions: Vec::new(),
        }
    }

    pub fn prepare(&self, heading: &str, footer: &str) -> Frame {
        Frame {
            image: Arc::clone(&self.blank),
            captions: vec![self.top(heading), self.bottom(footer)],
        }
    }

    /// A freshly captured frame with praise above it and, between shots, the next-photo line below.
    pub fn preview(&self, shot: &RgbaImage, top: &str, bottom: Option<&str>) -> Frame {
        let mut canvas = (*self.blank).clone();
        place_contained(&mut canvas, shot, self.layout.frame_preview);
        let mut captions = vec![self.top(top)];
        captions.extend(bottom.map(|text| self.bottom(text)));
        Frame {
            image: Arc::new(canvas),
            captions,
        }
    }

    /// Backdrop shared by the print prompt and progress screens.
    pub fn summary_backdrop(&self, strip: &RgbaImage) -> Arc<RgbaImage> {
        let mut canvas = (*self.blank).clone();
        place_contained(&mut canvas, strip, self.layout.confirm_preview);
        Arc::new(canvas)
    }

    pub fn summary(&self, backdrop: &Arc<RgbaImage>, text: &str) -> Frame {
        Frame {
            image: Arc::clone(backdrop),
            captions: vec![Caption {
                text: text.to_string(),
                area: self.layout.confirm_text,
                font_size: self.layout.confirm_font_size,
            }],
        }
    }

    /// Plain message screen, e.g. while waiting for the printer.
    pub fn notice(&self, text: &str) -> Frame {
        self.summary(&self.blank, text)
    }

    fn top(&self, text: &str) -> Caption {
        Caption {
            text: text.to_string(),
            area: self.layout.top_text,
            font_size: self.layout.font_size,
        }
    }

    fn bottom(&self, text: &str) -> Caption {
        Caption {
            text: text.to_string(),
            area: self.layout.bottom_text,
            font_size: self.layout.font_size,
        }
    }
}
