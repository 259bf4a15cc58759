use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use tracing::warn;

use super::layout::place_exact;
use crate::config::CompositeConfig;

const BLANK: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Builds the photo strip and the printer-sized sheet from captured frames.
#[derive(Debug, Clone)]
pub struct Compositor {
    strip_background: RgbaImage,
    slot_size: (u32, u32),
    slots: Vec<(u32, u32)>,
    print_background: RgbaImage,
    print_offsets: Vec<(u32, u32)>,
}

impl Compositor {
    pub fn from_config(cfg: &CompositeConfig) -> Result<Self> {
        let [strip_w, strip_h] = cfg.strip_size;
        let [print_w, print_h] = cfg.print_size;
        Ok(Self {
            strip_background: background(cfg.strip_background.as_deref(), strip_w, strip_h)
                .context("failed to load strip background")?,
            slot_size: (cfg.slot_size[0], cfg.slot_size[1]),
            slots: cfg.slots.iter().map(|[x, y]| (*x, *y)).collect(),
            print_background: background(cfg.print_background.as_deref(), print_w, print_h)
                .context("failed to load print background")?,
            print_offsets: cfg.print_offsets.iter().map(|[x, y]| (*x, *y)).collect(),
        })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Paste `frames` into the strip slots in order. Slots without a frame keep the background.
    pub fn compose_strip(&self, frames: &[Arc<RgbaImage>]) -> RgbaImage {
        if frames.len() > self.slots.len() {
            warn!(
                frames = frames.len(),
                slots = self.slots.len(),
                "more frames than strip slots; extras are dropped"
            );
        }
        let mut strip = self.strip_background.clone();
        let (slot_w, slot_h) = self.slot_size;
        for (frame, (x, y)) in frames.iter().zip(&self.slots) {
            place_exact(&mut strip, frame, *x, *y, slot_w, slot_h);
        }
        strip
    }

    /// Lay the strip onto the print sheet at every configured offset.
    pub fn compose_print(&self, strip: &RgbaImage) -> RgbaImage {
        let mut sheet = self.print_background.clone();
        let (w, h) = strip.dimensions();
        for (x, y) in &self.print_offsets {
            place_exact(&mut sheet, strip, *x, *y, w, h);
        }
        sheet
    }
}

fn background(path: Option<&Path>, width: u32, height: u32) -> Result<RgbaImage> {
    let Some(path) = path else {
        return Ok(RgbaImage::from_pixel(width, height, BLANK));
    };
    let image = image::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .to_rgba8();
    if image.dimensions() == (width, height) {
        Ok(image)
    } else {
        Ok(image::imageops::resize(
            &image,
            width,
            height,
            image::imageops::FilterType::Triangle,
        ))
    }
}
