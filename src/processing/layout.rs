use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::config::Rect;

/// Largest size with the source aspect ratio that fits inside the canvas.
pub fn resize_to_contain(canvas_w: u32, canvas_h: u32, src_w: u32, src_h: u32) -> (u32, u32) {
    let iw = src_w.max(1) as f32;
    let ih = src_h.max(1) as f32;
    let cw = canvas_w.max(1) as f32;
    let ch = canvas_h.max(1) as f32;
    let scale = (cw / iw).min(ch / ih).max(0.0);
    let scale = if scale.is_finite() { scale } else { 1.0 };
    let w = (iw * scale).round().clamp(1.0, cw);
    let h = (ih * scale).round().clamp(1.0, ch);
    (w as u32, h as u32)
}

pub fn center_offset(inner_w: u32, inner_h: u32, outer_w: u32, outer_h: u32) -> (u32, u32) {
    let ox = outer_w.saturating_sub(inner_w) / 2;
    let oy = outer_h.saturating_sub(inner_h) / 2;
    (ox, oy)
}

/// Scale `image` to fit `rect` and paste it centred there.
pub fn place_contained(canvas: &mut RgbaImage, image: &RgbaImage, rect: Rect) {
    let (w, h) = resize_to_contain(rect.width, rect.height, image.width(), image.height());
    let (ox, oy) = center_offset(w, h, rect.width, rect.height);
    let x = i64::from(rect.x + ox);
    let y = i64::from(rect.y + oy);
    if (w, h) == image.dimensions() {
        imageops::replace(canvas, image, x, y);
    } else {
        let scaled = imageops::resize(image, w, h, FilterType::Triangle);
        imageops::replace(canvas, &scaled, x, y);
    }
}

/// Scale `image` to exactly `width`x`height` and paste it at `(x, y)`.
pub fn place_exact(canvas: &mut RgbaImage, image: &RgbaImage, x: u32, y: u32, width: u32, height: u32) {
    if image.dimensions() == (width, height) {
        imageops::replace(canvas, image, i64::from(x), i64::from(y));
    } else {
        let scaled = imageops::resize(image, width, height, FilterType::Triangle);
        imageops::replace(canvas, &scaled, i64::from(x), i64::from(y));
    }
}
