use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::codecs::gif::GifDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, RgbaImage};
use tracing::debug;

use crate::error::AssetError;

const STILL_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Decoded frames of an idle or countdown asset, already scaled to the display.
#[derive(Debug, Clone)]
pub struct MediaSequence {
    frames: Vec<Arc<RgbaImage>>,
}

impl MediaSequence {
    pub fn from_frames(frames: Vec<RgbaImage>) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        Some(Self {
            frames: frames.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_static(&self) -> bool {
        self.frames.len() == 1
    }

    /// Frame `index`, holding on the last frame once the sequence runs out.
    pub fn frame(&self, index: usize) -> &Arc<RgbaImage> {
        &self.frames[index.min(self.frames.len() - 1)]
    }

    /// Frame `tick` of an endlessly looping playback.
    pub fn cycle(&self, tick: usize) -> &Arc<RgbaImage> {
        &self.frames[tick % self.frames.len()]
    }
}

/// Load `path` as a frame sequence scaled to `size`.
///
/// Accepts a still image, an animated GIF, or a directory of numbered frames.
pub fn load_sequence(path: &Path, size: (u32, u32)) -> Result<MediaSequence, AssetError> {
    if !path.exists() {
        return Err(AssetError::Missing(path.to_path_buf()));
    }

    let frames = if path.is_dir() {
        frame_files(path)?
            .iter()
            .map(|file| decode_still(file))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        match extension(path).as_str() {
            "gif" => decode_gif(path)?,
            ext if STILL_EXTENSIONS.contains(&ext) => vec![decode_still(path)?],
            ext => {
                return Err(AssetError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    extension: ext.to_string(),
                });
            }
        }
    };

    let (width, height) = size;
    let frames: Vec<_> = frames
        .into_iter()
        .map(|frame| {
            if frame.dimensions() == size {
                frame
            } else {
                imageops::resize(&frame, width, height, FilterType::Triangle)
            }
        })
        .collect();
    debug!(path = %path.display(), frames = frames.len(), "loaded media sequence");
    MediaSequence::from_frames(frames).ok_or_else(|| AssetError::EmptySequence(path.to_path_buf()))
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Still images in `dir`, ordered by the number in their file name.
fn frame_files(dir: &Path) -> Result<Vec<PathBuf>, AssetError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && STILL_EXTENSIONS.contains(&extension(p).as_str()))
        .collect();
    if files.is_empty() {
        return Err(AssetError::EmptySequence(dir.to_path_buf()));
    }
    files.sort_by_cached_key(|p| (frame_number(p), p.clone()));
    Ok(files)
}

fn frame_number(path: &Path) -> u64 {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().unwrap_or(u64::MAX)
}

fn decode_still(path: &Path) -> Result<RgbaImage, AssetError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| AssetError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

fn decode_gif(path: &Path) -> Result<Vec<RgbaImage>, AssetError> {
    let decode_err = |source| AssetError::Decode {
        path: path.to_path_buf(),
        source,
    };
    let decoder = GifDecoder::new(BufReader::new(File::open(path)?)).map_err(decode_err)?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(decode_err)?;
    Ok(frames.into_iter().map(|f| f.into_buffer()).collect())
}

#[cfg(test)]
mod tests {
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgba};

    use super::*;

    fn solid(value: u8) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba([value, value, value, 255]))
    }

    #[test]
    fn directory_frames_play_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in [("frame10.png", 30), ("frame2.png", 20), ("frame1.png", 10)] {
            solid(value).save(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let seq = load_sequence(dir.path(), (4, 4)).unwrap();
        assert_eq!(seq.len(), 3);
        let firsts: Vec<u8> = (0..3).map(|i| seq.frame(i).get_pixel(0, 0)[0]).collect();
        assert_eq!(firsts, vec![10, 20, 30]);
    }

    #[test]
    fn short_sequence_holds_last_frame() {
        let seq = MediaSequence::from_frames(vec![solid(1), solid(2)]).unwrap();
        assert_eq!(seq.frame(7).get_pixel(0, 0)[0], 2);
        assert_eq!(seq.cycle(3).get_pixel(0, 0)[0], 2);
        assert_eq!(seq.cycle(4).get_pixel(0, 0)[0], 1);
    }

    #[test]
    fn still_is_scaled_to_display() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("home.jpg");
        image::DynamicImage::ImageRgba8(solid(80))
            .to_rgb8()
            .save(&path)
            .unwrap();
        let seq = load_sequence(&path, (12, 6)).unwrap();
        assert!(seq.is_static());
        assert_eq!(seq.frame(0).dimensions(), (12, 6));
    }

    #[test]
    fn animated_gif_yields_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idle.gif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = GifEncoder::new(file);
            for value in [0u8, 120, 240] {
                encoder
                    .encode_frame(Frame::from_parts(
                        solid(value),
                        0,
                        0,
                        Delay::from_numer_denom_ms(100, 1),
                    ))
                    .unwrap();
            }
        }
        let seq = load_sequence(&path, (4, 4)).unwrap();
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn video_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("countdown.mp4");
        fs::write(&path, b"not really a video").unwrap();
        let err = load_sequence(&path, (4, 4)).unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedFormat { ref extension, .. } if extension == "mp4"));
    }

    #[test]
    fn missing_and_empty_assets_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_sequence(&dir.path().join("nope.gif"), (4, 4)),
            Err(AssetError::Missing(_))
        ));
        assert!(matches!(
            load_sequence(dir.path(), (4, 4)),
            Err(AssetError::EmptySequence(_))
        ));
    }
}
