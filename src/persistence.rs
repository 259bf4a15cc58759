use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A finished session ready to be written out.
pub struct SessionRecord<'a> {
    pub session_id: u64,
    pub frames: &'a [Arc<RgbaImage>],
    pub composite: &'a RgbaImage,
    pub print_image: &'a RgbaImage,
}

pub trait Persistence: Send {
    /// Store the session. Returns where the print sheet now lives.
    fn save(&mut self, record: &SessionRecord<'_>) -> Result<PathBuf>;
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct SessionManifest {
    pub session_id: u64,
    pub saved_at: DateTime<Utc>,
    pub frames: Vec<String>,
    pub strip: String,
    pub print: String,
}

/// Saves each session under `<root>/<session-id>/`.
#[derive(Debug, Clone)]
pub struct DiskPersistence {
    root: PathBuf,
}

impl DiskPersistence {
    pub const STRIP_FILE: &'static str = "strip.png";
    pub const PRINT_FILE: &'static str = "print.png";
    pub const MANIFEST_FILE: &'static str = "session.json";

    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create save directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// One past the highest numbered session directory already on disk.
    pub fn next_session_id(&self) -> Result<u64> {
        let mut highest = 0;
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("failed to list {}", self.root.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) {
                highest = highest.max(id);
            }
        }
        Ok(highest + 1)
    }

    fn write_png(image: &RgbaImage, path: &Path) -> Result<()> {
        image
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

impl Persistence for DiskPersistence {
    fn save(&mut self, record: &SessionRecord<'_>) -> Result<PathBuf> {
        let dir = self.root.join(record.session_id.to_string());
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let mut frames = Vec::with_capacity(record.frames.len());
        for (i, frame) in record.frames.iter().enumerate() {
            let name = format!("{}.png", i + 1);
            Self::write_png(frame, &dir.join(&name))?;
            frames.push(name);
        }
        Self::write_png(record.composite, &dir.join(Self::STRIP_FILE))?;
        let print_path = dir.join(Self::PRINT_FILE);
        Self::write_png(record.print_image, &print_path)?;

        let manifest = SessionManifest {
            session_id: record.session_id,
            saved_at: Utc::now(),
            frames,
            strip: Self::STRIP_FILE.to_string(),
            print: Self::PRINT_FILE.to_string(),
        };
        let manifest_path = dir.join(Self::MANIFEST_FILE);
        let writer = BufWriter::new(
            File::create(&manifest_path)
                .with_context(|| format!("failed to create {}", manifest_path.display()))?,
        );
        serde_json::to_writer_pretty(writer, &manifest)
            .with_context(|| format!("failed to write {}", manifest_path.display()))?;

        info!(session = record.session_id, dir = %dir.display(), "session saved");
        Ok(print_path)
    }
}
