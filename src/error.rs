use std::path::PathBuf;

use thiserror::Error;

use crate::session::Shot;

/// Errors raised while advancing a photo session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A fourth frame was offered to a session that already holds all three.
    #[error("session already holds {max} captured frames")]
    TooManyFrames { max: usize },

    /// Composite generation was requested before every shot was captured.
    #[error("composite needs {needed} captured frames, session has {have}")]
    IncompleteSession { have: usize, needed: usize },

    /// The camera never reported completion for a shot, even after retrying.
    #[error("capture of photo {shot} did not complete after {attempts} attempt(s)")]
    CaptureTimedOut { shot: Shot, attempts: u32 },

    /// Consecutive sessions were abandoned because the camera stopped answering.
    #[error("camera unresponsive for {sessions} consecutive session(s)")]
    CameraUnresponsive { sessions: u32 },

    /// A hardware service refused work.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl SessionError {
    /// Fatal errors end the kiosk loop; everything else is logged and the loop continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CameraUnresponsive { .. })
    }
}

/// Errors raised by the hardware service facades.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The run-loop thread has exited; requests can no longer be delivered.
    #[error("{0} service is stopped")]
    Stopped(&'static str),

    /// The run-loop thread could not be spawned.
    #[error("failed to spawn {name} service thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while loading idle and countdown media.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset {0} does not exist")]
    Missing(PathBuf),

    #[error("asset {path} has unsupported format {extension:?}; export it to a frame directory, GIF or still image")]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("asset directory {0} contains no frame images")]
    EmptySequence(PathBuf),

    #[error("failed to decode asset {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
