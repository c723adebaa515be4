use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RotavaultError {
    #[error("{0}")]
    Message(String),
    #[error("{0}")]
    Config(ConfigError),
    #[error("acquire {context}: {source}")]
    AcquisitionFailed {
        context: String,
        #[source]
        source: Box<RotavaultError>,
    },
    #[error("release {context}: {source}")]
    ReleaseFailed {
        context: String,
        #[source]
        source: Box<RotavaultError>,
    },
    #[error("rotate {interval}: {message}")]
    RotationFailed { interval: String, message: String },
    #[error("snapshot {volume}: {message}")]
    SnapshotFailed { volume: String, message: String },
    #[error("sync {target} failed with exit code {code}")]
    SyncFailed { target: String, code: i32 },
    #[error("device {} did not show up in time", .0.display())]
    DeviceNotFound(PathBuf),
    #[error("{command} failed with exit code {code}")]
    CommandFailed { command: String, code: i32 },
    #[error("{0}")]
    Lock(String),
    #[error("interrupted")]
    Cancelled,
    #[error("{0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parse config: {0}")]
    Parse(String),
    #[error("{0}")]
    Invalid(String),
    #[error("unknown interval {0}")]
    UnknownInterval(String),
}

pub type Result<T> = std::result::Result<T, RotavaultError>;

impl RotavaultError {
    pub fn message(msg: impl Into<String>) -> Self {
        RotavaultError::Message(msg.into())
    }

    pub fn rotation(interval: &str, message: impl Into<String>) -> Self {
        RotavaultError::RotationFailed {
            interval: interval.to_string(),
            message: message.into(),
        }
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            RotavaultError::Config(_) => 2,
            RotavaultError::Lock(_) => 3,
            RotavaultError::Cancelled => 130,
            RotavaultError::AcquisitionFailed { source, .. } if source.is_cancelled() => 130,
            _ => 4,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            RotavaultError::Cancelled => true,
            RotavaultError::AcquisitionFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<ConfigError> for RotavaultError {
    fn from(err: ConfigError) -> Self {
        RotavaultError::Config(err)
    }
}
