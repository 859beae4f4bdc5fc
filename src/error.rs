use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to start {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("supervisor is shutting down")]
    ShuttingDown,

    #[error("failed to bind control socket {path}: {source}")]
    SocketBind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("daemon is not running ({0})")]
    DaemonNotRunning(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("bus error: {0}")]
    Bus(#[from] zbus::Error),

    #[error("{0} is already owned; another notification daemon is running")]
    NameTaken(String),

    #[error("bus connection not established")]
    NoBusConnection,

    #[error("malformed image hint: {0}")]
    ImageDecode(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Short machine-friendly slug, used as the body of `ERR:` replies.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Json(_) => "serialization",
            Self::Toml(_) => "config-parse",
            Self::Config(_) => "config",
            Self::SpawnFailed { .. } => "spawn-failed",
            Self::ShuttingDown => "shutting-down",
            Self::SocketBind { .. } => "socket-bind",
            Self::DaemonNotRunning(_) => "not-running",
            Self::UnknownCommand(_) => "unknown-command",
            Self::Bus(_) => "bus",
            Self::NameTaken(_) => "name-taken",
            Self::NoBusConnection => "no-bus-connection",
            Self::ImageDecode(_) => "image-decode",
            Self::Image(_) => "image",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
