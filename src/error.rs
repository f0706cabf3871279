use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiskguardError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Protection error: {0}")]
    Protection(#[from] ProtectionError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl DiskguardError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures while acquiring position samples or fall counts
#[derive(Error, Debug, Clone)]
pub enum SensorError {
    #[error("Could not open {path}: {details}")]
    Open { path: PathBuf, details: String },

    #[error("Could not read from {path}: {details}")]
    Read { path: PathBuf, details: String },

    #[error("Unparseable position {content:?} from {path}")]
    Parse { path: PathBuf, content: String },

    #[error("Failed reading from {device}: {details}")]
    DeviceRead { device: String, details: String },

    #[error("Short read from {device} ({bytes} bytes)")]
    ShortRead { device: String, bytes: usize },

    #[error("Sensor source ended")]
    Exhausted,

    #[error("No suitable accelerometer interface found")]
    NotAvailable,
}

impl SensorError {
    /// Whether the acquisition backend is unusable for the rest of the run
    pub fn is_fatal(&self) -> bool {
        match self {
            SensorError::Open { .. } => false,
            SensorError::Read { .. } => false,
            SensorError::Parse { .. } => false,
            SensorError::DeviceRead { .. } => true,
            SensorError::ShortRead { .. } => true,
            SensorError::Exhausted => true,
            SensorError::NotAvailable => true,
        }
    }
}

/// Failures talking to protect attributes, LEDs and activity files
#[derive(Error, Debug, Clone)]
pub enum ProtectionError {
    #[error("Could not open {path}: {details}")]
    Open { path: PathBuf, details: String },

    #[error("Could not write to {path}: {details}")]
    Write { path: PathBuf, details: String },

    #[error("Could not read {path}: {details}")]
    Read { path: PathBuf, details: String },

    #[error("Unexpected content {content:?} in {path}")]
    Parse { path: PathBuf, content: String },
}

impl ProtectionError {
    pub fn user_message(&self) -> String {
        match self {
            ProtectionError::Open { path, .. } | ProtectionError::Write { path, .. } => format!(
                "Could not drive {}. Does your kernel/drive support IDLE_IMMEDIATE with UNLOAD?",
                path.display()
            ),
            other => other.to_string(),
        }
    }
}

/// Failures on the event bus
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, DiskguardError>;
