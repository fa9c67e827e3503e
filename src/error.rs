use std::fmt;

/// Result type for evorl operations
pub type Result<T> = std::result::Result<T, EvoError>;

/// Main error type for the evolution engine and its collaborators
#[derive(Debug, Clone)]
pub enum EvoError {
    /// Invalid dimensions for operations
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid configuration value, surfaced at startup
    InvalidConfig {
        name: String,
        reason: String,
    },

    /// Checkpoint that cannot be materialized by this build
    IncompatibleCheckpoint {
        expected: String,
        found: String,
    },

    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),

    /// Numerical computation errors
    NumericalError(String),

    /// Empty buffer or container
    EmptyBuffer(String),

    /// A single individual failed to evaluate; the generation carries on
    Evaluation {
        agent_id: usize,
        reason: String,
    },

    /// The environment itself is broken; every individual would fail
    Environment(String),

    /// Training error
    TrainingError(String),
}

impl fmt::Display for EvoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvoError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            EvoError::InvalidConfig { name, reason } => {
                write!(f, "Invalid configuration '{}': {}", name, reason)
            }
            EvoError::IncompatibleCheckpoint { expected, found } => {
                write!(f, "Incompatible checkpoint: expected {}, found {}", expected, found)
            }
            EvoError::IoError(msg) => write!(f, "IO error: {}", msg),
            EvoError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            EvoError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
            EvoError::EmptyBuffer(msg) => write!(f, "Empty buffer: {}", msg),
            EvoError::Evaluation { agent_id, reason } => {
                write!(f, "Evaluation of agent {} failed: {}", agent_id, reason)
            }
            EvoError::Environment(msg) => write!(f, "Environment error: {}", msg),
            EvoError::TrainingError(msg) => write!(f, "Training error: {}", msg),
        }
    }
}

impl std::error::Error for EvoError {}

impl From<std::io::Error> for EvoError {
    fn from(err: std::io::Error) -> Self {
        EvoError::IoError(err.to_string())
    }
}

impl From<bincode::Error> for EvoError {
    fn from(err: bincode::Error) -> Self {
        EvoError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for EvoError {
    fn from(err: serde_json::Error) -> Self {
        EvoError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for EvoError {
    fn from(err: serde_yaml::Error) -> Self {
        EvoError::SerializationError(err.to_string())
    }
}

impl EvoError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        EvoError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_config<S: Into<String>>(name: S, reason: S) -> Self {
        EvoError::InvalidConfig {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn evaluation<S: Into<String>>(agent_id: usize, reason: S) -> Self {
        EvoError::Evaluation {
            agent_id,
            reason: reason.into(),
        }
    }

    /// Whether the failure is confined to one individual.
    ///
    /// Recoverable failures cost that individual its fitness for the current
    /// generation. Everything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EvoError::Evaluation { .. } | EvoError::NumericalError(_))
    }
}
