use thiserror::Error;

/// Process-level error: a message plus the exit code `main` reports.
///
/// Exit codes:
/// - `2`: configuration or I/O problem
/// - `3`: not enough data to fit anything
/// - `4`: the fit itself failed
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failures raised inside the measurement-to-model pipeline.
///
/// Apart from a run-wide `InsufficientData`, every variant is absorbed where it
/// happens: logged, counted, and the offending line/stratum/chunk is skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NoiseError {
    #[error("malformed record at line {line}: field {field}: {reason}")]
    MalformedRecord {
        line: usize,
        field: usize,
        reason: String,
    },

    #[error("insufficient data for {scope}: {rows} row(s), need at least {needed}")]
    InsufficientData {
        scope: String,
        rows: usize,
        needed: usize,
    },

    #[error("fit diverged for {scope}: {reason}")]
    FitDivergence { scope: String, reason: String },

    #[error("sampling chunk #{chunk} failed ({status}): {stderr}")]
    ExternalProcessFailure {
        chunk: usize,
        status: String,
        stderr: String,
    },

    #[error("failed to write '{path}': {reason}")]
    PersistenceFailure { path: String, reason: String },
}

impl NoiseError {
    /// Exit code used when this error ends the run.
    pub fn exit_code(&self) -> u8 {
        match self {
            NoiseError::MalformedRecord { .. }
            | NoiseError::ExternalProcessFailure { .. }
            | NoiseError::PersistenceFailure { .. } => 2,
            NoiseError::InsufficientData { .. } => 3,
            NoiseError::FitDivergence { .. } => 4,
        }
    }
}

impl From<NoiseError> for AppError {
    fn from(err: NoiseError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}
