use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LaunchError {
    #[error("train database not initialized")]
    Uninitialized,

    #[error("no train found for ID {0}")]
    TrainNotFound(u32),

    #[error("invalid lego train (expected <pwg>/<train>): {0}")]
    InvalidTrain(String),

    #[error("no sample for year {0}")]
    UnknownYear(u32),

    #[error("requested subsample {sample} not found for year {year}")]
    UnknownSubsample { year: u32, sample: String },

    #[error("train run not resolved")]
    TrainRunUnresolved,

    #[error("alien token not provided")]
    MissingCredentials,

    #[error("failed to run {program}: {message}")]
    CommandSpawn { program: String, message: String },

    #[error("{program} exited with {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unexpected output from {program}: {output:?}")]
    UnparseableOutput { program: String, output: String },

    #[error("invalid token timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("token info carries no expiry")]
    MissingExpiry,

    #[error("unable to resolve the current user: {0}")]
    UserLookup(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

impl LaunchError {
    pub fn is_external_failure(&self) -> bool {
        matches!(
            self,
            LaunchError::CommandSpawn { .. }
                | LaunchError::CommandFailed { .. }
                | LaunchError::UnparseableOutput { .. }
                | LaunchError::InvalidTimestamp(_)
        )
    }
}
