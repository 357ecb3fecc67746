use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GembakError>;

/// Outcome of the rollback attempt after a failed post-install verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackStatus {
    /// The previous destination was renamed back into place.
    Restored,
    /// A `.bak` copy existed but renaming it back failed.
    Failed(String),
    /// No `.bak` copy was available (destination absent or `--force`).
    Unavailable,
}

impl std::fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackStatus::Restored => write!(f, "previous copy restored"),
            RollbackStatus::Failed(e) => write!(f, "rollback failed: {e}"),
            RollbackStatus::Unavailable => write!(f, "no previous copy to roll back to"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GembakError {
    #[error("source directory does not exist: '{}'", .0.display())]
    SourceMissing(PathBuf),

    #[error("another backup or restore is running (lock: {})", .0.display())]
    LockBusy(PathBuf),

    #[error("no matching backups found in '{0}'")]
    NoBackupsFound(String),

    #[error(
        "verification failed: staged copy differs from '{}' ({differences} differences)",
        .src.display()
    )]
    VerificationFailed {
        src: PathBuf,
        differences: usize,
    },

    #[error(
        "post-install verification failed for '{}' ({rollback})",
        .dest.display()
    )]
    PostVerificationFailed {
        dest: PathBuf,
        rollback: RollbackStatus,
    },

    #[error("cloud authentication failed: {0}")]
    CloudAuth(String),

    #[error("cloud transfer failed: {0}")]
    CloudTransfer(String),

    #[error("failed to delete {failed} of {attempted} backups during prune")]
    PartialDeleteFailure { failed: usize, attempted: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl GembakError {
    /// Process exit code for this error, per the observable CLI contract:
    /// `1` generic failure, `2` lock busy, `3` pre-install verification
    /// failed, `4` post-install verification failed.
    pub fn exit_code(&self) -> i32 {
        match self {
            GembakError::LockBusy(_) => 2,
            GembakError::VerificationFailed { .. } => 3,
            GembakError::PostVerificationFailed { .. } => 4,
            _ => 1,
        }
    }
}
