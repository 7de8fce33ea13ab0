//! Error types for Linebell.

use std::path::PathBuf;

/// Every way a Linebell run can fail.
#[derive(Debug, thiserror::Error)]
pub enum LinebellError {
    #[error("Missing config value: {0}. Set it in the environment or the config file.")]
    ConfigMissing(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Lock file exists: {} (age={age_secs}s). Aborting.", path.display())]
    LockHeld { path: PathBuf, age_secs: u64 },

    #[error("Lock file error at {}: {source}", path.display())]
    LockIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("LINE API error: {status} {body}")]
    DispatchRejected { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl LinebellError {
    /// Wrap an I/O error raised while touching the lock artifact.
    pub fn lock_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LockIo {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LinebellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_missing_names_key() {
        let err = LinebellError::ConfigMissing("LINE_TO".into());
        assert!(err.to_string().contains("LINE_TO"));
    }

    #[test]
    fn test_lock_held_message() {
        let err = LinebellError::LockHeld {
            path: PathBuf::from(".run.lock"),
            age_secs: 42,
        };
        assert_eq!(
            err.to_string(),
            "Lock file exists: .run.lock (age=42s). Aborting."
        );
    }

    #[test]
    fn test_rejected_carries_body_verbatim() {
        let err = LinebellError::DispatchRejected {
            status: 401,
            body: r#"{"message":"invalid token"}"#.into(),
        };
        assert_eq!(
            err.to_string(),
            r#"LINE API error: 401 {"message":"invalid token"}"#
        );
    }
}
