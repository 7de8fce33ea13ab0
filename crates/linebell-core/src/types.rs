//! Request, outcome and lock snapshot types.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{LinebellError, Result};

/// One push message to one recipient. Built once per run, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    recipient_id: String,
    message_text: String,
    credential: String,
}

impl DispatchRequest {
    pub fn new(
        recipient_id: impl Into<String>,
        message_text: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            message_text: message_text.into(),
            credential: credential.into(),
        }
    }

    /// userId / groupId / roomId the message is pushed to.
    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    pub fn message_text(&self) -> &str {
        &self.message_text
    }

    /// Channel access token, sent as a bearer token.
    pub fn credential(&self) -> &str {
        &self.credential
    }
}

impl fmt::Debug for DispatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRequest")
            .field("recipient_id", &self.recipient_id)
            .field("message_text", &self.message_text)
            .field("credential", &"***")
            .finish()
    }
}

/// Result of a single send attempt that reached the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 2xx from the provider, with its acknowledgment body.
    Delivered { status: u16, body: String },
    /// Any other status, with the raw response body.
    Failed { status: u16, body: String },
}

impl DispatchOutcome {
    /// Classify a response by status code.
    pub fn from_response(status: u16, body: String) -> Self {
        if (200..300).contains(&status) {
            Self::Delivered { status, body }
        } else {
            Self::Failed { status, body }
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Delivered { status, .. } | Self::Failed { status, .. } => *status,
        }
    }

    /// Raw response body, whatever the status.
    pub fn body(&self) -> &str {
        match self {
            Self::Delivered { body, .. } | Self::Failed { body, .. } => body,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// `Failed` becomes `DispatchRejected`.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Delivered { .. } => Ok(()),
            Self::Failed { status, body } => Err(LinebellError::DispatchRejected { status, body }),
        }
    }
}

/// Point-in-time view of a lock artifact on disk.
#[derive(Debug, Clone)]
pub struct LockRecord {
    pub path: PathBuf,
    /// Process id written by the owner, if the payload parses.
    pub owner_pid: Option<u32>,
    pub modified: DateTime<Utc>,
    pub age: Duration,
}

impl LockRecord {
    /// Whether the record is old enough to be treated as abandoned.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age >= ttl
    }
}
