//! Seams between the run pipeline and outbound channels.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DispatchOutcome, DispatchRequest};

/// A channel that can push one message to one recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name, used in logs.
    fn name(&self) -> &str;

    /// Make exactly one delivery attempt.
    ///
    /// Provider rejections come back as `Ok(DispatchOutcome::Failed)`;
    /// only transport failures are `Err`.
    async fn push(&self, request: &DispatchRequest) -> Result<DispatchOutcome>;

    /// Push and treat any non-2xx outcome as an error.
    async fn send(&self, request: &DispatchRequest) -> Result<()> {
        self.push(request).await?.into_result()
    }
}
