//! Guarded single-shot dispatch.

use linebell_core::error::Result;
use linebell_core::traits::Notifier;
use linebell_core::types::DispatchRequest;

use crate::lock::ExclusivityGuard;

/// Send `request` once through `notifier` while holding the run lock.
///
/// Fails with `LockHeld` without calling the notifier if another run is
/// active. Any non-2xx answer surfaces as `DispatchRejected`; there is no
/// retry, the next scheduled trigger is the retry.
pub async fn run_once(
    guard: &ExclusivityGuard,
    notifier: &dyn Notifier,
    request: &DispatchRequest,
) -> Result<()> {
    guard
        .scope(async {
            tracing::info!("Sending {} message...", notifier.name().to_uppercase());
            notifier.send(request).await?;
            tracing::info!("Done.");
            Ok(())
        })
        .await
}
