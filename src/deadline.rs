use std::future::Future;
use std::time::Duration;

/// Default bound on a single collaborator call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Run one collaborator call under `limit`.
///
/// Expiry is reported through `elapsed`, so it surfaces as the call's own failure kind.
/// The in-flight call is dropped, not cancelled on the remote side.
pub async fn bounded<T, E, F>(
    limit: Duration,
    call: F,
    elapsed: impl FnOnce(Duration) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(elapsed(limit)),
    }
}
