use std::future::Future;
use std::time::Duration;

use dwqcore::work::WorkRequest;

/// A minimal one-shot request for tests that only exercise scheduling
/// mechanics; the backoff floor is already satisfied.
pub fn quick_request(class_key: &str) -> WorkRequest {
    WorkRequest {
        backoff_base_ms: 10_000,
        .. WorkRequest::one_shot(class_key)
    }
}

/// Poll `probe` until it yields Some or `deadline` elapses.
pub async fn wait_for<T, F, Fut>(deadline: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let step = Duration::from_millis(10);
    let mut waited = Duration::ZERO;
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        if waited >= deadline {
            return None;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
}
