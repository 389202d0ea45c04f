pub mod dispatcher;
pub mod message;
pub mod microblog;
pub mod threads;

use std::future::Future;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::config::RetryPolicy;
use crate::error::Result;

pub use dispatcher::Dispatcher;
pub use microblog::MicroblogPublisher;
pub use threads::ThreadsPublisher;

/// A posting endpoint. `publish` retries internally and reports only
/// success or failure; errors never cross this boundary.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Longest message this endpoint accepts, as counted by `text_len`.
    fn max_chars(&self) -> usize;

    /// Length of `text` the way this endpoint counts it.
    fn text_len(&self, text: &str) -> usize {
        text.chars().count()
    }

    async fn publish(&self, text: &str, image_url: Option<&str>) -> bool;
}

/// Run `attempt` until it succeeds or `policy` is exhausted.
pub(crate) async fn publish_with_retry<F, Fut>(name: &str, policy: RetryPolicy, mut attempt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    for n in 1..=policy.max_attempts {
        match attempt().await {
            Ok(()) => return true,
            Err(e) if n < policy.max_attempts => {
                let wait = policy.delay_after(n);
                warn!(
                    "[{name}] attempt {n}/{} failed: {e}; retrying in {}ms",
                    policy.max_attempts,
                    wait.as_millis()
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                error!("[{name}] attempt {n}/{} failed: {e}; giving up", policy.max_attempts);
            }
        }
    }
    false
}
