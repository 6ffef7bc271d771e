use tracing::warn;
use vflix_cache::{invalidate, CachePolicy, ResponseCache};

use crate::metrics;

/// Apply the cache policy after an asset event. Failures are logged only.
///
/// Returns whether the cache was cleared.
pub(crate) async fn invalidate_after(
    cache: &dyn ResponseCache,
    policy: CachePolicy,
    trigger: &'static str,
) -> bool {
    if policy == CachePolicy::None {
        return false;
    }
    match invalidate(cache, policy).await {
        Ok(_) => {
            metrics::record_cache_invalidation(trigger);
            true
        }
        Err(e) => {
            warn!(trigger, "Response cache invalidation failed: {}", e);
            false
        }
    }
}
