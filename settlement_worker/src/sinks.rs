//! Stand-in implementations of the cache and push collaborators. The real
//! Redis cache and FCM fan-out are owned by other services; until the worker
//! is wired to them these log what they would have done.

use escrow_engine::traits::{CacheInvalidator, Notifier};
use log::{debug, info};

#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, tokens: &[String], title: &str, body: &str) {
        info!("🔔️ Notifying {} device(s): {title} / {body}", tokens.len());
    }
}

#[derive(Clone, Debug, Default)]
pub struct NullCache;

impl CacheInvalidator for NullCache {
    async fn delete(&self, keys: &[String]) {
        debug!("Would invalidate cache keys: {}", keys.join(", "));
    }
}
