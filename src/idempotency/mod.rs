pub mod body;
pub mod fingerprint;
pub mod handler;
pub mod middleware;
pub mod record;
pub mod storage;

pub use body::{Capture, CaptureBody};
pub use fingerprint::Fingerprint;
pub use handler::{ClaimOutcome, IdempotencyHandler, IdempotencyMetrics, MetricsSnapshot};
pub use middleware::{IdempotencyLayer, IdempotencyService};
pub use record::{CachedResponse, REPLAY_HEADER};
pub use storage::{IdempotencyStore, InMemoryCache, KeyValueCache, LockToken, RedisCache, MAX_TTL};
