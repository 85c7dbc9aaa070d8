pub mod store;
pub mod task_cache;

pub use store::{CacheIdentity, CacheStore, FileCacheStore, TaskCacheEntry, TaskSignature};
pub use task_cache::{CacheRecord, RecordKind, TaskCache};
