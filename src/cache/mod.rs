//! Trellis page cache.
//!
//! Rendered pages are stored in a shared key/value store under a per-namespace
//! epoch. Invalidation bumps the epoch instead of enumerating keys:
//!
//! - [`CacheKeyCodec`] derives keys from site, path, language and timezone
//! - [`VersionStore`] holds the epoch of each namespace
//! - [`ResponseCache`] reads and writes through the current epoch
//! - [`TtlPolicy`] folds fragment lifetimes into one decision
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! namespace = "trellis-page"
//! default_ttl_secs = 60
//! max_ttl_secs = 31536000
//! ```

mod config;
mod error;
mod keys;
pub(crate) mod lock;
mod response;
mod store;
mod ttl;
mod version;

pub use config::CacheConfig;
pub use error::CacheError;
pub use keys::CacheKeyCodec;
pub use response::{CachedPage, ResponseCache};
pub use store::{Clock, KeyValueStore, MemoryStore};
pub use ttl::{
    CacheDecision, DEFAULT_CONTENT_TTL, MAX_TTL_CEILING, TtlConfig, TtlExtension, TtlPolicy,
    decide_with,
};
pub use version::{INITIAL_VERSION, VersionStore};
