//! Shared utility functions.
//!
//! - `url`: URL normalization used as the dedup/join key everywhere
//! - `hash`: SHA-256 helpers for content and issue fingerprints
//! - `time`: database timestamp formatting

pub mod hash;
pub mod time;
pub mod url;

pub use self::hash::sha256_hex;
pub use self::time::{
    db_timestamp, next_utc_midnight, now_timestamp, parse_timestamp, parse_timestamp_opt, utc_day,
};
pub use self::url::{host_of, is_same_site, normalize_url, resolve};
