//! Log records: normalization, ordering and write-time validation.

pub mod normalize;
pub mod timestamp;
pub mod validate;

pub use normalize::{normalize_log, normalize_snapshot, unwrap_value};
pub use timestamp::{compare_newest_first, format_token, parse_token};
pub use validate::{validate_log, NewLog, StoredLog};
