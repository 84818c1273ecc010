//! The feed pipeline: aggregate, filter, paginate.

pub mod aggregate;
pub mod filter;
pub mod pagination;

pub use aggregate::aggregate;
pub use filter::{apply_filters, FilterState, Predicate, ViewerIdentity};
pub use pagination::Pagination;
