pub mod config;
pub mod domain;
pub mod errors;

pub use domain::issue::{IssueIndex, IssueRow, Resolution};
pub use domain::short_code::{normalize, ShortCode};
pub use errors::{ApplicationError, ClassificationError, DomainError, InterfaceError};
