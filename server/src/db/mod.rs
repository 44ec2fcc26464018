//! Database module for PostgreSQL persistence.

mod adapter;
mod attachments;
mod change_log;
mod pool;
mod records;

pub use adapter::*;
pub use attachments::*;
pub use change_log::*;
pub use pool::*;
pub use records::*;
