//! Request handlers for sync operations.

mod attachments;
mod changes;
mod records;
mod sync;

pub use attachments::*;
pub use changes::*;
pub use records::*;
pub use sync::*;
