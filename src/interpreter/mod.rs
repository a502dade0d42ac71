//! External capabilities consumed by the ingestion workflow: text
//! classification and mailbox retrieval.

pub mod classifier;
pub mod mailbox;

pub use classifier::*;
pub use mailbox::*;
