pub mod ingest;
pub mod resolver;

pub use ingest::*;
pub use resolver::*;
