pub mod chain;
pub mod entity;

pub use chain::*;
pub use entity::*;
