//! Data models

mod instance;
mod plan;
mod health_item;

pub use instance::*;
pub use plan::*;
pub use health_item::*;
