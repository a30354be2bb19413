pub mod executor;
pub mod placeholder;
pub mod strategy;

pub use executor::*;
pub use placeholder::*;
pub use strategy::*;
