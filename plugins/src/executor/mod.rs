pub mod command;
pub mod static_content;
pub mod strategies;

pub use command::CommandTaskExecutor;
pub use static_content::StaticTaskExecutor;
pub use strategies::{ExponentialBackoffPlugin, LinearRetryPlugin};
