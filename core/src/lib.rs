pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod input;
pub mod quality;
pub mod state;
pub mod version;
