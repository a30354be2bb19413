//! reflow-cli library: command wiring exposed for tests.

pub mod app;
pub mod commands;
pub mod shutdown;
