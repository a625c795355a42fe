// Library surface for the binary, headless/integration tests and reuse.
pub mod app;
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod extract;
pub mod focal;
pub mod pacing;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod stats;
pub mod token;
pub mod ui;
