pub mod build;
pub mod config;
pub mod errors;
pub mod gates;
pub mod init;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod preview;
pub mod spawn;
pub mod store;
