pub mod cli;
pub mod config;
pub mod data;
pub mod jobs;
pub mod logging;
pub mod query;
pub mod server;
pub mod store;
