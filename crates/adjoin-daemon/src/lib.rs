pub mod config;
pub mod features;
pub mod runtime;
pub mod server;
pub mod shared;
