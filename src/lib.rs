pub mod config;
pub mod error;
pub mod kernel;
pub mod services;
pub mod sim;
