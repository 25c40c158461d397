pub mod config;
pub mod console_host;
pub mod logger;
