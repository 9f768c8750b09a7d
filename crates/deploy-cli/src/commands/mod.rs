pub mod config;
pub mod deploy;
pub mod history;
pub mod nodes;
pub mod services;
pub mod status;
