pub mod agent;
pub mod config;
pub mod message;
pub mod model;
pub mod plan;
pub mod prompt;
pub mod session;
