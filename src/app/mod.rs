pub mod auth;
pub mod config;
pub mod memory_registry;
pub mod registry;
