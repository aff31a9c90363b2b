// Library exports for notewall
// This allows integration tests and the binary to share the same modules

pub mod accounts;
pub mod boards;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod forum;
pub mod media;
pub mod routes;
pub mod state;
