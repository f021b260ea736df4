// Library exports for Aegis
// The binary and the integration tests both build on these modules

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod identity;
pub mod reports;
pub mod routes;
pub mod state;
pub mod store;
pub mod sync;
