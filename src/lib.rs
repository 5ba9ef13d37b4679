pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod observability;
pub mod registry;
pub mod state;
pub mod store;
pub mod transport;
