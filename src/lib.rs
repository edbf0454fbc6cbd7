pub mod alerts;
pub mod client;
pub mod config;
pub mod query;
pub mod record;
pub mod render;
pub mod schema;
