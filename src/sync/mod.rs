pub mod client;
pub mod local;
pub mod models;
pub mod query;
