// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod directory_loader;
pub mod ecocounter;
pub mod halifax_transit;
pub mod http_client;
pub mod local_time;
pub mod query_client;
pub mod sqlite_store;
pub mod submit_client;
