// Application layer - Crawl orchestration and collaborator traits
pub mod crawler;
pub mod error;
pub mod ports;
