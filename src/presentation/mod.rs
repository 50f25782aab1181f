// Presentation layer - Submit API
pub mod app_state;
pub mod handlers;
pub mod router;
