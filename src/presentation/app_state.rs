// Application state for HTTP handlers
use crate::application::ports::Submitter;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub submitter: Arc<dyn Submitter>,
}
