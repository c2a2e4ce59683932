use termdesk_engine::Desk;

/// Shared application state accessible by all route handlers.
pub struct AppState {
    pub desk: Desk,
}

impl AppState {
    pub fn new(desk: Desk) -> Self {
        Self { desk }
    }
}
