//! HTTP control API for a view layer
//!
//! - GET /health - Health check
//! - GET /status - Connection state, active session, persona and voice
//! - POST /capture/start, POST /capture/stop - Microphone toggle
//! - PUT /settings - Change persona and/or voice
//! - GET|POST /sessions, GET|DELETE /sessions/:id, POST /sessions/:id/select
//! - GET /voices - Voice catalog

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
