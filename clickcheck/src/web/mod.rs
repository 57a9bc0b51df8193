//! Click receiver.
//!
//! Every request whose Host starts with the routing prefix is accepted,
//! whatever its method or path:
//! - Logs host, URL and remote address
//! - Writes the parsed form values to the record sink
//! - Returns a short plain-text acknowledgement
//!
//! Requests for any other host get a 404 and are not recorded.

pub mod gate;
pub mod handlers;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use gate::{HostGate, PrefixGate};
pub use handlers::{capture, escape_html, parse_form, AppState, InboundEvent};

/// Build the receiver router. All paths and methods go to [`capture`].
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .fallback(capture)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
