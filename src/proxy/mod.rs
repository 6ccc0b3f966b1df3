//! HTTP front end.
//!
//! Accepts chat requests from browser clients, hands them to the selected
//! provider adapter, and relays the reply back as JSON or as an event stream.

pub mod handlers;
mod server;
pub mod stream;
pub mod types;

pub use server::{create_router, run_server, AppState, RequestId, REQUEST_ID_HEADER};
pub use types::{ChatForm, ChatResponse, ImageResponse};
