//! promptgate - a small HTTP gateway in front of several LLM APIs
//!
//! Accepts a prompt (optionally with an uploaded file), picks a provider
//! adapter from the client's `model` selector, and returns the reply either
//! as one JSON body or as a re-framed event stream.

pub mod config;
pub mod error;
pub mod extract;
pub mod prompt;
pub mod provider;
pub mod proxy;
pub mod router;

pub use config::Config;
pub use error::{Error, Result};
