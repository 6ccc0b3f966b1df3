//! Router module for adapter selection.
//!
//! This module maps the client-supplied `model` selector to:
//! - The provider adapter to call
//! - The upstream model name
//! - Whether the documented default pair was substituted

mod selector;

pub use selector::{ProviderRegistry, Route, RouteKind, Selector};
