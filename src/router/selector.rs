//! Selector resolution and the adapter registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, ProviderConfig, RoutingConfig};
use crate::error::{Error, Result};
use crate::provider::{self, ChatProvider, ClientSettings};

/// How a route was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// The selector named the provider or a model it lists.
    Explicit,
    /// No selector was supplied.
    Default,
    /// The selector was not recognized; the default pair was substituted.
    Fallback,
}

/// A resolved selector: which adapter to call and with which upstream model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub provider: String,
    pub model: String,
    pub kind: RouteKind,
}

/// Table-driven selector rules, independent of the adapters themselves.
#[derive(Debug, Clone)]
pub struct Selector {
    routing: RoutingConfig,
    /// provider name -> default model
    providers: HashMap<String, Option<String>>,
    /// bare model id -> provider name (first provider listing it wins)
    models: HashMap<String, String>,
}

impl Selector {
    pub fn new(routing: RoutingConfig, providers: &[ProviderConfig]) -> Self {
        let mut models = HashMap::new();
        for provider in providers {
            for model in &provider.models {
                models
                    .entry(model.clone())
                    .or_insert_with(|| provider.name.clone());
            }
        }

        Self {
            routing,
            providers: providers
                .iter()
                .map(|p| (p.name.clone(), p.default_model.clone()))
                .collect(),
            models,
        }
    }

    /// Resolve a client-supplied `model` string.
    ///
    /// Rules, in order:
    /// 1. empty -> the configured default pair
    /// 2. `<provider>/<model...>` with a known provider -> that provider, model = remainder
    /// 3. a bare model listed by a provider -> that provider
    /// 4. a bare provider name -> that provider's default model
    /// 5. anything else -> the default pair, logged as a fallback
    pub fn resolve(&self, selector: Option<&str>) -> Route {
        let selector = selector.map(str::trim).unwrap_or_default();
        if selector.is_empty() {
            return self.default_route(RouteKind::Default);
        }

        if let Some((prefix, rest)) = selector.split_once('/') {
            if !rest.is_empty() && self.providers.contains_key(prefix) {
                return Route {
                    provider: prefix.to_string(),
                    model: rest.to_string(),
                    kind: RouteKind::Explicit,
                };
            }
        }

        if let Some(provider) = self.models.get(selector) {
            return Route {
                provider: provider.clone(),
                model: selector.to_string(),
                kind: RouteKind::Explicit,
            };
        }

        if let Some(Some(default_model)) = self.providers.get(selector) {
            return Route {
                provider: selector.to_string(),
                model: default_model.clone(),
                kind: RouteKind::Explicit,
            };
        }

        let route = self.default_route(RouteKind::Fallback);
        tracing::warn!(
            selector = %selector,
            provider = %route.provider,
            model = %route.model,
            "Unrecognized model selector, using default provider"
        );
        route
    }

    fn default_route(&self, kind: RouteKind) -> Route {
        Route {
            provider: self.routing.default_provider.clone(),
            model: self.routing.default_model.clone(),
            kind,
        }
    }
}

/// Adapters keyed by provider name, plus the selector rules that pick among them.
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ChatProvider>>,
    selector: Selector,
}

impl ProviderRegistry {
    /// Build one adapter per configured provider, sharing a single HTTP client.
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = ClientSettings::new(
            config.server.connect_timeout(),
            config.server.upstream_timeout(),
        )?;

        let mut adapters = HashMap::with_capacity(config.providers.len());
        for p in &config.providers {
            adapters.insert(p.name.clone(), provider::build(p, &settings)?);
            tracing::debug!(provider = %p.name, kind = %p.kind, url = %p.url, "Registered provider");
        }

        Ok(Self::new(
            adapters,
            Selector::new(config.routing.clone(), &config.providers),
        ))
    }

    pub fn new(adapters: HashMap<String, Arc<dyn ChatProvider>>, selector: Selector) -> Self {
        Self { adapters, selector }
    }

    pub fn resolve(&self, selector: Option<&str>) -> Route {
        self.selector.resolve(selector)
    }

    /// Resolve a selector and return the adapter for it.
    pub fn select(&self, selector: Option<&str>) -> Result<(Route, Arc<dyn ChatProvider>)> {
        let route = self.resolve(selector);
        let adapter = self.adapters.get(&route.provider).cloned().ok_or_else(|| {
            Error::Internal(format!("no adapter registered for '{}'", route.provider))
        })?;
        Ok((route, adapter))
    }
}
