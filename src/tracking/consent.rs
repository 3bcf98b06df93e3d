//! Three-state consent resolution

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use super::RequestContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConsentState {
    Granted,
    Denied,
    Undetermined,
}

/// A pure function of the request returning the visitor's consent state.
pub trait ConsentResolver: Send + Sync {
    fn resolve(&self, ctx: &RequestContext) -> ConsentState;
}

impl<F> ConsentResolver for F
where
    F: Fn(&RequestContext) -> ConsentState + Send + Sync,
{
    fn resolve(&self, ctx: &RequestContext) -> ConsentState {
        self(ctx)
    }
}

/// Registered resolver, or the configured default when none is registered.
#[derive(Clone)]
pub struct ConsentGate {
    resolver: Option<Arc<dyn ConsentResolver>>,
    default: ConsentState,
}

impl ConsentGate {
    pub fn new(default: ConsentState) -> Self {
        Self {
            resolver: None,
            default,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ConsentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn resolve(&self, ctx: &RequestContext) -> ConsentState {
        match &self.resolver {
            Some(resolver) => resolver.resolve(ctx),
            None => self.default,
        }
    }
}

impl std::fmt::Debug for ConsentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentGate")
            .field("has_resolver", &self.resolver.is_some())
            .field("default", &self.default)
            .finish()
    }
}

/// Reads a consent-management cookie.
///
/// Values are compared case-insensitively against the granted and denied
/// lists; anything else, including a missing cookie, is undetermined.
#[derive(Debug, Clone)]
pub struct CookieConsentResolver {
    cookie_name: String,
    granted: Vec<String>,
    denied: Vec<String>,
}

impl CookieConsentResolver {
    pub fn new(cookie_name: impl Into<String>, granted: &[String], denied: &[String]) -> Self {
        let lower = |values: &[String]| values.iter().map(|v| v.trim().to_lowercase()).collect();
        Self {
            cookie_name: cookie_name.into(),
            granted: lower(granted),
            denied: lower(denied),
        }
    }
}

impl ConsentResolver for CookieConsentResolver {
    fn resolve(&self, ctx: &RequestContext) -> ConsentState {
        let Some(raw) = ctx.cookie(&self.cookie_name) else {
            return ConsentState::Undetermined;
        };
        let value = urlencoding::decode(raw)
            .map(|v| v.trim().to_lowercase())
            .unwrap_or_default();
        if self.granted.contains(&value) {
            ConsentState::Granted
        } else if self.denied.contains(&value) {
            ConsentState::Denied
        } else {
            ConsentState::Undetermined
        }
    }
}
