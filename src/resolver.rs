//! Member resolution used while compiling a clause.
//!
//! A process-wide default resolver is always available. A service scope may
//! register an `Arc<dyn PropertyResolver>` that replaces it for a call.

use crate::services::ServiceScope;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Binds property names from a clause to members of a row.
pub trait PropertyResolver: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn resolve_member<'a>(&self, row: &'a Value, name: &str) -> Option<&'a Value>;
}

/// Exact, case-sensitive member lookup.
#[derive(Debug, Default)]
pub struct ExactPropertyResolver;

impl PropertyResolver for ExactPropertyResolver {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn resolve_member<'a>(&self, row: &'a Value, name: &str) -> Option<&'a Value> {
        row.as_object()?.get(name)
    }
}

/// Prefers an exact match, then falls back to ASCII case-insensitive lookup.
#[derive(Debug, Default)]
pub struct CaseInsensitivePropertyResolver;

impl PropertyResolver for CaseInsensitivePropertyResolver {
    fn name(&self) -> &'static str {
        "case-insensitive"
    }

    fn resolve_member<'a>(&self, row: &'a Value, name: &str) -> Option<&'a Value> {
        let map = row.as_object()?;
        map.get(name).or_else(|| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }
}

static DEFAULT_RESOLVER: Lazy<Arc<dyn PropertyResolver>> =
    Lazy::new(|| Arc::new(ExactPropertyResolver));

/// The process-wide default. Never mutated.
pub fn default_resolver() -> Arc<dyn PropertyResolver> {
    DEFAULT_RESOLVER.clone()
}

/// Picks the resolver for one compilation: a scope override if registered,
/// the process-wide default otherwise. The two are never combined.
pub fn resolve_active(scope: Option<&ServiceScope>) -> Arc<dyn PropertyResolver> {
    let injected = scope.and_then(|s| s.try_get::<Arc<dyn PropertyResolver>>());
    match injected {
        Some(resolver) => {
            debug!(resolver = resolver.name(), "using resolver from service scope");
            Arc::clone(&*resolver)
        }
        None => {
            let resolver = default_resolver();
            debug!(resolver = resolver.name(), "using default resolver");
            resolver
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_is_a_singleton() {
        assert!(Arc::ptr_eq(&default_resolver(), &default_resolver()));
    }

    #[test]
    fn no_scope_uses_default() {
        assert_eq!(resolve_active(None).name(), "exact");
    }

    #[test]
    fn scope_without_override_uses_default() {
        let scope = ServiceScope::new();
        assert!(Arc::ptr_eq(&resolve_active(Some(&scope)), &default_resolver()));
    }

    #[test]
    fn override_replaces_default() {
        let scope = ServiceScope::new();
        let over: Arc<dyn PropertyResolver> = Arc::new(CaseInsensitivePropertyResolver);
        scope.register(over);
        assert_eq!(resolve_active(Some(&scope)).name(), "case-insensitive");
    }

    #[test]
    fn case_insensitive_prefers_exact_match() {
        let row = json!({"name": 1, "Name": 2});
        let r = CaseInsensitivePropertyResolver;
        assert_eq!(r.resolve_member(&row, "Name"), Some(&json!(2)));
        assert!(r.resolve_member(&row, "NAME").is_some());
        assert!(ExactPropertyResolver.resolve_member(&row, "NAME").is_none());
    }
}
