//! Per-query composition context.

use crate::errors::Result;
use crate::model::Path;
use crate::path_context::{self, PathContext};
use crate::services::ServiceScope;
use crate::settings::DefaultQuerySettings;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Context for composing one query: the addressed path, its resolved
/// target and, when hosted, the request's service scope.
///
/// Standalone callers never attach a scope. The default settings are read
/// once, on first access: a scope attached after that access does not
/// replace the value already fixed.
#[derive(Debug, Default)]
pub struct QueryContext {
    path: Option<Path>,
    path_context: PathContext,
    service_scope: RwLock<Option<Weak<ServiceScope>>>,
    default_settings: OnceCell<Arc<DefaultQuerySettings>>,
}

impl QueryContext {
    pub fn new(path: Option<Path>) -> Self {
        let path_context = path
            .as_ref()
            .map(path_context::resolve)
            .unwrap_or_default();
        debug!(target_name = ?path_context.name, "query context created");
        Self {
            path,
            path_context,
            service_scope: RwLock::new(None),
            default_settings: OnceCell::new(),
        }
    }

    /// A context with no addressable target.
    pub fn standalone() -> Self {
        Self::new(None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    pub fn path_context(&self) -> &PathContext {
        &self.path_context
    }

    pub fn target_name(&self) -> Option<&str> {
        self.path_context.name.as_deref()
    }

    /// Attaches the host's scope. The context only keeps a weak reference;
    /// once the host drops the scope it reads as absent.
    pub fn attach_service_scope(&self, scope: &Arc<ServiceScope>) {
        *self.service_scope.write() = Some(Arc::downgrade(scope));
    }

    pub fn service_scope(&self) -> Option<Arc<ServiceScope>> {
        self.service_scope.read().as_ref().and_then(Weak::upgrade)
    }

    /// Settings from the scope when one is attached (the registration is
    /// required), a fresh default otherwise. Fixed after the first success.
    pub fn default_settings(&self) -> Result<Arc<DefaultQuerySettings>> {
        self.default_settings
            .get_or_try_init(|| match self.service_scope() {
                Some(scope) => scope.get_required::<DefaultQuerySettings>(),
                None => Ok(Arc::new(DefaultQuerySettings::default())),
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ApplyError;

    fn strict() -> DefaultQuerySettings {
        DefaultQuerySettings {
            enable_filter: false,
            ..DefaultQuerySettings::default()
        }
    }

    #[test]
    fn standalone_has_no_target() {
        let ctx = QueryContext::standalone();
        assert!(ctx.target_name().is_none());
        assert!(ctx.path().is_none());
        assert!(ctx.service_scope().is_none());
    }

    #[test]
    fn fallback_settings_are_stable() {
        let ctx = QueryContext::standalone();
        let a = ctx.default_settings().unwrap();
        let b = ctx.default_settings().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a, DefaultQuerySettings::default());
    }

    #[test]
    fn scope_attached_before_first_access_wins() {
        let scope = Arc::new(ServiceScope::new());
        scope.register(strict());
        let ctx = QueryContext::standalone();
        ctx.attach_service_scope(&scope);
        assert_eq!(*ctx.default_settings().unwrap(), strict());
    }

    #[test]
    fn scope_attached_after_first_access_is_ignored() {
        let ctx = QueryContext::standalone();
        let fallback = ctx.default_settings().unwrap();

        let scope = Arc::new(ServiceScope::new());
        scope.register(strict());
        ctx.attach_service_scope(&scope);

        let later = ctx.default_settings().unwrap();
        assert!(Arc::ptr_eq(&fallback, &later));
        assert!(later.enable_filter);
    }

    #[test]
    fn missing_registration_fails_fast_and_is_not_cached() {
        let scope = Arc::new(ServiceScope::new());
        let ctx = QueryContext::standalone();
        ctx.attach_service_scope(&scope);
        assert!(matches!(
            ctx.default_settings(),
            Err(ApplyError::MissingRegistration { .. })
        ));

        scope.register(strict());
        assert_eq!(*ctx.default_settings().unwrap(), strict());
    }

    #[test]
    fn dropped_scope_reads_as_absent() {
        let ctx = QueryContext::standalone();
        {
            let scope = Arc::new(ServiceScope::new());
            ctx.attach_service_scope(&scope);
            assert!(ctx.service_scope().is_some());
        }
        assert!(ctx.service_scope().is_none());
    }
}
