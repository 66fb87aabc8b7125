//! Application state shared across request handlers.

use std::sync::Arc;

use servsel_core::{Allocator, BuildEnvRules, CategoryName};

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Shared allocation engine; workers hold clones of the same `Arc`.
    allocator: Arc<Allocator>,

    /// Rules for the variables injected into running tasks.
    env_rules: BuildEnvRules,

    /// Configured categories, in priority order.
    categories: Vec<CategoryName>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        allocator: Arc<Allocator>,
        env_rules: BuildEnvRules,
        categories: Vec<CategoryName>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                allocator,
                env_rules,
                categories,
            }),
        }
    }

    /// Get the allocator.
    pub fn allocator(&self) -> &Allocator {
        &self.inner.allocator
    }

    /// Get the build environment rules.
    pub fn env_rules(&self) -> &BuildEnvRules {
        &self.inner.env_rules
    }

    /// Configured categories, used to classify pushed inventory lines.
    pub fn categories(&self) -> &[CategoryName] {
        &self.inner.categories
    }
}
