use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Environment variable holding extra retryable I/O error substrings,
/// comma-separated. Appended to the built-in defaults at startup.
pub const RETRIED_IO_ERRORS_ENV_VAR: &str = "FLOE_RETRIED_IO_ERRORS";

/// Process-wide engine configuration visible to every datasource.
///
/// Consumers snapshot the context once (typically at construction) via
/// [`DataContext::get_current`] and keep the returned `Arc`; mutable global
/// state is never re-read on a per-operation basis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataContext {
    /// Substrings identifying storage errors that are safe to retry.
    pub retried_io_errors: Vec<String>,
}

impl Default for DataContext {
    fn default() -> Self {
        Self {
            retried_io_errors: [
                "connection reset",
                "broken pipe",
                "connection refused",
                "operation timed out",
                "429 Too Many Requests",
                "503 Service Unavailable",
                "SlowDown",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        }
    }
}

impl DataContext {
    /// Builds the default context, extended with any substrings configured
    /// through [`RETRIED_IO_ERRORS_ENV_VAR`].
    pub fn from_env() -> Self {
        let mut ctx = Self::default();
        if let Ok(val) = std::env::var(RETRIED_IO_ERRORS_ENV_VAR) {
            ctx.retried_io_errors.extend(
                val.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
            );
        }
        ctx
    }

    /// Returns an immutable snapshot of the current process-wide context.
    pub fn get_current() -> Arc<Self> {
        CURRENT_CONTEXT
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Replaces the process-wide context. Datasources constructed before
    /// this call keep the snapshot they were built with.
    pub fn set_current(ctx: Self) {
        *CURRENT_CONTEXT.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(ctx);
    }
}

lazy_static! {
    static ref CURRENT_CONTEXT: RwLock<Arc<DataContext>> =
        RwLock::new(Arc::new(DataContext::from_env()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_has_builtin_signatures() {
        let ctx = DataContext::default();
        assert!(!ctx.retried_io_errors.is_empty());
        assert!(ctx
            .retried_io_errors
            .iter()
            .any(|s| s == "connection reset"));
    }

    #[test]
    fn set_current_swaps_snapshot() {
        let before = DataContext::get_current();
        let mut ctx = DataContext::default();
        ctx.retried_io_errors.push("custom transient error".to_string());
        DataContext::set_current(ctx.clone());
        let after = DataContext::get_current();
        assert_eq!(after.as_ref(), &ctx);
        // Snapshots taken earlier are unaffected by the swap.
        assert!(!before
            .retried_io_errors
            .contains(&"custom transient error".to_string()));
        // Restore from the saved snapshot; re-reading the environment here
        // would race with tests that mutate RETRIED_IO_ERRORS_ENV_VAR.
        DataContext::set_current(before.as_ref().clone());
    }

    #[test]
    fn from_env_appends_configured_signatures() {
        std::env::set_var(RETRIED_IO_ERRORS_ENV_VAR, "transient thing, another one,");
        let ctx = DataContext::from_env();
        std::env::remove_var(RETRIED_IO_ERRORS_ENV_VAR);
        assert!(ctx
            .retried_io_errors
            .contains(&"transient thing".to_string()));
        assert!(ctx.retried_io_errors.contains(&"another one".to_string()));
        let defaults = DataContext::default();
        assert_eq!(
            ctx.retried_io_errors.len(),
            defaults.retried_io_errors.len() + 2
        );
    }
}
