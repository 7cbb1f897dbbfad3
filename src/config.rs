//! Ambient environment configuration.
//!
//! The client has no configuration files and no CLI surface; everything
//! ambient comes from two environment variables:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `MODELSOCKET_API_KEY` | Attached as `Authorization: Bearer <secret>` on the handshake |
//! | `MODELSOCKET_LOG` | Log-level gate: `debug`, `info`, or `error`; unset disables logging |

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Environment variable holding the bearer secret for the handshake.
pub const API_KEY_ENV: &str = "MODELSOCKET_API_KEY";

/// Environment variable gating log output.
pub const LOG_ENV: &str = "MODELSOCKET_LOG";

// ============================================================================
// Functions
// ============================================================================

/// Returns the configured API secret, if any.
///
/// Empty values are treated as unset.
#[must_use]
pub fn api_key() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|v| !v.is_empty())
}

/// Initializes logging according to `MODELSOCKET_LOG`.
///
/// Installs a `tracing` fmt subscriber filtered to this crate at the
/// configured level. Does nothing when the variable is unset or holds an
/// unrecognized value, and is safe to call more than once (subsequent
/// calls are no-ops).
pub fn init_logging() {
    let Ok(value) = std::env::var(LOG_ENV) else {
        return;
    };
    let Some(filter) = log_directive(&value) else {
        return;
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .try_init();
}

/// Maps a `MODELSOCKET_LOG` value to an env-filter directive.
fn log_directive(value: &str) -> Option<String> {
    match value {
        "debug" | "info" | "error" => Some(format!("modelsocket={value}")),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directive_known_levels() {
        assert_eq!(log_directive("debug").as_deref(), Some("modelsocket=debug"));
        assert_eq!(log_directive("info").as_deref(), Some("modelsocket=info"));
        assert_eq!(log_directive("error").as_deref(), Some("modelsocket=error"));
    }

    #[test]
    fn test_log_directive_rejects_unknown() {
        assert_eq!(log_directive(""), None);
        assert_eq!(log_directive("trace"), None);
        assert_eq!(log_directive("DEBUG"), None);
    }
}
