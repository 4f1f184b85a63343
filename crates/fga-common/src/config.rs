//! Operator process configuration
//!
//! Everything is sourced from environment variables. Credentials for the
//! permission engine live in `fga-openfga`; this module covers the
//! reconciliation cadence of the binding loop.

use std::time::Duration;

use tracing::{info, warn};

/// Environment variable overriding the binding loop requeue interval
pub const RECONCILIATION_INTERVAL_ENV: &str = "RECONCILIATION_INTERVAL";

/// Default binding loop requeue interval
pub const DEFAULT_RECONCILIATION_INTERVAL: Duration = Duration::from_secs(45);

/// Read the binding loop requeue interval from the environment.
///
/// Unset or unparsable values fall back to the 45s default with a log line.
pub fn reconciliation_interval() -> Duration {
    reconciliation_interval_from(std::env::var(RECONCILIATION_INTERVAL_ENV).ok().as_deref())
}

fn reconciliation_interval_from(raw: Option<&str>) -> Duration {
    let Some(raw) = raw.filter(|v| !v.is_empty()) else {
        info!(
            default = ?DEFAULT_RECONCILIATION_INTERVAL,
            "{RECONCILIATION_INTERVAL_ENV} not set, using default"
        );
        return DEFAULT_RECONCILIATION_INTERVAL;
    };

    match humantime::parse_duration(raw) {
        Ok(interval) => {
            info!(?interval, "Using {RECONCILIATION_INTERVAL_ENV} from environment");
            interval
        }
        Err(e) => {
            warn!(
                value = %raw,
                error = %e,
                default = ?DEFAULT_RECONCILIATION_INTERVAL,
                "Invalid {RECONCILIATION_INTERVAL_ENV} value, using default"
            );
            DEFAULT_RECONCILIATION_INTERVAL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_interval_uses_default() {
        assert_eq!(
            reconciliation_interval_from(None),
            DEFAULT_RECONCILIATION_INTERVAL
        );
        assert_eq!(
            reconciliation_interval_from(Some("")),
            DEFAULT_RECONCILIATION_INTERVAL
        );
    }

    #[test]
    fn valid_interval_is_parsed() {
        assert_eq!(
            reconciliation_interval_from(Some("45s")),
            Duration::from_secs(45)
        );
        assert_eq!(
            reconciliation_interval_from(Some("2m")),
            Duration::from_secs(120)
        );
        assert_eq!(
            reconciliation_interval_from(Some("1h")),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn invalid_interval_falls_back_to_default() {
        assert_eq!(
            reconciliation_interval_from(Some("not-a-duration")),
            DEFAULT_RECONCILIATION_INTERVAL
        );
        assert_eq!(
            reconciliation_interval_from(Some("45")),
            DEFAULT_RECONCILIATION_INTERVAL
        );
    }
}
