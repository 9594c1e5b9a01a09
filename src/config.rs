use std::time::Duration;

use crate::cache::CacheTtls;

/// Engine tunables. `from_env` reads `BOOKLINE_*` variables and falls back
/// to the defaults field by field.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub cache_ttls: CacheTtls,
    pub sweep_interval: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttls: CacheTtls::default(),
            sweep_interval: Duration::from_secs(30),
            metrics_port: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_ttls: CacheTtls {
                booking: env_secs("BOOKLINE_BOOKING_TTL_SECS", defaults.cache_ttls.booking),
                list: env_secs("BOOKLINE_LIST_TTL_SECS", defaults.cache_ttls.list),
                availability: env_secs(
                    "BOOKLINE_AVAILABILITY_TTL_SECS",
                    defaults.cache_ttls.availability,
                ),
            },
            sweep_interval: env_secs("BOOKLINE_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            metrics_port: std::env::var("BOOKLINE_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

fn env_secs(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert!(cfg.cache_ttls.availability <= cfg.cache_ttls.booking);
        assert!(cfg.sweep_interval > Duration::ZERO);
        assert!(cfg.metrics_port.is_none());
    }
}
