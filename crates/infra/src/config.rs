//! Desk configuration.

use tracing::warn;

pub const LOW_STOCK_THRESHOLD_VAR: &str = "RENTKIT_LOW_STOCK_THRESHOLD";
pub const ENFORCE_BUNDLE_STOCK_VAR: &str = "RENTKIT_ENFORCE_BUNDLE_STOCK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeskConfig {
    /// Products with fewer units available than this are listed as low.
    pub low_stock_threshold: i64,
    /// Check stock before applying bundles to a rental.
    pub enforce_bundle_stock: bool,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: 3,
            enforce_bundle_stock: true,
        }
    }
}

impl DeskConfig {
    /// Defaults overridden by `RENTKIT_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`DeskConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(LOW_STOCK_THRESHOLD_VAR) {
            match raw.trim().parse::<i64>() {
                Ok(v) if v >= 0 => config.low_stock_threshold = v,
                _ => warn!(
                    variable = LOW_STOCK_THRESHOLD_VAR,
                    value = %raw,
                    default = config.low_stock_threshold,
                    "ignoring invalid low stock threshold"
                ),
            }
        }

        if let Some(raw) = lookup(ENFORCE_BUNDLE_STOCK_VAR) {
            match parse_flag(&raw) {
                Some(v) => config.enforce_bundle_stock = v,
                None => warn!(
                    variable = ENFORCE_BUNDLE_STOCK_VAR,
                    value = %raw,
                    default = config.enforce_bundle_stock,
                    "ignoring invalid boolean"
                ),
            }
        }

        config
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
