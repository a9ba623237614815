// src/config.rs

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::model::DEFAULT_DECIMAL_PLACES;

pub const ENV_PREFIX: &str = "EFFORT_";

fn default_decimal_places() -> u32 {
    DEFAULT_DECIMAL_PLACES
}

fn default_drift_tolerance() -> Decimal {
    dec!(0.01)
}

/// Engine settings, read from `EFFORT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Precision effort values are persisted with.
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
    /// Largest acceptable gap between the persisted total and the budget.
    #[serde(default = "default_drift_tolerance")]
    pub drift_tolerance: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decimal_places: default_decimal_places(),
            drift_tolerance: default_drift_tolerance(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        envy::prefixed(ENV_PREFIX).from_env::<EngineConfig>()
    }

    /// Same as [`EngineConfig::from_env`] but over explicit key/value pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX).from_iter(pairs)
    }
}
