//! Process configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::Money;
use crate::pricing::PricingConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Connection settings for the Kara catalog source.
#[derive(Debug, Clone)]
pub struct KaraConfig {
    pub base_url: String,
    pub api_key: String,
    /// Upper bound for a single fetch, connection included.
    pub timeout: Duration,
}

/// Settings for reconciliation runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Record upserts in flight at once within one entity type.
    pub concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self { Self { concurrency: 8 } }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub kara: KaraConfig,
    pub sync: SyncConfig,
    pub pricing: PricingConfig,
    /// Shared secret for admin routes. Admin routes answer 401 while unset.
    pub admin_api_key: Option<String>,
    pub nats_url: Option<String>,
}

impl Default for KaraConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:8090/api".into(), api_key: String::new(), timeout: Duration::from_secs(30) }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8083,
            database_url: None,
            kara: KaraConfig::default(),
            sync: SyncConfig::default(),
            pricing: PricingConfig::default(),
            admin_api_key: None,
            nats_url: None,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                     |
    /// |---------------------------|-----------------------------|
    /// | `HOST`                    | `0.0.0.0`                   |
    /// | `PORT`                    | `8083`                      |
    /// | `KARA_BASE_URL`           | `http://localhost:8090/api` |
    /// | `KARA_TIMEOUT_SECS`       | `30`                        |
    /// | `SYNC_CONCURRENCY`        | `8`                         |
    /// | `TAX_RATE`                | `0.09`                      |
    /// | `FREE_SHIPPING_THRESHOLD` | `200000`                    |
    /// | `BULK_DISCOUNT_THRESHOLD` | `1000000`                   |
    /// | `BULK_DISCOUNT_RATE`      | `0.05`                      |
    /// | `MIN_ORDER_B2B`           | `500000`                    |
    /// | `MIN_ORDER_B2C`           | `50000`                     |
    /// | `FLAT_SHIPPING_COST`      | `0`                         |
    ///
    /// `DATABASE_URL`, `KARA_API_KEY`, `ADMIN_API_KEY` and `NATS_URL` have no default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = StoreConfig::default();
        let defaults = base.pricing;
        let pricing = PricingConfig {
            tax_rate: parse_or("TAX_RATE", defaults.tax_rate)?,
            free_shipping_threshold: money_or("FREE_SHIPPING_THRESHOLD", defaults.free_shipping_threshold)?,
            bulk_discount_threshold: money_or("BULK_DISCOUNT_THRESHOLD", defaults.bulk_discount_threshold)?,
            bulk_discount_rate: parse_or("BULK_DISCOUNT_RATE", defaults.bulk_discount_rate)?,
            min_order_b2b: money_or("MIN_ORDER_B2B", defaults.min_order_b2b)?,
            min_order_b2c: money_or("MIN_ORDER_B2C", defaults.min_order_b2c)?,
            flat_shipping_cost: money_or("FLAT_SHIPPING_COST", defaults.flat_shipping_cost)?,
        };

        let kara = KaraConfig {
            base_url: std::env::var("KARA_BASE_URL").unwrap_or(base.kara.base_url),
            api_key: std::env::var("KARA_API_KEY").unwrap_or_default(),
            timeout: Duration::from_secs(parse_or("KARA_TIMEOUT_SECS", base.kara.timeout.as_secs())?),
        };

        let concurrency: usize = parse_or("SYNC_CONCURRENCY", base.sync.concurrency)?;

        Ok(Self {
            host: std::env::var("HOST").unwrap_or(base.host),
            port: parse_or("PORT", base.port)?,
            database_url: non_empty("DATABASE_URL"),
            kara,
            sync: SyncConfig { concurrency: concurrency.max(1) },
            pricing,
            admin_api_key: non_empty("ADMIN_API_KEY"),
            nats_url: non_empty("NATS_URL"),
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn money_or(key: &'static str, default: Money) -> Result<Money, ConfigError> {
    parse_or::<Decimal>(key, default.amount()).map(Money::new)
}
