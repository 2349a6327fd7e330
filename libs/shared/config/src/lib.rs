use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which persistence backend the scheduling engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Supabase,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" => Ok(StoreBackend::Memory),
            "supabase" | "postgrest" => Ok(StoreBackend::Supabase),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// What the resolver does with the tail of a working range that is shorter
/// than one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingSlotPolicy {
    #[default]
    Drop,
    EmitShort,
}

impl FromStr for TrailingSlotPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(TrailingSlotPolicy::Drop),
            "emit_short" | "emit-short" | "short" => Ok(TrailingSlotPolicy::EmitShort),
            other => Err(format!("unknown trailing slot policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub store_backend: StoreBackend,
    pub trailing_slot_policy: TrailingSlotPolicy,
    pub max_availability_range_days: i64,
    pub default_doctor_timezone: String,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: String::new(),
            store_backend: StoreBackend::Memory,
            trailing_slot_policy: TrailingSlotPolicy::Drop,
            max_availability_range_days: 62,
            default_doctor_timezone: "UTC".to_string(),
            server_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            store_backend: parse_or_default("SCHEDULING_STORE", defaults.store_backend),
            trailing_slot_policy: parse_or_default(
                "TRAILING_SLOT_POLICY",
                defaults.trailing_slot_policy,
            ),
            max_availability_range_days: parse_or_default(
                "MAX_AVAILABILITY_RANGE_DAYS",
                defaults.max_availability_range_days,
            ),
            default_doctor_timezone: env::var("DEFAULT_DOCTOR_TIMEZONE")
                .unwrap_or_else(|_| defaults.default_doctor_timezone.clone()),
            server_port: parse_or_default("SERVER_PORT", defaults.server_port),
        };

        if config.max_availability_range_days <= 0 {
            warn!("MAX_AVAILABILITY_RANGE_DAYS must be positive, using default");
        }

        if config.store_backend == StoreBackend::Supabase && !config.is_configured() {
            warn!("Supabase store selected but Supabase is not fully configured");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Range bound actually enforced by the resolver.
    pub fn availability_range_days(&self) -> i64 {
        if self.max_availability_range_days > 0 {
            self.max_availability_range_days
        } else {
            Self::default().max_availability_range_days
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or_else(|e| {
            warn!("{} has invalid value '{}' ({}), using {:?}", key, raw, e, default);
            default
        }),
        Err(_) => default,
    }
}
