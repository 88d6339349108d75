use std::env;

use crate::error::DispatchError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub dispatch_queue_size: usize,
    pub event_buffer_size: usize,
    /// Seconds a courier has to accept an offered assignment.
    pub accept_window_secs: i64,
    pub search_radius_km: f64,
    pub candidate_limit: usize,
    pub location_ttl_secs: i64,
    pub trail_ttl_secs: i64,
    pub trail_cap: usize,
    pub avg_speed_kmh: f64,
    pub base_fee: f64,
    pub per_km_fee: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dispatch_queue_size: parse_or_default("DISPATCH_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            accept_window_secs: parse_or_default("ACCEPT_WINDOW_SECS", 120)?,
            search_radius_km: parse_or_default("SEARCH_RADIUS_KM", 5.0)?,
            candidate_limit: parse_or_default("CANDIDATE_LIMIT", 5)?,
            location_ttl_secs: parse_or_default("LOCATION_TTL_SECS", 3_600)?,
            trail_ttl_secs: parse_or_default("TRAIL_TTL_SECS", 86_400)?,
            trail_cap: parse_or_default("TRAIL_CAP", 1_000)?,
            avg_speed_kmh: parse_or_default("AVG_SPEED_KMH", 25.0)?,
            base_fee: parse_or_default("BASE_FEE", 2.50)?,
            per_km_fee: parse_or_default("PER_KM_FEE", 1.20)?,
        })
    }
}

impl Default for Config {
    /// Defaults without touching the environment; what tests use.
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            dispatch_queue_size: 1024,
            event_buffer_size: 1024,
            accept_window_secs: 120,
            search_radius_km: 5.0,
            candidate_limit: 5,
            location_ttl_secs: 3_600,
            trail_ttl_secs: 86_400,
            trail_cap: 1_000,
            avg_speed_kmh: 25.0,
            base_fee: 2.50,
            per_km_fee: 1.20,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, DispatchError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| DispatchError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
