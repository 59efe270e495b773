use std::env;
use std::time::Duration;

use crate::error::DispatchError;

/// Runtime configuration. Dispatch tuning knobs (radius policy, decision
/// window, staleness) are inputs here, never constants in the engine.
#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub job_queue_size: usize,
    pub event_buffer_size: usize,
    pub offer_window: Duration,
    pub rescan_interval: Duration,
    pub max_scan_rounds: u32,
    pub initial_radius_m: f64,
    pub radius_growth_factor: f64,
    pub max_radius_m: f64,
    pub position_staleness: Duration,
    pub average_speed_mps: f64,
    pub min_eta_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            job_queue_size: parse_or_default("JOB_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            offer_window: Duration::from_secs(parse_or_default("OFFER_WINDOW_SECS", 15)?),
            rescan_interval: Duration::from_millis(parse_or_default("RESCAN_INTERVAL_MS", 2000)?),
            max_scan_rounds: parse_or_default("MAX_SCAN_ROUNDS", 3)?,
            initial_radius_m: parse_or_default("INITIAL_RADIUS_M", 3000.0)?,
            radius_growth_factor: parse_or_default("RADIUS_GROWTH_FACTOR", 1.5)?,
            max_radius_m: parse_or_default("MAX_RADIUS_M", 15000.0)?,
            position_staleness: Duration::from_secs(parse_or_default(
                "POSITION_STALENESS_SECS",
                30,
            )?),
            average_speed_mps: parse_or_default("AVERAGE_SPEED_MPS", 8.0)?,
            min_eta_secs: parse_or_default("MIN_ETA_SECS", 60)?,
        })
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
