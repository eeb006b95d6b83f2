// Process configuration: flags override environment (and .env), which
// override the built-in defaults. Built once at startup and shared read-only.

use clap::Parser;
use chrono_tz::Tz;
use serde::Serialize;
use std::time::Duration;

use crate::transit_error::{Result, TransitError};

#[derive(Parser, Debug, Clone)]
#[command(name = "campus-transit-web", about = "Campus shuttle and subway arrivals board")]
pub struct Args {
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "COMMUTE_PLAN_URL")]
    pub commute_plan_url: String,
    #[arg(long, env = "SUBWAY_URL")]
    pub subway_url: String,
    #[arg(long, env = "UPSTREAM_API_KEY")]
    pub api_key: Option<String>,
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 15)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "TRANSIT_TIMEZONE", default_value = "America/New_York")]
    pub timezone: String,
    #[arg(long, env = "REGION_ID", default_value = "columbia")]
    pub region_id: String,
    #[arg(long, env = "MAX_PER_BUCKET", default_value_t = 3)]
    pub max_per_bucket: usize,

    #[arg(long, env = "ECS_STOP_ID", default_value = "ecs")]
    pub ecs_stop_id: String,
    #[arg(long, env = "ECS_STOP_NAME", default_value = "East Campus")]
    pub ecs_stop_name: String,
    #[arg(long, env = "ECS_LAT", default_value_t = 40.8078)]
    pub ecs_lat: f64,
    #[arg(long, env = "ECS_LNG", default_value_t = -73.9593)]
    pub ecs_lng: f64,

    #[arg(long, env = "S120_STOP_ID", default_value = "s120")]
    pub s120_stop_id: String,
    #[arg(long, env = "S120_STOP_NAME", default_value = "120th & Amsterdam")]
    pub s120_stop_name: String,
    #[arg(long, env = "S120_LAT", default_value_t = 40.8090)]
    pub s120_lat: f64,
    #[arg(long, env = "S120_LNG", default_value_t = -73.9585)]
    pub s120_lng: f64,

    #[arg(long, env = "DESTINATION_STOP_ID", default_value = "broadway116")]
    pub destination_stop_id: String,
    #[arg(long, env = "DESTINATION_STOP_NAME", default_value = "Broadway & 116th")]
    pub destination_stop_name: String,
    #[arg(long, env = "DESTINATION_LAT", default_value_t = 40.8075)]
    pub destination_lat: f64,
    #[arg(long, env = "DESTINATION_LNG", default_value_t = -73.9641)]
    pub destination_lng: f64,

    #[arg(long, env = "SUBWAY_STOP_ID", default_value = "117")]
    pub subway_stop_id: String,
    #[arg(long, env = "SUBWAY_STOP_NAME", default_value = "116 St-Columbia University")]
    pub subway_stop_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopLocation {
    pub stop_id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone)]
pub struct TransitConfig {
    pub bind_address: String,
    pub port: u16,
    pub commute_plan_url: String,
    pub subway_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub timezone: Tz,
    pub region_id: String,
    pub max_per_bucket: usize,
    pub ecs: StopLocation,
    pub s120: StopLocation,
    pub destination: StopLocation,
    pub subway: StopLocation,
}

impl TransitConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        let timezone: Tz = args.timezone.parse().map_err(|e| {
            TransitError::ConfigError(format!("Unknown timezone '{}': {}", args.timezone, e))
        })?;

        if args.max_per_bucket == 0 {
            return Err(TransitError::ConfigError("MAX_PER_BUCKET must be at least 1".to_string()));
        }

        Ok(TransitConfig {
            bind_address: args.bind_address,
            port: args.port,
            commute_plan_url: args.commute_plan_url,
            subway_url: args.subway_url,
            api_key: args.api_key.filter(|k| !k.trim().is_empty()),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            timezone,
            region_id: args.region_id,
            max_per_bucket: args.max_per_bucket,
            ecs: StopLocation {
                stop_id: args.ecs_stop_id,
                name: args.ecs_stop_name,
                lat: args.ecs_lat,
                lng: args.ecs_lng,
            },
            s120: StopLocation {
                stop_id: args.s120_stop_id,
                name: args.s120_stop_name,
                lat: args.s120_lat,
                lng: args.s120_lng,
            },
            destination: StopLocation {
                stop_id: args.destination_stop_id,
                name: args.destination_stop_name,
                lat: args.destination_lat,
                lng: args.destination_lng,
            },
            // Coordinates are unused for the subway feed, which is keyed by stop id only.
            subway: StopLocation {
                stop_id: args.subway_stop_id,
                name: args.subway_stop_name,
                lat: 0.0,
                lng: 0.0,
            },
        })
    }
}

#[cfg(test)]
pub fn test_config() -> TransitConfig {
    let args = Args::parse_from([
        "campus-transit-web",
        "--commute-plan-url",
        "http://127.0.0.1:9/plan",
        "--subway-url",
        "http://127.0.0.1:9/subway",
    ]);
    TransitConfig::from_args(args).expect("test config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = test_config();
        assert_eq!(config.timezone, chrono_tz::America::New_York);
        assert_eq!(config.max_per_bucket, 3);
        assert_eq!(config.ecs.stop_id, "ecs");
        assert_eq!(config.s120.stop_id, "s120");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        let args = Args::parse_from([
            "campus-transit-web",
            "--commute-plan-url",
            "http://a",
            "--subway-url",
            "http://b",
            "--timezone",
            "Mars/Olympus_Mons",
        ]);
        assert!(matches!(TransitConfig::from_args(args), Err(TransitError::ConfigError(_))));
    }

    #[test]
    fn test_zero_cap_is_rejected() {
        let args = Args::parse_from([
            "campus-transit-web",
            "--commute-plan-url",
            "http://a",
            "--subway-url",
            "http://b",
            "--max-per-bucket",
            "0",
        ]);
        assert!(TransitConfig::from_args(args).is_err());
    }
}
