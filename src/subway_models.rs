// Subway stop board. The subway feed is a flat departure list for a single
// stop, so there is no stop-status traversal and no route exclusion here.

use chrono::DateTime;
use chrono_tz::Tz;
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::commute_plan_client::API_KEY_HEADER;
use crate::commute_plan_models::resolve_str;
use crate::time_authority::{format_clock_time, minutes_until, parse_timestamp};
use crate::transit_config::TransitConfig;
use crate::transit_error::{Result, TransitError};

const ROUTE_FIELDS: [&str; 3] = ["routeId", "route", "line"];
const HEADSIGN_FIELDS: [&str; 3] = ["headsign", "direction", "destination"];
const TIME_FIELDS: [&str; 4] = ["expectedDepartureTime", "departureTime", "scheduledDepartureTime", "time"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubwayDeparture {
    pub route: String,
    pub headsign: Option<String>,
    pub time: String,
    #[serde(rename = "rawISO")]
    pub raw_iso: String,
    pub in_minutes: i64,
    #[serde(skip)]
    pub instant: DateTime<Tz>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubwayArrivals {
    pub stop_name: String,
    pub departures: Vec<SubwayDeparture>,
}

/// Upcoming departures from a raw subway document, soonest first.
pub fn normalize_subway(doc: &Value, config: &TransitConfig, now: &DateTime<Tz>) -> SubwayArrivals {
    let raw_departures = match doc {
        Value::Array(list) => Some(list),
        other => other.get("departures").and_then(Value::as_array),
    };

    let mut departures: Vec<SubwayDeparture> = raw_departures
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .filter_map(|raw| {
            let (raw_iso, instant) = TIME_FIELDS.iter().find_map(|field| {
                let raw_time = resolve_str(raw, &[*field])?;
                let parsed = parse_timestamp(&raw_time, config.timezone)?;
                Some((raw_time, parsed))
            })?;

            Some(SubwayDeparture {
                route: resolve_str(raw, &ROUTE_FIELDS).unwrap_or_else(|| "Subway".to_string()),
                headsign: resolve_str(raw, &HEADSIGN_FIELDS),
                time: format_clock_time(&instant),
                raw_iso,
                in_minutes: minutes_until(&instant, now),
                instant,
            })
        })
        .filter(|departure| departure.instant >= *now)
        .collect();

    departures.sort_by(|a, b| a.instant.cmp(&b.instant));
    departures.truncate(config.max_per_bucket);

    SubwayArrivals {
        stop_name: config.subway.name.clone(),
        departures,
    }
}

pub async fn fetch_subway(http: &reqwest::Client, config: &TransitConfig) -> Result<Value> {
    let mut request = http.get(&config.subway_url).query(&[("stopId", config.subway.stop_id.as_str())]);
    if let Some(key) = &config.api_key {
        request = request.header(API_KEY_HEADER, key);
    }

    let response = request.send().await.map_err(|e| {
        warn!("⚠️  Subway request failed: {}", e);
        TransitError::NetworkError(format!("Failed to fetch subway departures: {}", e))
    })?;

    if !response.status().is_success() {
        warn!("⚠️  Subway API returned {}", response.status());
        return Err(TransitError::StatusError(response.status().as_u16()));
    }

    let body = response.text().await?;
    let doc: Value = serde_json::from_str(&body)?;
    info!("🚇 Subway departures fetched for {}", config.subway.name);
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_authority::{Clock, FixedClock};
    use crate::transit_config::test_config;
    use chrono_tz::America::New_York;
    use serde_json::json;

    fn now() -> DateTime<Tz> {
        FixedClock::at(New_York, "2024-03-04T10:00:00").now()
    }

    #[test]
    fn test_future_sorted_and_capped() {
        let doc = json!({
            "departures": [
                { "routeId": "1", "headsign": "Van Cortlandt Park", "departureTime": "2024-03-04T10:12:00" },
                { "routeId": "1", "headsign": "South Ferry", "departureTime": "2024-03-04T09:58:00" },
                { "route": "1", "expectedDepartureTime": "2024-03-04T10:04:30", "departureTime": "2024-03-04T10:03:00" },
                { "routeId": "1", "time": "2024-03-04T10:20:00" },
                { "routeId": "1", "time": "2024-03-04T10:08:00" },
                { "routeId": "1" }
            ]
        });
        let board = normalize_subway(&doc, &test_config(), &now());

        assert_eq!(board.stop_name, "116 St-Columbia University");
        let times: Vec<&str> = board.departures.iter().map(|d| d.time.as_str()).collect();
        assert_eq!(times, vec!["10:04 am", "10:08 am", "10:12 am"]);
        assert_eq!(board.departures[0].in_minutes, 4);
        assert_eq!(board.departures[2].headsign.as_deref(), Some("Van Cortlandt Park"));
    }

    #[test]
    fn test_bare_array_and_missing_route() {
        let doc = json!([{ "time": "2024-03-04T15:30:00Z" }]);
        let board = normalize_subway(&doc, &test_config(), &now());

        assert_eq!(board.departures.len(), 1);
        assert_eq!(board.departures[0].route, "Subway");
        assert_eq!(board.departures[0].time, "10:30 am");
        assert_eq!(board.departures[0].headsign, None);
    }

    #[test]
    fn test_sparse_document() {
        let board = normalize_subway(&json!({ "departures": "none" }), &test_config(), &now());
        assert!(board.departures.is_empty());
    }
}
