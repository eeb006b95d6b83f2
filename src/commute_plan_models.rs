// Commute-plan parsing and normalization.
//
// The upstream "rides" payload is ragged: identifiers may be strings or numbers,
// stop-status records are sometimes wrapped in a single-key envelope, and the
// timestamp field names vary between scheduled and live variants. Everything
// here reads the raw serde_json::Value tolerantly and never fails; a ride that
// cannot be interpreted is skipped.

use chrono::DateTime;
use chrono_tz::Tz;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::time_authority::{format_clock_time, minutes_until, parse_timestamp};
use crate::transit_config::{StopLocation, TransitConfig};

type Record = Map<String, Value>;

const ROUTE_ID_FIELDS: [&str; 2] = ["routeId", "id"];
const RIDE_ROUTE_FIELDS: [&str; 2] = ["routeId", "routeServiceId"];
const RIDE_MODE_FIELDS: [&str; 2] = ["mode", "type"];
const STOP_ID_FIELDS: [&str; 1] = ["stopId"];
const ORIGIN_SCHEDULED_FIELDS: [&str; 3] = ["scheduledDepartureTime", "scheduledArrivalTime", "scheduledAt"];
const ORIGIN_LIVE_FIELDS: [&str; 2] = ["expectedArrivalTime", "expectedDepartureTime"];
const DESTINATION_TIME_FIELDS: [&str; 3] = ["expectedArrivalTime", "scheduledArrivalTime", "scheduledAt"];

const UNNAMED_SHUTTLE: &str = "Shuttle";
const DELAY_THRESHOLD_MS: i64 = 60_000;

lazy_static! {
    static ref EXCLUDED_ROUTE: Regex =
        Regex::new(r"(?i)manhattanville|\bm['’]?ville\b").expect("valid route exclusion pattern");
}

// ============================================================================
// Tolerant field access
// ============================================================================

/// First candidate field that is present, i.e. neither null nor an empty string.
pub fn resolve_field<'a>(record: &'a Record, candidates: &[&str]) -> Option<&'a Value> {
    candidates.iter().find_map(|name| match record.get(*name) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(value) => Some(value),
    })
}

/// Same as `resolve_field`, stringifying numeric identifiers.
pub fn resolve_str(record: &Record, candidates: &[&str]) -> Option<String> {
    match resolve_field(record, candidates)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First candidate holding a timestamp that parses, with its raw text.
fn resolve_time(record: &Record, candidates: &[&str], tz: Tz) -> Option<(String, DateTime<Tz>)> {
    candidates.iter().find_map(|name| {
        let raw = resolve_str(record, &[*name])?;
        let parsed = parse_timestamp(&raw, tz)?;
        Some((raw, parsed))
    })
}

/// Strip the single-key envelope some upstream stop-status entries carry.
fn unwrap_envelope(value: &Value) -> Option<&Record> {
    let record = value.as_object()?;
    if record.len() == 1 {
        if let Some(Value::Object(inner)) = record.values().next() {
            return Some(inner);
        }
    }
    Some(record)
}

// ============================================================================
// Routes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteColor {
    Green,
    Red,
    Blue,
}

impl RouteColor {
    // Inference order, first match wins.
    const PRIORITY: [RouteColor; 3] = [RouteColor::Green, RouteColor::Red, RouteColor::Blue];

    fn needle(self) -> &'static str {
        match self {
            RouteColor::Green => "green",
            RouteColor::Red => "red",
            RouteColor::Blue => "blue",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RouteColor::Green => "Green",
            RouteColor::Red => "Red",
            RouteColor::Blue => "Blue",
        }
    }

    pub fn bucket_key(self) -> &'static str {
        self.needle()
    }

    pub fn infer(name: &str, short_name: &str) -> Option<RouteColor> {
        let name = name.to_lowercase();
        let short_name = short_name.to_lowercase();
        Self::PRIORITY
            .into_iter()
            .find(|color| name.contains(color.needle()) || short_name.contains(color.needle()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub color_label: Option<RouteColor>,
}

impl Route {
    fn unnamed_shuttle() -> Self {
        Route {
            id: String::new(),
            name: UNNAMED_SHUTTLE.to_string(),
            short_name: UNNAMED_SHUTTLE.to_string(),
            color_label: None,
        }
    }

    pub fn is_excluded(&self) -> bool {
        EXCLUDED_ROUTE.is_match(&self.name) || EXCLUDED_ROUTE.is_match(&self.short_name)
    }

    /// Unlabelled routes land in the blue bucket.
    pub fn bucket(&self) -> RouteColor {
        self.color_label.unwrap_or(RouteColor::Blue)
    }

    pub fn display_color(&self) -> String {
        match self.color_label {
            Some(color) => color.label().to_string(),
            None => capitalize(self.bucket().bucket_key()),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Index route descriptors by identifier. Descriptors without an id are skipped.
pub fn build_route_directory(routes: &[Value]) -> HashMap<String, Route> {
    routes
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|raw| {
            let id = resolve_str(raw, &ROUTE_ID_FIELDS)?;
            let name = resolve_str(raw, &["name"]);
            let short_name = resolve_str(raw, &["shortName"]);

            let name = name
                .clone()
                .or_else(|| short_name.clone())
                .unwrap_or_else(|| UNNAMED_SHUTTLE.to_string());
            let short_name = short_name.unwrap_or_else(|| name.clone());
            let color_label = RouteColor::infer(&name, &short_name);

            Some((id.clone(), Route { id, name, short_name, color_label }))
        })
        .collect()
}

// ============================================================================
// Rides
// ============================================================================

fn is_walking(ride: &Record) -> bool {
    resolve_str(ride, &RIDE_MODE_FIELDS)
        .map(|mode| mode.to_lowercase().contains("walk"))
        .unwrap_or(false)
}

fn resolve_ride_route(ride: &Record, directory: &HashMap<String, Route>) -> Route {
    RIDE_ROUTE_FIELDS
        .iter()
        .filter_map(|field| resolve_str(ride, &[*field]))
        .find_map(|id| directory.get(&id).cloned())
        .unwrap_or_else(Route::unnamed_shuttle)
}

#[derive(Debug, Default)]
struct StopVisits<'a> {
    origin: Option<&'a Record>,
    destination: Option<&'a Record>,
}

/// One pass over the ride's stop-status list, keeping the first record seen
/// for the origin and for the destination.
fn locate_stop_visits<'a>(ride: &'a Record, origin_id: &str, destination_id: &str) -> StopVisits<'a> {
    let mut visits = StopVisits::default();
    let Some(statuses) = ride.get("stopStatus").and_then(Value::as_array) else {
        return visits;
    };

    for record in statuses.iter().filter_map(unwrap_envelope) {
        let Some(stop_id) = resolve_str(record, &STOP_ID_FIELDS) else {
            continue;
        };
        if visits.origin.is_none() && stop_id.eq_ignore_ascii_case(origin_id) {
            visits.origin = Some(record);
        } else if visits.destination.is_none() && stop_id.eq_ignore_ascii_case(destination_id) {
            visits.destination = Some(record);
        }
        if visits.origin.is_some() && visits.destination.is_some() {
            break;
        }
    }
    visits
}

#[derive(Debug)]
struct OriginTiming {
    raw: String,
    live: DateTime<Tz>,
    scheduled: Option<DateTime<Tz>>,
}

fn origin_timing(record: &Record, tz: Tz) -> Option<OriginTiming> {
    let scheduled = resolve_time(record, &ORIGIN_SCHEDULED_FIELDS, tz);
    let (raw, live) = resolve_time(record, &ORIGIN_LIVE_FIELDS, tz).or_else(|| scheduled.clone())?;
    Some(OriginTiming {
        raw,
        live,
        scheduled: scheduled.map(|(_, t)| t),
    })
}

fn is_delayed(timing: &OriginTiming) -> bool {
    timing
        .scheduled
        .map(|scheduled| timing.live.signed_duration_since(scheduled).num_milliseconds() > DELAY_THRESHOLD_MS)
        .unwrap_or(false)
}

fn is_direct(timing: &OriginTiming, destination: Option<&Record>, tz: Tz) -> bool {
    destination
        .and_then(|record| resolve_time(record, &DESTINATION_TIME_FIELDS, tz))
        .map(|(_, arrives)| timing.live < arrives)
        .unwrap_or(false)
}

// ============================================================================
// Output
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalEntry {
    pub route_name: String,
    pub color: String,
    pub time: String,
    #[serde(rename = "rawISO")]
    pub raw_iso: String,
    pub in_minutes: i64,
    pub direct: bool,
    pub delayed: bool,
    #[serde(skip)]
    pub instant: DateTime<Tz>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopArrivals {
    pub stop_name: String,
    pub green: Vec<ArrivalEntry>,
    pub red: Vec<ArrivalEntry>,
    pub blue: Vec<ArrivalEntry>,
}

impl StopArrivals {
    fn empty(stop_name: &str) -> Self {
        StopArrivals {
            stop_name: stop_name.to_string(),
            green: Vec::new(),
            red: Vec::new(),
            blue: Vec::new(),
        }
    }

    fn bucket_mut(&mut self, color: RouteColor) -> &mut Vec<ArrivalEntry> {
        match color {
            RouteColor::Green => &mut self.green,
            RouteColor::Red => &mut self.red,
            RouteColor::Blue => &mut self.blue,
        }
    }

    pub fn buckets(&self) -> [&Vec<ArrivalEntry>; 3] {
        [&self.green, &self.red, &self.blue]
    }

    pub fn len(&self) -> usize {
        self.buckets().iter().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets().iter().all(|b| b.is_empty())
    }

    fn sort_and_cap(&mut self, max_per_bucket: usize) {
        for color in RouteColor::PRIORITY {
            let bucket = self.bucket_mut(color);
            bucket.sort_by(|a, b| a.instant.cmp(&b.instant));
            bucket.truncate(max_per_bucket);
        }
    }

    /// Drop entries that start before `now`.
    pub fn retain_upcoming(&mut self, now: &DateTime<Tz>) {
        for color in RouteColor::PRIORITY {
            self.bucket_mut(color).retain(|entry| entry.instant >= *now);
        }
    }
}

// ============================================================================
// Normalizer
// ============================================================================

#[derive(Debug, Default)]
struct SkipCounts {
    malformed: usize,
    walking: usize,
    excluded: usize,
    off_origin: usize,
    untimed: usize,
    departed: usize,
}

pub struct CommutePlanNormalizer {
    destination_stop_id: String,
    timezone: Tz,
    max_per_bucket: usize,
}

impl CommutePlanNormalizer {
    pub fn new(config: &TransitConfig) -> Self {
        CommutePlanNormalizer {
            destination_stop_id: config.destination.stop_id.clone(),
            timezone: config.timezone,
            max_per_bucket: config.max_per_bucket,
        }
    }

    /// Derive the bucketed arrival board for one origin from a raw commute plan.
    ///
    /// Rides that left before `now` are dropped before each bucket is capped, so
    /// they never crowd out upcoming ones. `StopArrivals::retain_upcoming`
    /// re-checks against a later `now` once the response is assembled.
    pub fn normalize(&self, plan: &Value, origin: &StopLocation, now: &DateTime<Tz>) -> StopArrivals {
        let mut arrivals = StopArrivals::empty(&origin.name);
        let empty = Vec::new();

        let routes = plan.get("routes").and_then(Value::as_array).unwrap_or(&empty);
        let rides = plan.get("rides").and_then(Value::as_array).unwrap_or(&empty);
        let directory = build_route_directory(routes);

        let mut skipped = SkipCounts::default();
        for ride in rides {
            let Some(ride) = ride.as_object() else {
                skipped.malformed += 1;
                continue;
            };
            if is_walking(ride) {
                skipped.walking += 1;
                continue;
            }

            let route = resolve_ride_route(ride, &directory);
            if route.is_excluded() {
                debug!("Skipping ride on excluded route {} ({})", route.id, route.name);
                skipped.excluded += 1;
                continue;
            }

            let visits = locate_stop_visits(ride, &origin.stop_id, &self.destination_stop_id);
            let Some(origin_record) = visits.origin else {
                skipped.off_origin += 1;
                continue;
            };
            let Some(timing) = origin_timing(origin_record, self.timezone) else {
                skipped.untimed += 1;
                continue;
            };
            if timing.live < *now {
                skipped.departed += 1;
                continue;
            }

            let entry = ArrivalEntry {
                route_name: route.name.clone(),
                color: route.display_color(),
                time: format_clock_time(&timing.live),
                raw_iso: timing.raw.clone(),
                in_minutes: minutes_until(&timing.live, now),
                direct: is_direct(&timing, visits.destination, self.timezone),
                delayed: is_delayed(&timing),
                instant: timing.live,
            };
            arrivals.bucket_mut(route.bucket()).push(entry);
        }

        arrivals.sort_and_cap(self.max_per_bucket);

        debug!(
            "{}: {} of {} rides kept (malformed {}, walking {}, excluded {}, off-origin {}, untimed {}, departed {})",
            origin.name,
            arrivals.len(),
            rides.len(),
            skipped.malformed,
            skipped.walking,
            skipped.excluded,
            skipped.off_origin,
            skipped.untimed,
            skipped.departed
        );

        arrivals
    }
}
