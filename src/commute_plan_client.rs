// Outbound side: builds the commute-plan request for an origin stop and fetches
// the raw plans from the shuttle API. One attempt per request, no retry.

use chrono::{DateTime, SecondsFormat};
use chrono_tz::Tz;
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::time_authority::Clock;
use crate::transit_config::{StopLocation, TransitConfig};
use crate::transit_error::{Result, TransitError};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommutePlanRequest {
    pub region_id: String,
    pub date: String,
    pub depart_at: String,
    pub origin: StopLocation,
    pub destination: StopLocation,
}

impl CommutePlanRequest {
    pub fn for_origin(config: &TransitConfig, origin: &StopLocation, now: &DateTime<Tz>) -> Self {
        CommutePlanRequest {
            region_id: config.region_id.clone(),
            date: now.format("%Y-%m-%d").to_string(),
            depart_at: now.to_rfc3339_opts(SecondsFormat::Secs, false),
            origin: origin.clone(),
            destination: config.destination.clone(),
        }
    }
}

/// Raw plans for both origin stops, fetched together.
#[derive(Debug)]
pub struct CommutePlans {
    pub ecs: Value,
    pub s120: Value,
}

pub struct CommutePlanClient {
    http: reqwest::Client,
    config: Arc<TransitConfig>,
    clock: Arc<dyn Clock>,
}

impl CommutePlanClient {
    pub fn new(config: Arc<TransitConfig>, clock: Arc<dyn Clock>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransitError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(CommutePlanClient { http, config, clock })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub async fn fetch_commute_plan(&self, origin: &StopLocation) -> Result<Value> {
        let payload = CommutePlanRequest::for_origin(&self.config, origin, &self.clock.now());

        let mut request = self.http.post(&self.config.commute_plan_url).json(&payload);
        if let Some(key) = &self.config.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|e| {
            warn!("⚠️  Commute plan request for {} failed: {}", origin.name, e);
            TransitError::NetworkError(format!("Failed to fetch commute plan: {}", e))
        })?;

        if !response.status().is_success() {
            warn!("⚠️  Commute plan API returned {} for {}", response.status(), origin.name);
            return Err(TransitError::StatusError(response.status().as_u16()));
        }

        let body = response.text().await?;
        let plan: Value = serde_json::from_str(&body)?;

        info!(
            "✓ Commute plan for {}: {} rides, {} routes",
            origin.name,
            plan.get("rides").and_then(Value::as_array).map_or(0, Vec::len),
            plan.get("routes").and_then(Value::as_array).map_or(0, Vec::len)
        );
        Ok(plan)
    }

    /// Both origins are requested concurrently; either failure fails the pair.
    pub async fn fetch_both(&self) -> Result<CommutePlans> {
        let (ecs, s120) = tokio::try_join!(
            self.fetch_commute_plan(&self.config.ecs),
            self.fetch_commute_plan(&self.config.s120),
        )?;
        Ok(CommutePlans { ecs, s120 })
    }
}
