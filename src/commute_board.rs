// Combines the two per-origin boards into the payload served on /api/commute.

use log::info;
use serde::Serialize;

use crate::commute_plan_client::CommutePlans;
use crate::commute_plan_models::{CommutePlanNormalizer, StopArrivals};
use crate::time_authority::Clock;
use crate::transit_config::TransitConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommuteBoard {
    #[serde(rename = "ecS")]
    pub ecs: StopArrivals,
    pub s120: StopArrivals,
}

/// Normalize each origin independently, then drop trips that have already
/// left, re-reading the clock so time spent upstream is accounted for.
pub fn build_commute_board(config: &TransitConfig, clock: &dyn Clock, plans: &CommutePlans) -> CommuteBoard {
    let normalizer = CommutePlanNormalizer::new(config);

    let normalized_at = clock.now();
    let mut ecs = normalizer.normalize(&plans.ecs, &config.ecs, &normalized_at);
    let mut s120 = normalizer.normalize(&plans.s120, &config.s120, &normalized_at);

    let filter_now = clock.now();
    ecs.retain_upcoming(&filter_now);
    s120.retain_upcoming(&filter_now);

    info!(
        "🚌 Commute board built: {} upcoming at {}, {} upcoming at {}",
        ecs.len(),
        ecs.stop_name,
        s120.len(),
        s120.stop_name
    );

    CommuteBoard { ecs, s120 }
}
