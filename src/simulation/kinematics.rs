//! Per-asset movement model.
//!
//! Pure functions over an [`Asset`] and a caller-supplied RNG so the tick can
//! be replayed deterministically from a seed.

use crate::asset::{Asset, AssetStatus, Bounds, Position};
use rand::Rng;

/// Distance (coordinate units) below which an asset has reached its target
pub const ARRIVAL_THRESHOLD: f64 = 0.005;

/// Rough kilometres per degree used to turn km/h into degrees per tick
pub const KM_PER_DEGREE: f64 = 111.0;

pub const MIN_SPEED_KMH: f64 = 10.0;
pub const MAX_SPEED_KMH: f64 = 100.0;

/// Total width of the symmetric per-tick speed jitter (±2.5 km/h)
pub const SPEED_JITTER_KMH: f64 = 5.0;

/// Chance that arriving at a waypoint resamples the asset status
pub const STATUS_RESAMPLE_PROBABILITY: f64 = 0.1;

/// Weighted so idle is picked a third of the time
const RESAMPLED_STATUSES: [AssetStatus; 3] =
    [AssetStatus::Active, AssetStatus::Idle, AssetStatus::Active];

/// Result of advancing one asset by one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Movement {
    /// Moved toward the current target
    EnRoute,
    /// Arrived; a new target was chosen. Carries the status transition, if any.
    Retargeted {
        status_change: Option<(AssetStatus, AssetStatus)>,
    },
}

/// Bearing from a delta, degrees clockwise from north, in [0, 360)
pub fn bearing_degrees(d_lng: f64, d_lat: f64) -> f64 {
    normalize_heading(d_lng.atan2(d_lat).to_degrees())
}

pub fn normalize_heading(degrees: f64) -> f64 {
    let heading = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if heading >= 360.0 {
        0.0
    } else {
        heading
    }
}

/// Degrees travelled in one tick at `speed_kmh`
pub fn step_distance(speed_kmh: f64, tick_seconds: f64) -> f64 {
    speed_kmh / 3600.0 / KM_PER_DEGREE * tick_seconds
}

pub fn jitter_speed<R: Rng + ?Sized>(speed_kmh: f64, rng: &mut R) -> f64 {
    let jitter = (rng.gen::<f64>() - 0.5) * SPEED_JITTER_KMH;
    (speed_kmh + jitter).clamp(MIN_SPEED_KMH, MAX_SPEED_KMH)
}

/// Uniformly random point inside `bounds`
pub fn random_position<R: Rng + ?Sized>(bounds: &Bounds, rng: &mut R) -> Position {
    Position::new(
        bounds.min_lng + rng.gen::<f64>() * (bounds.max_lng - bounds.min_lng),
        bounds.min_lat + rng.gen::<f64>() * (bounds.max_lat - bounds.min_lat),
    )
}

/// Advance `asset` by one tick.
///
/// Within the arrival threshold the asset re-targets and stays put this tick;
/// otherwise it turns toward the target and moves one step. The step is capped
/// at the remaining distance, so an asset never passes its waypoint.
pub fn advance<R: Rng + ?Sized>(
    asset: &mut Asset,
    bounds: &Bounds,
    tick_seconds: f64,
    rng: &mut R,
) -> Movement {
    let d_lng = asset.target_position.lng - asset.position.lng;
    let d_lat = asset.target_position.lat - asset.position.lat;
    let distance = (d_lng * d_lng + d_lat * d_lat).sqrt();

    if distance < ARRIVAL_THRESHOLD {
        asset.target_position = random_position(bounds, rng);
        let mut status_change = None;
        if rng.gen::<f64>() < STATUS_RESAMPLE_PROBABILITY {
            let previous = asset.status;
            asset.status = RESAMPLED_STATUSES[rng.gen_range(0..RESAMPLED_STATUSES.len())];
            if previous != asset.status {
                status_change = Some((previous, asset.status));
            }
        }
        return Movement::Retargeted { status_change };
    }

    asset.heading = bearing_degrees(d_lng, d_lat);

    let ratio = (step_distance(asset.speed, tick_seconds) / distance).min(1.0);
    asset.position = bounds.clamp(Position::new(
        asset.position.lng + d_lng * ratio,
        asset.position.lat + d_lat * ratio,
    ));

    asset.speed = jitter_speed(asset.speed, rng);

    Movement::EnRoute
}
