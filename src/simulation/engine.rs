use crate::asset::{Asset, AssetStatus, AssetType, AssetUpdate, Bounds, StatusChange};
use crate::config::{ConfigError, SimulationConfig};
use crate::simulation::kinematics::{self, Movement};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Latest full-fleet view, shared with the gateway for initial sync
pub type FleetSnapshot = Arc<Vec<AssetUpdate>>;

const CALLSIGNS: [&str; 20] = [
    "ALPHA", "BRAVO", "CHARLIE", "DELTA", "ECHO", "FOXTROT", "GOLF", "HOTEL", "INDIA", "JULIET",
    "KILO", "LIMA", "MIKE", "NOVEMBER", "OSCAR", "PAPA", "QUEBEC", "ROMEO", "SIERRA", "TANGO",
];

/// Everything one tick produced
#[derive(Debug, Clone)]
pub struct TickOutcome {
    /// 1-based tick counter
    pub tick: u64,
    pub updates: Vec<AssetUpdate>,
    pub status_changes: Vec<StatusChange>,
}

/// Owns the authoritative asset table and advances it once per tick.
///
/// Single writer: only the tick loop holds `&mut Simulator`. Readers get
/// snapshots through [`Simulator::subscribe_snapshots`].
pub struct Simulator {
    assets: Vec<Asset>,
    bounds: Bounds,
    tick_seconds: f64,
    rng: StdRng,
    ticks: u64,
    snapshot_tx: watch::Sender<FleetSnapshot>,
}

impl Simulator {
    /// Build the fleet described by `config`
    pub fn from_config(config: &SimulationConfig) -> Result<Self, ConfigError> {
        if !config.bounds.is_valid() {
            return Err(ConfigError::InvalidBounds(config.bounds));
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let assets = spawn_fleet(
            config.asset_count,
            &config.asset_id_prefix,
            &config.bounds,
            &mut rng,
        );

        info!(
            assets = assets.len(),
            tick_ms = config.tick_interval_ms,
            "Initialized simulated fleet"
        );

        Self::with_assets(assets, config.bounds, config.tick_seconds(), rng)
    }

    /// Build a simulator over an explicit asset table
    pub fn with_assets(
        assets: Vec<Asset>,
        bounds: Bounds,
        tick_seconds: f64,
        rng: StdRng,
    ) -> Result<Self, ConfigError> {
        if !bounds.is_valid() {
            return Err(ConfigError::InvalidBounds(bounds));
        }
        if tick_seconds <= 0.0 {
            return Err(ConfigError::ZeroTickInterval);
        }

        let now = Utc::now();
        let initial: Vec<AssetUpdate> = assets.iter().map(|a| a.snapshot(now)).collect();
        let (snapshot_tx, _) = watch::channel(Arc::new(initial));

        Ok(Self {
            assets,
            bounds,
            tick_seconds,
            rng,
            ticks: 0,
            snapshot_tx,
        })
    }

    /// Advance every asset once and snapshot the result
    pub fn tick(&mut self) -> TickOutcome {
        let now = Utc::now();
        let mut updates = Vec::with_capacity(self.assets.len());
        let mut status_changes = Vec::new();

        for asset in &mut self.assets {
            let movement =
                kinematics::advance(asset, &self.bounds, self.tick_seconds, &mut self.rng);

            if let Movement::Retargeted {
                status_change: Some((previous_status, new_status)),
            } = movement
            {
                status_changes.push(StatusChange {
                    id: asset.id.clone(),
                    previous_status,
                    new_status,
                    timestamp: now,
                });
            }

            updates.push(asset.snapshot(now));
        }

        self.ticks += 1;
        self.snapshot_tx.send_replace(Arc::new(updates.clone()));

        TickOutcome {
            tick: self.ticks,
            updates,
            status_changes,
        }
    }

    /// Receiver that always holds the most recent fleet snapshot
    pub fn subscribe_snapshots(&self) -> watch::Receiver<FleetSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }
}

/// Generate `count` assets with ids `<id_prefix>-<n>` at random positions
/// inside `bounds`
pub fn spawn_fleet<R: Rng + ?Sized>(
    count: usize,
    id_prefix: &str,
    bounds: &Bounds,
    rng: &mut R,
) -> Vec<Asset> {
    (0..count)
        .map(|i| Asset {
            id: format!("{}-{}", id_prefix, i + 1),
            callsign: format!(
                "{}-{}",
                CALLSIGNS[i % CALLSIGNS.len()],
                i / CALLSIGNS.len() + 1
            ),
            asset_type: AssetType::ALL[rng.gen_range(0..AssetType::ALL.len())],
            status: AssetStatus::Active,
            position: kinematics::random_position(bounds, rng),
            speed: 20.0 + rng.gen::<f64>() * 60.0,
            heading: rng.gen::<f64>() * 360.0,
            target_position: kinematics::random_position(bounds, rng),
        })
        .collect()
}
