use crate::broadcast::Broadcaster;
use crate::simulation::Simulator;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Deliveries made by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub observers: usize,
    pub deliveries: usize,
}

/// Drive the simulator on a fixed clock.
///
/// Each tick recomputes the fleet and fans it out before the loop awaits the
/// next tick, so ticks never overlap. Late ticks are skipped rather than
/// queued.
pub async fn run_simulation(
    mut simulator: Simulator,
    broadcaster: Arc<Broadcaster>,
    tick_interval: Duration,
    bulk_sync_every_ticks: u64,
) {
    let mut ticker = interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        tick_ms = tick_interval.as_millis() as u64,
        "Simulation started"
    );

    loop {
        ticker.tick().await;
        run_tick(&mut simulator, &broadcaster, bulk_sync_every_ticks);
    }
}

/// One tick: skip when nobody is watching, otherwise advance and fan out.
///
/// Status changes go out before the position updates of the same tick.
pub fn run_tick(
    simulator: &mut Simulator,
    broadcaster: &Broadcaster,
    bulk_sync_every_ticks: u64,
) -> Option<TickReport> {
    let observers = broadcaster.observer_count();
    if observers == 0 {
        trace!("No observers, skipping tick");
        return None;
    }

    let outcome = simulator.tick();
    let mut deliveries = 0;

    for change in &outcome.status_changes {
        info!(
            asset_id = %change.id,
            previous = %change.previous_status,
            new = %change.new_status,
            "Asset status changed"
        );
        deliveries += broadcaster.broadcast_status_change(change);
    }

    for update in &outcome.updates {
        deliveries += broadcaster.broadcast_update(update);
    }

    if bulk_sync_every_ticks > 0 && outcome.tick % bulk_sync_every_ticks == 0 {
        deliveries += broadcaster.broadcast_bulk(outcome.updates.clone());
    }

    debug!(
        tick = outcome.tick,
        assets = outcome.updates.len(),
        observers,
        deliveries,
        "Tick delivered"
    );

    Some(TickReport {
        tick: outcome.tick,
        observers,
        deliveries,
    })
}
