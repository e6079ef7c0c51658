// Kinematic fleet simulation

mod engine;
pub mod kinematics;
mod ticker;

pub use engine::{spawn_fleet, FleetSnapshot, Simulator, TickOutcome};
pub use ticker::{run_simulation, run_tick, TickReport};
