pub mod constants;
pub mod control;
pub mod errors;
pub mod telemetry_system;
pub mod trajectory_system;
pub mod utils;

pub use constants::*;
pub use control::body::CelestialBody;
pub use control::runner::{RunOutcome, RunRecord, ScenarioReport, ScenarioRunner};
pub use control::scenario::ScenarioConfig;
pub use errors::{SimulationError, SimulationResult};

// Re-export commonly used items from trajectory_system
pub use trajectory_system::adaptive::{AdaptiveSolverAdapter, SampleGrid};
pub use trajectory_system::dynamics::{CentralGravity, Dynamics, UniformGravity};
pub use trajectory_system::integrator::{FixedStepScheme, Integrator};
pub use trajectory_system::ode_solver::{SolverMethod, Tolerances};
pub use trajectory_system::state::State;
pub use trajectory_system::trajectory::{Termination, Trajectory, TrajectoryBuilder};

// Re-export commonly used items from telemetry_system
pub use telemetry_system::error_harness::{compare, energy_drift, ErrorSeries};
pub use telemetry_system::report::Report;

// Re-export commonly used utilities
pub use utils::vector2d::Vector2D;
