use rayon::prelude::*;
use tracing::debug;

use crate::constants::TIME_MATCH_TOLERANCE;
use crate::errors::{SimulationError, SimulationResult};
use crate::trajectory_system::dynamics::Dynamics;
use crate::trajectory_system::integrator::FixedStepScheme;
use crate::trajectory_system::state::State;
use crate::trajectory_system::trajectory::{Termination, Trajectory, TrajectoryBuilder};
use crate::utils::vector2d::Vector2D;

/// Deviation of a candidate from a reference at one shared sample time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorSample {
    pub t: f64,
    /// `r_candidate − r_reference`
    pub delta_r: Vector2D,
    /// `v_candidate − v_reference`
    pub delta_v: Vector2D,
    /// Candidate energy drift since `t0`, net of the reference's own drift.
    pub delta_energy: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorSeries {
    samples: Vec<ErrorSample>,
}

impl ErrorSeries {
    pub fn samples(&self) -> &[ErrorSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn max_position_error(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.delta_r.magnitude())
            .fold(0.0, f64::max)
    }

    pub fn max_velocity_error(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.delta_v.magnitude())
            .fold(0.0, f64::max)
    }

    pub fn final_energy_drift(&self) -> f64 {
        self.samples.last().map_or(0.0, |s| s.delta_energy)
    }

    pub fn position_error_series(&self) -> Vec<(f64, f64)> {
        self.samples
            .iter()
            .map(|s| (s.t, s.delta_r.magnitude()))
            .collect()
    }

    pub fn velocity_error_series(&self) -> Vec<(f64, f64)> {
        self.samples
            .iter()
            .map(|s| (s.t, s.delta_v.magnitude()))
            .collect()
    }

    pub fn energy_series(&self) -> Vec<(f64, f64)> {
        self.samples.iter().map(|s| (s.t, s.delta_energy)).collect()
    }
}

fn times_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= TIME_MATCH_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Compares two trajectories sample by sample.
///
/// Both must share their sample times; only the overlapping prefix is compared,
/// so the series is as long as the shorter input.
pub fn compare(
    reference: &Trajectory,
    candidate: &Trajectory,
    dynamics: &dyn Dynamics,
) -> SimulationResult<ErrorSeries> {
    if reference.is_empty() || candidate.is_empty() {
        return Err(SimulationError::PreconditionError(
            "cannot compare an empty trajectory".to_string(),
        ));
    }

    let reference_e0 = dynamics.specific_energy(reference.initial())?;
    let candidate_e0 = dynamics.specific_energy(candidate.initial())?;

    let samples = reference
        .iter()
        .zip(candidate.iter())
        .map(|(r, c)| -> SimulationResult<ErrorSample> {
            if !times_match(r.time(), c.time()) {
                return Err(SimulationError::PreconditionError(format!(
                    "sample grids differ: reference at t = {}, candidate at t = {}",
                    r.time(),
                    c.time()
                )));
            }
            let reference_drift = dynamics.specific_energy(r)? - reference_e0;
            let candidate_drift = dynamics.specific_energy(c)? - candidate_e0;
            Ok(ErrorSample {
                t: r.time(),
                delta_r: c.position() - r.position(),
                delta_v: c.velocity() - r.velocity(),
                delta_energy: (candidate_drift - reference_drift).abs(),
            })
        })
        .collect::<SimulationResult<Vec<_>>>()?;

    debug!(samples = samples.len(), "compared trajectories");
    Ok(ErrorSeries { samples })
}

/// `(t, |E(t) − E(t0)|)` along one trajectory.
pub fn energy_drift(
    trajectory: &Trajectory,
    dynamics: &dyn Dynamics,
) -> SimulationResult<Vec<(f64, f64)>> {
    let e0 = dynamics.specific_energy(trajectory.initial())?;
    trajectory
        .iter()
        .map(|state| -> SimulationResult<(f64, f64)> {
            Ok((state.time(), (dynamics.specific_energy(state)? - e0).abs()))
        })
        .collect()
}

/// Evaluates an analytic solution on the sample times of `grid_source`.
pub fn reference_trajectory<F>(grid_source: &Trajectory, exact: F) -> SimulationResult<Trajectory>
where
    F: Fn(f64) -> SimulationResult<State>,
{
    let states = grid_source
        .iter()
        .map(|state| exact(state.time()))
        .collect::<SimulationResult<Vec<_>>>()?;
    Trajectory::from_samples(states, Termination::EndTime)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergencePoint {
    pub dt: f64,
    pub samples: usize,
    pub final_energy_drift: f64,
}

/// One fixed-step run per step size, evaluated in parallel; results follow the
/// order of `step_sizes`.
pub fn convergence_sweep(
    state0: State,
    t_end: f64,
    step_sizes: &[f64],
    scheme: FixedStepScheme,
    dynamics: &dyn Dynamics,
) -> SimulationResult<Vec<ConvergencePoint>> {
    step_sizes
        .par_iter()
        .map(|&dt| -> SimulationResult<ConvergencePoint> {
            let trajectory = TrajectoryBuilder::new(dt, t_end)
                .with_scheme(scheme)
                .build(state0, dynamics)?;
            let drift = energy_drift(&trajectory, dynamics)?;
            Ok(ConvergencePoint {
                dt,
                samples: trajectory.len(),
                final_energy_drift: drift.last().map_or(0.0, |&(_, e)| e),
            })
        })
        .collect()
}

/// Observed order of accuracy between two runs, `log(e_a / e_b) / log(dt_a / dt_b)`.
pub fn observed_order(a: &ConvergencePoint, b: &ConvergencePoint) -> SimulationResult<f64> {
    if a.dt == b.dt || a.final_energy_drift <= 0.0 || b.final_energy_drift <= 0.0 {
        return Err(SimulationError::PreconditionError(format!(
            "observed order needs distinct step sizes and non-zero errors (dt {} / {}, error {:e} / {:e})",
            a.dt, b.dt, a.final_energy_drift, b.final_energy_drift
        )));
    }
    Ok((a.final_energy_drift / b.final_energy_drift).ln() / (a.dt / b.dt).ln())
}
