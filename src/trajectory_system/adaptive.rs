use tracing::debug;

use crate::errors::{SimulationError, SimulationResult};
use crate::trajectory_system::dynamics::Dynamics;
use crate::trajectory_system::ode_solver::{
    DenseSolution, EmbeddedRungeKutta, OdeSolver, OdeSystem, SolverMethod, Tolerances,
};
use crate::trajectory_system::state::State;
use crate::trajectory_system::trajectory::{whole_steps, Termination, Trajectory};

/// Uniformly spaced sample times from `t0` to `t_end`, both included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleGrid {
    pub t0: f64,
    pub t_end: f64,
    pub points: usize,
}

impl SampleGrid {
    pub fn new(t0: f64, t_end: f64, points: usize) -> SimulationResult<Self> {
        if points == 0 {
            return Err(SimulationError::PreconditionError(
                "a sample grid needs at least one point".to_string(),
            ));
        }
        if !t0.is_finite() || !t_end.is_finite() || (points > 1 && t_end <= t0) {
            return Err(SimulationError::PreconditionError(format!(
                "cannot place {} samples on [{}, {}]",
                points, t0, t_end
            )));
        }
        Ok(SampleGrid { t0, t_end, points })
    }

    /// Grid with one sample every `dt`: `⌊(t_end − t0)/dt⌋ + 1` points spread over
    /// the whole interval.
    pub fn from_step(t0: f64, t_end: f64, dt: f64) -> SimulationResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimulationError::PreconditionError(format!(
                "sample step must be finite and positive, got {}",
                dt
            )));
        }
        SampleGrid::new(t0, t_end, whole_steps(t_end - t0, dt)? + 1)
    }

    pub fn time(&self, index: usize) -> f64 {
        if self.points == 1 {
            return self.t0;
        }
        if index + 1 == self.points {
            return self.t_end;
        }
        let spacing = (self.t_end - self.t0) / (self.points - 1) as f64;
        self.t0 + index as f64 * spacing
    }

    pub fn times(&self) -> Vec<f64> {
        (0..self.points).map(|i| self.time(i)).collect()
    }
}

/// Presents a [`Dynamics`] through the flat interface ODE solvers expect.
struct FlatDynamics<'a> {
    dynamics: &'a dyn Dynamics,
}

impl OdeSystem<4> for FlatDynamics<'_> {
    fn rhs(&self, t: f64, y: &[f64; 4]) -> SimulationResult<[f64; 4]> {
        self.dynamics.rhs(t, y)
    }
}

/// Runs an adaptive ODE solver and samples its dense solution into a [`Trajectory`].
#[derive(Debug, Clone)]
pub struct AdaptiveSolverAdapter<S = EmbeddedRungeKutta> {
    solver: S,
    method: SolverMethod,
    tolerances: Tolerances,
}

impl AdaptiveSolverAdapter<EmbeddedRungeKutta> {
    pub fn embedded(method: SolverMethod, tolerances: Tolerances) -> Self {
        AdaptiveSolverAdapter::new(EmbeddedRungeKutta::default(), method, tolerances)
    }
}

impl<S: OdeSolver<4>> AdaptiveSolverAdapter<S> {
    pub fn new(solver: S, method: SolverMethod, tolerances: Tolerances) -> Self {
        AdaptiveSolverAdapter {
            solver,
            method,
            tolerances,
        }
    }

    /// Integrates from `state0` to `t_end` and samples `sample_points` uniformly spaced
    /// states, the first being `state0` and the last at `t_end`.
    pub fn solve(
        &self,
        state0: State,
        t_end: f64,
        sample_points: usize,
        dynamics: &dyn Dynamics,
    ) -> SimulationResult<Trajectory> {
        let grid = SampleGrid::new(state0.time(), t_end, sample_points)?;
        self.solve_on_grid(state0, &grid, dynamics)
    }

    pub fn solve_on_grid(
        &self,
        state0: State,
        grid: &SampleGrid,
        dynamics: &dyn Dynamics,
    ) -> SimulationResult<Trajectory> {
        if grid.t0 != state0.time() {
            return Err(SimulationError::PreconditionError(format!(
                "sample grid starts at {} but the initial state is at {}",
                grid.t0,
                state0.time()
            )));
        }
        debug!(
            method = self.method.name(),
            rtol = self.tolerances.rtol,
            atol = self.tolerances.atol,
            samples = grid.points,
            "running adaptive solver"
        );

        let t_end = if grid.points == 1 { grid.t0 } else { grid.t_end };
        let system = FlatDynamics { dynamics };
        let solution = self.solver.integrate(
            &system,
            state0.time(),
            state0.to_array(),
            t_end,
            self.method,
            &self.tolerances,
        )?;

        let states = grid
            .times()
            .into_iter()
            .map(|t| -> SimulationResult<State> {
                Ok(State::from_array(t, solution.evaluate(t)?))
            })
            .collect::<SimulationResult<Vec<_>>>()?;

        Trajectory::from_samples(states, Termination::EndTime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::EARTH_MU;
    use crate::trajectory_system::analytic::{circular_orbit_state, circular_velocity};
    use crate::trajectory_system::dynamics::CentralGravity;
    use crate::utils::vector2d::Vector2D;
    use approx::assert_relative_eq;

    fn circular_state() -> State {
        let r = Vector2D::new(0.0, 7.0e6);
        State::new(0.0, r, circular_velocity(r, EARTH_MU).unwrap())
    }

    #[test]
    fn test_grid_from_step_matches_linspace() {
        let grid = SampleGrid::from_step(0.0, 6000.0, 60.0).unwrap();
        assert_eq!(grid.points, 101);
        let times = grid.times();
        assert_eq!(times[0], 0.0);
        assert_eq!(times[1], 60.0);
        assert_eq!(times[100], 6000.0);
    }

    #[test]
    fn test_grid_with_uneven_step_still_ends_at_t_end() {
        let grid = SampleGrid::from_step(0.0, 100.0, 30.0).unwrap();
        assert_eq!(grid.points, 4);
        assert_eq!(grid.times().last().copied(), Some(100.0));
    }

    #[test]
    fn test_single_point_grid_sits_at_start() {
        let grid = SampleGrid::new(0.0, 50.0, 1).unwrap();
        assert_eq!(grid.time(0), 0.0);
        assert_eq!(grid.times(), vec![0.0]);
    }

    #[test]
    fn test_grid_from_step_stays_inside_interval() {
        let grid = SampleGrid::from_step(0.0, 1.0e8 + 0.95, 1.0e6).unwrap();
        assert_eq!(grid.points, 101);
        let grid = SampleGrid::from_step(0.0, 0.3, 0.1).unwrap();
        assert_eq!(grid.points, 4);
        assert_eq!(grid.times().last().copied(), Some(0.3));
        assert!(SampleGrid::from_step(0.0, 1.0, 1e-300).is_err());
    }

    #[test]
    fn test_invalid_grids_are_rejected() {
        assert!(SampleGrid::new(0.0, 10.0, 0).is_err());
        assert!(SampleGrid::new(10.0, 0.0, 5).is_err());
        assert!(SampleGrid::from_step(0.0, 10.0, 0.0).is_err());
        assert!(SampleGrid::new(0.0, 0.0, 1).is_ok());
    }

    #[test]
    fn test_rk45_tracks_exact_circular_orbit() {
        let gravity = CentralGravity::new(EARTH_MU);
        let adapter = AdaptiveSolverAdapter::embedded(
            SolverMethod::Rk45,
            Tolerances::new(1e-10, 1e-6),
        );
        let state0 = circular_state();
        let trajectory = adapter.solve(state0, 6000.0, 101, &gravity).unwrap();

        assert_eq!(trajectory.len(), 101);
        assert_eq!(trajectory.termination(), Termination::EndTime);
        for state in &trajectory {
            let exact = circular_orbit_state(&state0, state.time(), EARTH_MU).unwrap();
            let error = (state.position() - exact.position()).magnitude();
            assert!(error < 10.0, "position error {} m at t = {}", error, state.time());
        }
    }

    #[test]
    fn test_first_sample_is_initial_state() {
        let gravity = CentralGravity::new(EARTH_MU);
        let adapter =
            AdaptiveSolverAdapter::embedded(SolverMethod::Rk23, Tolerances::new(1e-8, 1e-3));
        let state0 = State::from_components(0.0, 0.0, 7.0e6, 7.5e3, 0.0);
        let trajectory = adapter.solve(state0, 600.0, 11, &gravity).unwrap();
        assert_eq!(*trajectory.initial(), state0);
        assert_relative_eq!(trajectory.last().time(), 600.0);
    }

    #[test]
    fn test_unsupported_method_surfaces_solver_error() {
        let gravity = CentralGravity::new(EARTH_MU);
        let adapter =
            AdaptiveSolverAdapter::embedded(SolverMethod::Bdf, Tolerances::new(1e-8, 1e-3));
        let result = adapter.solve(circular_state(), 600.0, 11, &gravity);
        assert!(matches!(result, Err(SimulationError::SolverError(_))));
    }

    #[test]
    fn test_domain_error_propagates_from_dynamics() {
        let gravity = CentralGravity::new(EARTH_MU);
        let adapter =
            AdaptiveSolverAdapter::embedded(SolverMethod::Rk45, Tolerances::new(1e-8, 1e-3));
        let at_origin = State::from_components(0.0, 0.0, 0.0, 1.0, 0.0);
        let result = adapter.solve(at_origin, 600.0, 11, &gravity);
        assert!(matches!(result, Err(SimulationError::DomainError(_))));
    }
}
