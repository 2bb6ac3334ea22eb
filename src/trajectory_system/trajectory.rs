use tracing::{debug, warn};

use crate::constants::TIME_MATCH_TOLERANCE;
use crate::errors::{SimulationError, SimulationResult};
use crate::trajectory_system::dynamics::Dynamics;
use crate::trajectory_system::integrator::{check_step_size, FixedStepScheme, Integrator};
use crate::trajectory_system::state::State;

/// Why a trajectory ended where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The last sample is the last grid point not past the requested end time.
    EndTime,
    /// The stop predicate fired on the last sample.
    StopCondition,
}

/// Ordered samples of one integration run.
///
/// Sample times are strictly increasing. Once built, a trajectory is read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    states: Vec<State>,
    termination: Termination,
}

impl Trajectory {
    pub(crate) fn from_samples(
        states: Vec<State>,
        termination: Termination,
    ) -> SimulationResult<Self> {
        if states.is_empty() {
            return Err(SimulationError::PreconditionError(
                "a trajectory needs at least one sample".to_string(),
            ));
        }
        if let Some(pair) = states.windows(2).find(|w| w[1].time() <= w[0].time()) {
            return Err(SimulationError::PreconditionError(format!(
                "sample times must be strictly increasing, got {} then {}",
                pair[0].time(),
                pair[1].time()
            )));
        }
        Ok(Trajectory {
            states,
            termination,
        })
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn initial(&self) -> &State {
        &self.states[0]
    }

    pub fn last(&self) -> &State {
        &self.states[self.states.len() - 1]
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn iter(&self) -> std::slice::Iter<'_, State> {
        self.states.iter()
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    pub fn times(&self) -> Vec<f64> {
        self.states.iter().map(State::time).collect()
    }

    /// Every `stride`-th sample starting with the first, e.g. to put a fine fixed-step
    /// run on the grid of a coarser one.
    pub fn subsample(&self, stride: usize) -> SimulationResult<Trajectory> {
        if stride == 0 {
            return Err(SimulationError::PreconditionError(
                "subsample stride must be at least 1".to_string(),
            ));
        }
        let states = self.states.iter().step_by(stride).copied().collect();
        Trajectory::from_samples(states, self.termination)
    }

    /// `(t, x, y)` triples.
    pub fn position_series(&self) -> Vec<(f64, f64, f64)> {
        self.states
            .iter()
            .map(|s| (s.time(), s.position().x, s.position().y))
            .collect()
    }

    /// `(t, vx, vy)` triples.
    pub fn velocity_series(&self) -> Vec<(f64, f64, f64)> {
        self.states
            .iter()
            .map(|s| (s.time(), s.velocity().x, s.velocity().y))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a State;
    type IntoIter = std::slice::Iter<'a, State>;

    fn into_iter(self) -> Self::IntoIter {
        self.states.iter()
    }
}

pub type StopCondition = Box<dyn Fn(&State) -> bool + Send + Sync>;

/// Stops once the height (`y`) drops below `threshold`, e.g. ground impact at zero.
pub fn altitude_below(threshold: f64) -> StopCondition {
    Box::new(move |state: &State| state.position().y < threshold)
}

// fraction of a step still counted as a whole step
const STEP_SLACK: f64 = 1e-9;

// samples reserved up front; longer runs grow the buffer as they go
const PREALLOCATED_SAMPLES: usize = 1 << 16;

/// Number of whole steps of `dt` that fit in `span`, tolerant of representation
/// error so that `1.0 / 0.1` counts ten steps.
pub(crate) fn whole_steps(span: f64, dt: f64) -> SimulationResult<usize> {
    if span.is_nan() || span <= 0.0 {
        return Ok(0);
    }
    let ratio = span / dt;
    // leaves room for the `+ 1` of the initial sample
    if !ratio.is_finite() || ratio >= (usize::MAX / 2) as f64 {
        return Err(SimulationError::PreconditionError(format!(
            "{} steps of {} do not fit in a trajectory",
            ratio, dt
        )));
    }
    let mut steps = (ratio + STEP_SLACK).floor();
    if steps > 0.0 && steps * dt > span + TIME_MATCH_TOLERANCE * span.max(1.0) {
        steps -= 1.0;
    }
    Ok(steps as usize)
}

/// Repeatedly applies a fixed-step scheme from an initial state up to an end time.
pub struct TrajectoryBuilder {
    dt: f64,
    t_end: f64,
    scheme: FixedStepScheme,
    stop_condition: Option<StopCondition>,
}

impl TrajectoryBuilder {
    pub fn new(dt: f64, t_end: f64) -> Self {
        TrajectoryBuilder {
            dt,
            t_end,
            scheme: FixedStepScheme::ExplicitEuler,
            stop_condition: None,
        }
    }

    pub fn with_scheme(mut self, scheme: FixedStepScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_stop_condition<F>(mut self, should_stop: F) -> Self
    where
        F: Fn(&State) -> bool + Send + Sync + 'static,
    {
        self.stop_condition = Some(Box::new(should_stop));
        self
    }

    pub fn build(&self, state0: State, dynamics: &dyn Dynamics) -> SimulationResult<Trajectory> {
        check_step_size(self.dt)?;
        if !self.t_end.is_finite() || !state0.is_finite() {
            return Err(SimulationError::PreconditionError(format!(
                "end time {} and initial state must be finite",
                self.t_end
            )));
        }

        let t0 = state0.time();
        let steps = whole_steps(self.t_end - t0, self.dt)?;
        debug!(
            scheme = self.scheme.name(),
            dt = self.dt,
            t_end = self.t_end,
            steps,
            "building fixed-step trajectory"
        );

        let mut states = Vec::with_capacity(steps.min(PREALLOCATED_SAMPLES) + 1);
        states.push(state0);
        let mut termination = Termination::EndTime;

        let mut current = state0;
        for k in 1..=steps {
            // the grid time is computed from the index so rounding never accumulates
            let t = (t0 + k as f64 * self.dt).min(self.t_end);
            current = self
                .scheme
                .step(&current, self.dt, dynamics)?
                .with_time(t);
            states.push(current);

            if let Some(should_stop) = &self.stop_condition {
                if should_stop(&current) {
                    warn!(t = current.time(), "stop condition reached before end time");
                    termination = Termination::StopCondition;
                    break;
                }
            }
        }

        Trajectory::from_samples(states, termination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{EARTH_GRAVITY, EARTH_MU};
    use crate::trajectory_system::dynamics::{CentralGravity, UniformGravity};

    fn reference_state() -> State {
        State::from_components(0.0, 0.0, 7.0e6, 7.5e3, 0.0)
    }

    #[test]
    fn test_reference_run_sample_count() {
        let gravity = CentralGravity::new(EARTH_MU);
        let trajectory = TrajectoryBuilder::new(5.0, 6000.0)
            .build(reference_state(), &gravity)
            .unwrap();
        assert_eq!(trajectory.len(), 1201);
        assert_eq!(trajectory.last().time(), 6000.0);
        assert_eq!(trajectory.termination(), Termination::EndTime);
    }

    #[test]
    fn test_sample_times_are_exact_multiples() {
        let gravity = CentralGravity::new(EARTH_MU);
        let dt = 0.1;
        let trajectory = TrajectoryBuilder::new(dt, 50.0)
            .build(reference_state(), &gravity)
            .unwrap();
        assert_eq!(trajectory.len(), 501);
        for (k, state) in trajectory.iter().enumerate() {
            assert_eq!(state.time(), k as f64 * dt);
        }
    }

    #[test]
    fn test_step_larger_than_span_gives_single_sample() {
        let gravity = CentralGravity::new(EARTH_MU);
        let trajectory = TrajectoryBuilder::new(100.0, 60.0)
            .build(reference_state(), &gravity)
            .unwrap();
        assert_eq!(trajectory.len(), 1);
        assert_eq!(*trajectory.initial(), reference_state());
    }

    #[test]
    fn test_does_not_overshoot_end_time() {
        let gravity = CentralGravity::new(EARTH_MU);
        let trajectory = TrajectoryBuilder::new(7.0, 100.0)
            .build(reference_state(), &gravity)
            .unwrap();
        assert_eq!(trajectory.len(), 15);
        assert_eq!(trajectory.last().time(), 98.0);
    }

    #[test]
    fn test_non_zero_start_time() {
        let gravity = CentralGravity::new(EARTH_MU);
        let trajectory = TrajectoryBuilder::new(10.0, 1100.0)
            .build(reference_state().with_time(1000.0), &gravity)
            .unwrap();
        let expected: Vec<f64> = (0..=10).map(|k| 1000.0 + 10.0 * k as f64).collect();
        assert_eq!(trajectory.times(), expected);
    }

    #[test]
    fn test_stop_condition_flags_termination() {
        let gravity = UniformGravity::new(EARTH_GRAVITY);
        let state0 = State::from_components(0.0, 0.0, 0.0, 50.0, 50.0);
        let trajectory = TrajectoryBuilder::new(0.5, 100.0)
            .with_stop_condition(altitude_below(0.0))
            .build(state0, &gravity)
            .unwrap();

        assert_eq!(trajectory.termination(), Termination::StopCondition);
        assert!(trajectory.last().position().y < 0.0);
        let before_impact = &trajectory.states()[trajectory.len() - 2];
        assert!(before_impact.position().y >= 0.0);
        assert!(trajectory.last().time() < 100.0);
    }

    #[test]
    fn test_invalid_step_is_rejected() {
        let gravity = CentralGravity::new(EARTH_MU);
        let result = TrajectoryBuilder::new(-5.0, 6000.0).build(reference_state(), &gravity);
        assert!(matches!(result, Err(SimulationError::PreconditionError(_))));
    }

    #[test]
    fn test_collision_aborts_without_partial_trajectory() {
        let gravity = CentralGravity::new(EARTH_MU);
        // radial infall hitting the origin exactly after one step
        let state0 = State::from_components(0.0, 0.0, 1000.0, 0.0, -100.0);
        let result = TrajectoryBuilder::new(10.0, 100.0).build(state0, &gravity);
        assert!(matches!(result, Err(SimulationError::DomainError(_))));
    }

    #[test]
    fn test_subsample_keeps_first_and_stride() {
        let gravity = CentralGravity::new(EARTH_MU);
        let trajectory = TrajectoryBuilder::new(5.0, 6000.0)
            .build(reference_state(), &gravity)
            .unwrap();
        let coarse = trajectory.subsample(12).unwrap();
        assert_eq!(coarse.len(), 101);
        assert_eq!(coarse.initial(), trajectory.initial());
        assert_eq!(coarse.states()[1].time(), 60.0);
        assert!(trajectory.subsample(0).is_err());
    }

    #[test]
    fn test_series_views() {
        let gravity = CentralGravity::new(EARTH_MU);
        let trajectory = TrajectoryBuilder::new(5.0, 10.0)
            .build(reference_state(), &gravity)
            .unwrap();
        let positions = trajectory.position_series();
        let velocities = trajectory.velocity_series();
        assert_eq!(positions.len(), 3);
        assert_eq!(positions[0], (0.0, 0.0, 7.0e6));
        assert_eq!(velocities[0], (0.0, 7.5e3, 0.0));
    }

    #[test]
    fn test_whole_steps_tolerates_representation_error() {
        assert_eq!(whole_steps(1.0, 0.1).unwrap(), 10);
        assert_eq!(whole_steps(0.3, 0.1).unwrap(), 3);
        assert_eq!(whole_steps(6000.0, 5.0).unwrap(), 1200);
        assert_eq!(whole_steps(60.0, 100.0).unwrap(), 0);
        assert_eq!(whole_steps(-10.0, 1.0).unwrap(), 0);
    }

    #[test]
    fn test_whole_steps_slack_does_not_grow_with_span() {
        assert_eq!(whole_steps(1.0e8 + 0.95, 1.0).unwrap(), 100_000_000);
        assert_eq!(whole_steps(1.0e12 - 0.5, 1.0).unwrap(), 999_999_999_999);
    }

    #[test]
    fn test_unrepresentable_step_count_is_rejected() {
        assert!(matches!(
            whole_steps(1.0, 1e-300),
            Err(SimulationError::PreconditionError(_))
        ));
        let gravity = CentralGravity::new(EARTH_MU);
        let result = TrajectoryBuilder::new(1e-300, 1.0).build(reference_state(), &gravity);
        assert!(matches!(result, Err(SimulationError::PreconditionError(_))));
    }

    #[test]
    fn test_last_sample_never_passes_end_time() {
        let gravity = UniformGravity::new(EARTH_GRAVITY);
        let state0 = State::from_components(0.0, 0.0, 100.0, 1.0, 0.0);
        let trajectory = TrajectoryBuilder::new(0.1, 0.3)
            .build(state0, &gravity)
            .unwrap();
        assert_eq!(trajectory.len(), 4);
        assert_eq!(trajectory.last().time(), 0.3);

        let trajectory = TrajectoryBuilder::new(1.0, 1.0e4 + 0.95)
            .build(state0, &gravity)
            .unwrap();
        assert_eq!(trajectory.len(), 10_001);
        assert!(trajectory.last().time() <= 1.0e4 + 0.95);
    }

    #[test]
    fn test_distant_end_time_with_stop_condition() {
        // lands after about 16 s, the end time is only an upper bound
        let gravity = UniformGravity::new(EARTH_GRAVITY);
        let state0 = State::from_components(0.0, 0.0, 0.0, 64.28, 76.6);
        let trajectory = TrajectoryBuilder::new(0.01, 1.0e12)
            .with_stop_condition(altitude_below(0.0))
            .build(state0, &gravity)
            .unwrap();
        assert_eq!(trajectory.termination(), Termination::StopCondition);
        assert!(trajectory.last().time() < 20.0);
        assert!(trajectory.len() < 2000);
    }
}
