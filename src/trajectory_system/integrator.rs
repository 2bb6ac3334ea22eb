use serde::{Deserialize, Serialize};

use crate::errors::{SimulationError, SimulationResult};
use crate::trajectory_system::dynamics::Dynamics;
use crate::trajectory_system::state::State;
use crate::utils::vector2d::Vector2D;

/// Advances a state by one fixed time increment.
pub trait Integrator: Sync {
    fn step(&self, state: &State, dt: f64, dynamics: &dyn Dynamics) -> SimulationResult<State>;
}

pub(crate) fn check_step_size(dt: f64) -> SimulationResult<()> {
    if !dt.is_finite() || dt <= 0.0 {
        return Err(SimulationError::PreconditionError(format!(
            "step size must be finite and positive, got {}",
            dt
        )));
    }
    Ok(())
}

/// Forward Euler: position and velocity both advance with start-of-step derivatives.
///
/// ```text
/// r' = r + v·dt
/// v' = v + a(r)·dt
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitEuler;

impl Integrator for ExplicitEuler {
    fn step(&self, state: &State, dt: f64, dynamics: &dyn Dynamics) -> SimulationResult<State> {
        check_step_size(dt)?;
        let a = dynamics.acceleration(state.position())?;

        Ok(State::new(
            state.time() + dt,
            state.position() + state.velocity() * dt,
            state.velocity() + a * dt,
        ))
    }
}

/// Symplectic Euler: kick the velocity first, then drift with the new velocity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemiImplicitEuler;

impl Integrator for SemiImplicitEuler {
    fn step(&self, state: &State, dt: f64, dynamics: &dyn Dynamics) -> SimulationResult<State> {
        check_step_size(dt)?;
        let a = dynamics.acceleration(state.position())?;
        let velocity = state.velocity() + a * dt;

        Ok(State::new(
            state.time() + dt,
            state.position() + velocity * dt,
            velocity,
        ))
    }
}

/// Classic fourth-order Runge-Kutta.
#[derive(Debug, Clone, Copy, Default)]
pub struct RungeKutta4;

impl RungeKutta4 {
    fn derivatives(
        state: (Vector2D, Vector2D),
        dynamics: &dyn Dynamics,
    ) -> SimulationResult<(Vector2D, Vector2D)> {
        let (position, velocity) = state;
        Ok((velocity, dynamics.acceleration(position)?))
    }
}

impl Integrator for RungeKutta4 {
    fn step(&self, state: &State, dt: f64, dynamics: &dyn Dynamics) -> SimulationResult<State> {
        check_step_size(dt)?;
        let initial_state = (state.position(), state.velocity());

        let k1 = Self::derivatives(initial_state, dynamics)?;
        let k2 = Self::derivatives(
            (
                initial_state.0 + k1.0 * (dt / 2.0),
                initial_state.1 + k1.1 * (dt / 2.0),
            ),
            dynamics,
        )?;
        let k3 = Self::derivatives(
            (
                initial_state.0 + k2.0 * (dt / 2.0),
                initial_state.1 + k2.1 * (dt / 2.0),
            ),
            dynamics,
        )?;
        let k4 = Self::derivatives(
            (initial_state.0 + k3.0 * dt, initial_state.1 + k3.1 * dt),
            dynamics,
        )?;

        let position = initial_state.0 + (dt / 6.0) * (k1.0 + 2.0 * k2.0 + 2.0 * k3.0 + k4.0);
        let velocity = initial_state.1 + (dt / 6.0) * (k1.1 + 2.0 * k2.1 + 2.0 * k3.1 + k4.1);

        Ok(State::new(state.time() + dt, position, velocity))
    }
}

/// Configuration-level selector over the fixed-step schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FixedStepScheme {
    #[default]
    #[serde(rename = "euler")]
    ExplicitEuler,
    #[serde(rename = "semi_implicit_euler")]
    SemiImplicitEuler,
    #[serde(rename = "rk4")]
    RungeKutta4,
}

impl FixedStepScheme {
    pub fn name(&self) -> &'static str {
        match self {
            FixedStepScheme::ExplicitEuler => "Euler",
            FixedStepScheme::SemiImplicitEuler => "Semi-implicit Euler",
            FixedStepScheme::RungeKutta4 => "RK4",
        }
    }
}

impl Integrator for FixedStepScheme {
    fn step(&self, state: &State, dt: f64, dynamics: &dyn Dynamics) -> SimulationResult<State> {
        match self {
            FixedStepScheme::ExplicitEuler => ExplicitEuler.step(state, dt, dynamics),
            FixedStepScheme::SemiImplicitEuler => SemiImplicitEuler.step(state, dt, dynamics),
            FixedStepScheme::RungeKutta4 => RungeKutta4.step(state, dt, dynamics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{EARTH_GRAVITY, EARTH_MU};
    use crate::trajectory_system::dynamics::{CentralGravity, UniformGravity};
    use approx::assert_relative_eq;

    fn reference_state() -> State {
        State::from_components(0.0, 0.0, 7.0e6, 7.5e3, 0.0)
    }

    #[test]
    fn test_euler_step_formula() {
        let gravity = CentralGravity::new(EARTH_MU);
        let state = reference_state();
        let dt = 5.0;
        let next = ExplicitEuler.step(&state, dt, &gravity).unwrap();
        let a = gravity.acceleration(state.position()).unwrap();

        assert_eq!(next.time(), 5.0);
        assert_eq!(next.position(), state.position() + state.velocity() * dt);
        assert_eq!(next.velocity(), state.velocity() + a * dt);
        // the input is untouched
        assert_eq!(state, reference_state());
    }

    #[test]
    fn test_semi_implicit_euler_uses_updated_velocity() {
        let gravity = UniformGravity::new(EARTH_GRAVITY);
        let state = State::from_components(0.0, 0.0, 100.0, 0.0, 0.0);
        let next = SemiImplicitEuler.step(&state, 1.0, &gravity).unwrap();
        assert_relative_eq!(next.velocity().y, -EARTH_GRAVITY);
        assert_relative_eq!(next.position().y, 100.0 - EARTH_GRAVITY);
    }

    #[test]
    fn test_rk4_is_exact_for_uniform_gravity() {
        let gravity = UniformGravity::new(EARTH_GRAVITY);
        let state = State::from_components(0.0, 0.0, 0.0, 30.0, 40.0);
        let next = RungeKutta4.step(&state, 2.0, &gravity).unwrap();
        assert_relative_eq!(next.position().x, 60.0, epsilon = 1e-12);
        assert_relative_eq!(
            next.position().y,
            80.0 - 0.5 * EARTH_GRAVITY * 4.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(next.velocity().y, 40.0 - 2.0 * EARTH_GRAVITY, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_step_size_is_rejected() {
        let gravity = CentralGravity::new(EARTH_MU);
        for dt in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(
                    ExplicitEuler.step(&reference_state(), dt, &gravity),
                    Err(SimulationError::PreconditionError(_))
                ),
                "dt = {} should be rejected",
                dt
            );
        }
    }

    #[test]
    fn test_step_through_origin_reports_domain_error() {
        let gravity = CentralGravity::new(EARTH_MU);
        let state = State::from_components(0.0, 0.0, 0.0, 1.0, 0.0);
        for scheme in [
            FixedStepScheme::ExplicitEuler,
            FixedStepScheme::SemiImplicitEuler,
            FixedStepScheme::RungeKutta4,
        ] {
            assert!(matches!(
                scheme.step(&state, 1.0, &gravity),
                Err(SimulationError::DomainError(_))
            ));
        }
    }

    #[test]
    fn test_scheme_dispatch_matches_direct_call() {
        let gravity = CentralGravity::new(EARTH_MU);
        let state = reference_state();
        assert_eq!(
            FixedStepScheme::RungeKutta4.step(&state, 10.0, &gravity).unwrap(),
            RungeKutta4.step(&state, 10.0, &gravity).unwrap()
        );
        assert_eq!(
            FixedStepScheme::default().step(&state, 10.0, &gravity).unwrap(),
            ExplicitEuler.step(&state, 10.0, &gravity).unwrap()
        );
    }
}
