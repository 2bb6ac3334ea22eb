use serde::{Deserialize, Serialize};

use crate::constants::{
    ADAPTIVE_SAMPLE_STEP, DEFAULT_ATOL, DEFAULT_RTOL, EULER_COARSE_STEP, EULER_FINE_STEP,
    MAX_SOLVER_STEPS, REFERENCE_END_TIME, REFERENCE_ORBIT_RADIUS, REFERENCE_ORBIT_SPEED,
};
use crate::control::body::CelestialBody;
use crate::errors::{SimulationError, SimulationResult};
use crate::trajectory_system::integrator::FixedStepScheme;
use crate::trajectory_system::ode_solver::{SolverMethod, Tolerances};
use crate::trajectory_system::state::State;
use crate::utils::vector2d::Vector2D;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitialStateConfig {
    #[serde(default)]
    pub t: f64,
    /// Position (m)
    pub r: [f64; 2],
    /// Velocity (m/s)
    pub v: [f64; 2],
}

impl InitialStateConfig {
    pub fn to_state(&self) -> State {
        State::new(self.t, Vector2D::from(self.r), Vector2D::from(self.v))
    }
}

impl Default for InitialStateConfig {
    fn default() -> Self {
        InitialStateConfig {
            t: 0.0,
            r: [0.0, REFERENCE_ORBIT_RADIUS],
            v: [REFERENCE_ORBIT_SPEED, 0.0],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdaptiveConfig {
    pub methods: Vec<SolverMethod>,
    pub rtol: f64,
    pub atol: f64,
    /// Spacing of the sampled output (s)
    pub sample_step: f64,
    pub max_steps: u64,
}

impl AdaptiveConfig {
    pub fn tolerances(&self) -> Tolerances {
        Tolerances::new(self.rtol, self.atol)
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        AdaptiveConfig {
            methods: vec![SolverMethod::Rk23, SolverMethod::Rk45],
            rtol: DEFAULT_RTOL,
            atol: DEFAULT_ATOL,
            sample_step: ADAPTIVE_SAMPLE_STEP,
            max_steps: MAX_SOLVER_STEPS,
        }
    }
}

/// One two-body experiment: a set of fixed-step runs and a set of adaptive runs
/// from the same initial state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub name: String,
    pub body: CelestialBody,
    pub initial_state: InitialStateConfig,
    pub t_end: f64,
    pub euler_steps: Vec<f64>,
    pub fixed_step_scheme: FixedStepScheme,
    pub adaptive: AdaptiveConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            name: "Two-body LEO".to_string(),
            body: CelestialBody::earth(),
            initial_state: InitialStateConfig::default(),
            t_end: REFERENCE_END_TIME,
            euler_steps: vec![EULER_COARSE_STEP, EULER_FINE_STEP],
            fixed_step_scheme: FixedStepScheme::ExplicitEuler,
            adaptive: AdaptiveConfig::default(),
        }
    }
}

fn invalid(message: String) -> SimulationError {
    SimulationError::ConfigurationError(message)
}

impl ScenarioConfig {
    /// Parses a scenario and checks it with [`ScenarioConfig::validate`].
    pub fn from_yaml(source: &str) -> SimulationResult<Self> {
        let config: ScenarioConfig = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> SimulationResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> SimulationResult<()> {
        if !self.body.mu.is_finite() || self.body.mu <= 0.0 {
            return Err(invalid(format!(
                "{}: gravitational parameter must be positive, got {}",
                self.body.name, self.body.mu
            )));
        }
        if !self.body.surface_gravity.is_finite() || self.body.surface_gravity < 0.0 {
            return Err(invalid(format!(
                "{}: surface gravity must be non-negative, got {}",
                self.body.name, self.body.surface_gravity
            )));
        }

        let state0 = self.initial_state.to_state();
        if !state0.is_finite() {
            return Err(invalid("initial state must be finite".to_string()));
        }
        if state0.radius() == 0.0 {
            return Err(invalid(
                "initial position coincides with the central body".to_string(),
            ));
        }
        if !self.t_end.is_finite() || self.t_end <= state0.time() {
            return Err(invalid(format!(
                "end time {} must be finite and after the start time {}",
                self.t_end,
                state0.time()
            )));
        }

        if let Some(dt) = self
            .euler_steps
            .iter()
            .find(|dt| !dt.is_finite() || **dt <= 0.0)
        {
            return Err(invalid(format!(
                "fixed step sizes must be positive, got {}",
                dt
            )));
        }

        let adaptive = &self.adaptive;
        if !adaptive.rtol.is_finite() || adaptive.rtol <= 0.0 {
            return Err(invalid(format!("rtol must be positive, got {}", adaptive.rtol)));
        }
        if !adaptive.atol.is_finite() || adaptive.atol <= 0.0 {
            return Err(invalid(format!("atol must be positive, got {}", adaptive.atol)));
        }
        if !adaptive.sample_step.is_finite() || adaptive.sample_step <= 0.0 {
            return Err(invalid(format!(
                "sample step must be positive, got {}",
                adaptive.sample_step
            )));
        }
        if adaptive.max_steps == 0 {
            return Err(invalid("max_steps must be at least 1".to_string()));
        }

        Ok(())
    }
}
