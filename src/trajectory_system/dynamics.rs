use crate::errors::{SimulationError, SimulationResult};
use crate::trajectory_system::state::State;
use crate::utils::vector2d::Vector2D;

/// A force law expressed per unit mass.
///
/// Every physical parameter lives on the implementing value, so two bodies with
/// different parameters never share state.
pub trait Dynamics: Sync {
    fn acceleration(&self, r: Vector2D) -> SimulationResult<Vector2D>;

    /// Specific potential energy at `r` (m²/s²).
    fn potential(&self, r: Vector2D) -> SimulationResult<f64>;

    fn specific_energy(&self, state: &State) -> SimulationResult<f64> {
        Ok(0.5 * state.velocity().magnitude_squared() + self.potential(state.position())?)
    }

    /// Flat right-hand side `d[rx, ry, vx, vy]/dt = [vx, vy, ax, ay]`.
    fn rhs(&self, _t: f64, y: &[f64; 4]) -> SimulationResult<[f64; 4]> {
        let a = self.acceleration(Vector2D::new(y[0], y[1]))?;
        Ok([y[2], y[3], a.x, a.y])
    }
}

/// Inverse-square attraction toward the origin, `a = −μ/|r|³ · r`.
pub fn acceleration(r: Vector2D, mu: f64) -> SimulationResult<Vector2D> {
    let radius = checked_radius(r)?;
    Ok(-mu / radius.powi(3) * r)
}

fn checked_radius(r: Vector2D) -> SimulationResult<f64> {
    if !r.is_finite() {
        return Err(SimulationError::DomainError(format!(
            "position is not finite: ({}, {})",
            r.x, r.y
        )));
    }
    let radius = r.magnitude();
    if radius == 0.0 {
        return Err(SimulationError::DomainError(
            "position magnitude is zero, gravitational acceleration is undefined".to_string(),
        ));
    }
    Ok(radius)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentralGravity {
    pub mu: f64,
}

impl CentralGravity {
    pub fn new(mu: f64) -> Self {
        CentralGravity { mu }
    }
}

impl Dynamics for CentralGravity {
    fn acceleration(&self, r: Vector2D) -> SimulationResult<Vector2D> {
        acceleration(r, self.mu)
    }

    fn potential(&self, r: Vector2D) -> SimulationResult<f64> {
        Ok(-self.mu / checked_radius(r)?)
    }
}

/// Constant downward pull, used for free fall and projectile problems near a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformGravity {
    pub g: f64,
}

impl UniformGravity {
    pub fn new(g: f64) -> Self {
        UniformGravity { g }
    }
}

impl Dynamics for UniformGravity {
    fn acceleration(&self, r: Vector2D) -> SimulationResult<Vector2D> {
        if !r.is_finite() {
            return Err(SimulationError::DomainError(format!(
                "position is not finite: ({}, {})",
                r.x, r.y
            )));
        }
        Ok(Vector2D::new(0.0, -self.g))
    }

    fn potential(&self, r: Vector2D) -> SimulationResult<f64> {
        Ok(self.g * r.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{EARTH_GRAVITY, EARTH_MU, MOON_GRAVITY};
    use approx::assert_relative_eq;

    #[test]
    fn test_acceleration_points_to_origin() {
        let r = Vector2D::new(0.0, 7.0e6);
        let a = acceleration(r, EARTH_MU).unwrap();
        assert_eq!(a.x, 0.0);
        assert!(a.y < 0.0, "Acceleration should point toward the origin");
        assert_relative_eq!(a.magnitude(), EARTH_MU / 49.0e12, max_relative = 1e-14);
    }

    #[test]
    fn test_zero_radius_is_domain_error() {
        let gravity = CentralGravity::new(EARTH_MU);
        match gravity.acceleration(Vector2D::ZERO) {
            Err(SimulationError::DomainError(_)) => {}
            other => panic!("Expected DomainError, got {:?}", other),
        }
        assert!(matches!(
            gravity.potential(Vector2D::ZERO),
            Err(SimulationError::DomainError(_))
        ));
    }

    #[test]
    fn test_non_finite_position_is_domain_error() {
        let gravity = CentralGravity::new(EARTH_MU);
        assert!(matches!(
            gravity.acceleration(Vector2D::new(f64::NAN, 1.0)),
            Err(SimulationError::DomainError(_))
        ));
    }

    #[test]
    fn test_rhs_matches_structured_acceleration() {
        let gravity = CentralGravity::new(EARTH_MU);
        let state = State::from_components(0.0, 1.0e6, -6.0e6, 7.0e3, 1.0e3);
        let a = gravity.acceleration(state.position()).unwrap();
        let dy = gravity.rhs(0.0, &state.to_array()).unwrap();
        assert_eq!(dy, [7.0e3, 1.0e3, a.x, a.y]);
    }

    #[test]
    fn test_specific_energy_matches_state() {
        let gravity = CentralGravity::new(EARTH_MU);
        let state = State::from_components(0.0, 0.0, 7.0e6, 7.5e3, 0.0);
        assert_eq!(
            gravity.specific_energy(&state).unwrap(),
            state.specific_energy(EARTH_MU)
        );
    }

    #[test]
    fn test_bodies_do_not_interfere() {
        let earth = UniformGravity::new(EARTH_GRAVITY);
        let moon = UniformGravity::new(MOON_GRAVITY);
        let r = Vector2D::new(0.0, 10.0);
        assert_eq!(earth.acceleration(r).unwrap().y, -EARTH_GRAVITY);
        assert_eq!(moon.acceleration(r).unwrap().y, -MOON_GRAVITY);
        assert_relative_eq!(earth.potential(r).unwrap(), 98.1);
    }
}
