use serde::{Deserialize, Serialize};

use crate::utils::vector2d::Vector2D;

/// Time, planar position and planar velocity of a body at one instant.
///
/// A `State` is a value: integrators consume one and return a new one, there is
/// no way to modify the fields in place. Scalar quantities such as the radius or
/// the specific energy are always derived from `r` and `v`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct State {
    t: f64,
    r: Vector2D,
    v: Vector2D,
}

impl State {
    pub fn new(t: f64, r: Vector2D, v: Vector2D) -> Self {
        State { t, r, v }
    }

    pub fn from_components(t: f64, rx: f64, ry: f64, vx: f64, vy: f64) -> Self {
        State::new(t, Vector2D::new(rx, ry), Vector2D::new(vx, vy))
    }

    /// Rebuilds a state from the flat `[rx, ry, vx, vy]` layout used by ODE solvers.
    pub fn from_array(t: f64, y: [f64; 4]) -> Self {
        State::from_components(t, y[0], y[1], y[2], y[3])
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.r.x, self.r.y, self.v.x, self.v.y]
    }

    /// Same position and velocity, stamped at another time.
    pub fn with_time(&self, t: f64) -> Self {
        State::new(t, self.r, self.v)
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn position(&self) -> Vector2D {
        self.r
    }

    pub fn velocity(&self) -> Vector2D {
        self.v
    }

    pub fn radius(&self) -> f64 {
        self.r.magnitude()
    }

    pub fn speed(&self) -> f64 {
        self.v.magnitude()
    }

    /// Specific orbital energy `½|v|² − μ/|r|` (m²/s²).
    ///
    /// Not defined at the origin: a zero radius gives a non-finite value. Use
    /// [`Dynamics::specific_energy`](super::dynamics::Dynamics::specific_energy)
    /// for a checked version.
    pub fn specific_energy(&self, mu: f64) -> f64 {
        0.5 * self.v.magnitude_squared() - mu / self.radius()
    }

    pub fn is_finite(&self) -> bool {
        self.t.is_finite() && self.r.is_finite() && self.v.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::EARTH_MU;
    use approx::assert_relative_eq;

    #[test]
    fn test_state_derived_quantities() {
        let state = State::from_components(0.0, 3.0, 4.0, 6.0, 8.0);
        assert_eq!(state.radius(), 5.0);
        assert_eq!(state.speed(), 10.0);
    }

    #[test]
    fn test_specific_energy_of_reference_orbit() {
        let state = State::from_components(0.0, 0.0, 7.0e6, 7.5e3, 0.0);
        let expected = 0.5 * 7.5e3 * 7.5e3 - EARTH_MU / 7.0e6;
        assert_relative_eq!(state.specific_energy(EARTH_MU), expected, max_relative = 1e-15);
        assert!(
            state.specific_energy(EARTH_MU) < 0.0,
            "Reference orbit should be bound"
        );
    }

    #[test]
    fn test_flat_array_layout() {
        let state = State::from_components(12.0, 1.0, 2.0, 3.0, 4.0);
        assert_eq!(state.to_array(), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(State::from_array(12.0, state.to_array()), state);
    }

    #[test]
    fn test_with_time_keeps_phase_space_point() {
        let state = State::from_components(0.0, 1.0, 2.0, 3.0, 4.0);
        let moved = state.with_time(5.0);
        assert_eq!(moved.time(), 5.0);
        assert_eq!(moved.position(), state.position());
        assert_eq!(moved.velocity(), state.velocity());
        assert_eq!(state.time(), 0.0);
    }

    #[test]
    fn test_energy_at_origin_is_not_finite() {
        let state = State::from_components(0.0, 0.0, 0.0, 1.0, 0.0);
        assert!(!state.specific_energy(EARTH_MU).is_finite());
    }
}
