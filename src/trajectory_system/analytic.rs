use crate::errors::{SimulationError, SimulationResult};
use crate::trajectory_system::state::State;
use crate::utils::vector2d::Vector2D;

const CIRCULARITY_TOLERANCE: f64 = 1e-9;

/// Exact uniform-gravity motion at absolute time `t`, starting from `state0`.
pub fn projectile_state(state0: &State, t: f64, g: f64) -> State {
    let elapsed = t - state0.time();
    let gravity = Vector2D::new(0.0, -g);
    State::new(
        t,
        state0.position() + state0.velocity() * elapsed + 0.5 * elapsed * elapsed * gravity,
        state0.velocity() + gravity * elapsed,
    )
}

pub fn circular_velocity(r: Vector2D, mu: f64) -> SimulationResult<Vector2D> {
    let radius = r.magnitude();
    if radius == 0.0 || !radius.is_finite() {
        return Err(SimulationError::DomainError(format!(
            "circular velocity is undefined at radius {}",
            radius
        )));
    }
    let speed = (mu / radius).sqrt();
    Ok(Vector2D::new(-r.y, r.x) * (speed / radius))
}

/// The orbit is a uniform rotation about the origin, in the sense given by the
/// angular momentum of `state0`. Fails if `state0` is not circular.
pub fn circular_orbit_state(state0: &State, t: f64, mu: f64) -> SimulationResult<State> {
    let r = state0.position();
    let v = state0.velocity();
    let radius = state0.radius();
    if radius == 0.0 || !radius.is_finite() {
        return Err(SimulationError::DomainError(format!(
            "circular orbit is undefined at radius {}",
            radius
        )));
    }

    let circular_speed = (mu / radius).sqrt();
    let radial_speed = r.dot(&v) / radius;
    if (state0.speed() - circular_speed).abs() > CIRCULARITY_TOLERANCE * circular_speed
        || radial_speed.abs() > CIRCULARITY_TOLERANCE * circular_speed
    {
        return Err(SimulationError::PreconditionError(format!(
            "initial state is not circular: speed {} vs circular {}, radial speed {}",
            state0.speed(),
            circular_speed,
            radial_speed
        )));
    }

    let mean_motion = r.cross(&v).signum() * circular_speed / radius;
    let angle = mean_motion * (t - state0.time());
    Ok(State::new(t, r.rotate(angle), v.rotate(angle)))
}
