use serde::{Deserialize, Serialize};

use crate::constants::{EARTH_GRAVITY, EARTH_MU, MOON_GRAVITY, MOON_MU};
use crate::trajectory_system::dynamics::{CentralGravity, UniformGravity};

/// Central body of a scenario. Its parameters are handed to the dynamics explicitly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CelestialBody {
    pub name: String,
    /// Gravitational parameter μ (m³/s²)
    pub mu: f64,
    /// Surface gravity g (m/s²), for the flat-ground approximation
    pub surface_gravity: f64,
}

impl CelestialBody {
    pub fn new(name: String, mu: f64, surface_gravity: f64) -> Self {
        CelestialBody {
            name,
            mu,
            surface_gravity,
        }
    }

    pub fn earth() -> Self {
        CelestialBody::new("Earth".to_string(), EARTH_MU, EARTH_GRAVITY)
    }

    pub fn moon() -> Self {
        CelestialBody::new("Moon".to_string(), MOON_MU, MOON_GRAVITY)
    }

    pub fn central_gravity(&self) -> CentralGravity {
        CentralGravity::new(self.mu)
    }

    pub fn uniform_gravity(&self) -> UniformGravity {
        UniformGravity::new(self.surface_gravity)
    }

    /// Speed of a circular orbit at `radius` from the centre.
    pub fn circular_speed(&self, radius: f64) -> f64 {
        (self.mu / radius).sqrt()
    }

    pub fn escape_velocity(&self, radius: f64) -> f64 {
        (2.0 * self.mu / radius).sqrt()
    }
}

impl Default for CelestialBody {
    fn default() -> Self {
        CelestialBody::earth()
    }
}
