// Physical Constants
pub const EARTH_MU: f64 = 3.986_000_5e14; // m³/s²
pub const EARTH_GRAVITY: f64 = 9.81; // m/s²
pub const MOON_MU: f64 = 4.904_869_5e12; // m³/s²
pub const MOON_GRAVITY: f64 = 1.625; // m/s²

// Reference orbit (low Earth orbit used by the two-body experiments)
pub const REFERENCE_ORBIT_RADIUS: f64 = 7_000_000.0; // m
pub const REFERENCE_ORBIT_SPEED: f64 = 7_500.0; // m/s
pub const REFERENCE_END_TIME: f64 = 6_000.0; // s

// Fixed-step defaults
pub const EULER_COARSE_STEP: f64 = 5.0; // s
pub const EULER_FINE_STEP: f64 = 1.0; // s

// Adaptive solver defaults
pub const DEFAULT_RTOL: f64 = 1e-12;
pub const DEFAULT_ATOL: f64 = 1e-15;
pub const ADAPTIVE_SAMPLE_STEP: f64 = 60.0; // s
pub const MAX_SOLVER_STEPS: u64 = 1_000_000;

// Sample grids are treated as matching within this relative slack
pub const TIME_MATCH_TOLERANCE: f64 = 1e-9;
