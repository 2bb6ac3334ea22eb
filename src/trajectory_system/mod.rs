pub mod adaptive;
pub mod analytic;
pub mod dynamics;
pub mod integrator;
pub mod ode_solver;
pub mod state;
pub mod trajectory;
