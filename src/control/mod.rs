pub mod body;
pub mod runner;
pub mod scenario;
