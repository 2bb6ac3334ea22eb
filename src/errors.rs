use thiserror::Error;

pub type SimulationResult<T> = Result<T, SimulationError>;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Domain error: {0}")]
    DomainError(String),

    #[error("Solver error: {0}")]
    SolverError(String),

    #[error("Precondition error: {0}")]
    PreconditionError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Configuration parse error: {0}")]
    ConfigParseError(#[from] serde_yaml::Error),
}
