use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::control::scenario::ScenarioConfig;
use crate::errors::{SimulationError, SimulationResult};
use crate::telemetry_system::error_harness::{compare, energy_drift, ErrorSeries};
use crate::trajectory_system::adaptive::{AdaptiveSolverAdapter, SampleGrid};
use crate::trajectory_system::dynamics::{CentralGravity, Dynamics};
use crate::trajectory_system::ode_solver::{EmbeddedRungeKutta, SolverMethod};
use crate::trajectory_system::trajectory::{Trajectory, TrajectoryBuilder};

/// What produced a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunKind {
    FixedStep { dt: f64 },
    Adaptive { method: SolverMethod },
}

#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub trajectory: Trajectory,
    /// `(t, |E(t) − E(t0)|)`
    pub energy_drift: Vec<(f64, f64)>,
    /// Deviation from the reference run, on the reference grid. `None` for the
    /// reference itself and for runs whose samples do not fall on that grid.
    pub error: Option<ErrorSeries>,
}

impl CompletedRun {
    pub fn final_energy_drift(&self) -> f64 {
        self.energy_drift.last().map_or(0.0, |&(_, e)| e)
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(CompletedRun),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub label: String,
    pub kind: RunKind,
    pub outcome: RunOutcome,
}

impl RunRecord {
    pub fn completed(&self) -> Option<&CompletedRun> {
        match &self.outcome {
            RunOutcome::Completed(run) => Some(run),
            RunOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: String,
    pub body: String,
    pub initial_energy: f64,
    pub t_end: f64,
    pub runs: Vec<RunRecord>,
    /// Index into `runs` of the run every other run was compared against.
    pub reference: Option<usize>,
}

impl ScenarioReport {
    pub fn reference_run(&self) -> Option<&RunRecord> {
        self.reference.and_then(|index| self.runs.get(index))
    }

    pub fn run(&self, label: &str) -> Option<&RunRecord> {
        self.runs.iter().find(|record| record.label == label)
    }

    pub fn failed_runs(&self) -> impl Iterator<Item = &RunRecord> {
        self.runs
            .iter()
            .filter(|record| matches!(record.outcome, RunOutcome::Failed(_)))
    }
}

/// Most accurate first.
fn method_rank(method: SolverMethod) -> u8 {
    match method {
        SolverMethod::Radau => 0,
        SolverMethod::Lsoda => 1,
        SolverMethod::Bdf => 2,
        SolverMethod::Rk45 => 3,
        SolverMethod::Rk23 => 4,
    }
}

pub struct ScenarioRunner;

impl ScenarioRunner {
    pub fn run(config: &ScenarioConfig) -> SimulationResult<ScenarioReport> {
        config.validate()?;

        let gravity = config.body.central_gravity();
        let state0 = config.initial_state.to_state();
        let initial_energy = gravity.specific_energy(&state0)?;
        info!(
            scenario = %config.name,
            body = %config.body.name,
            t_end = config.t_end,
            "running scenario"
        );

        let mut runs = Self::fixed_step_runs(config, &gravity)?;
        runs.extend(Self::adaptive_runs(config, &gravity)?);

        let best = runs
            .iter()
            .enumerate()
            .filter_map(|(index, record)| match (record.kind, &record.outcome) {
                (RunKind::Adaptive { method }, RunOutcome::Completed(run)) => {
                    Some((method_rank(method), index, run.trajectory.clone()))
                }
                _ => None,
            })
            .min_by_key(|(rank, _, _)| *rank);

        let reference = match best {
            Some((_, reference_index, trajectory)) => {
                for (index, record) in runs.iter_mut().enumerate() {
                    if index == reference_index {
                        continue;
                    }
                    if let RunOutcome::Completed(run) = &mut record.outcome {
                        run.error = Self::error_against(&trajectory, &run.trajectory, &gravity)?;
                    }
                }
                Some(reference_index)
            }
            None => {
                warn!("no adaptive run completed, skipping error comparison");
                None
            }
        };

        info!(
            runs = runs.len(),
            failed = runs
                .iter()
                .filter(|record| record.completed().is_none())
                .count(),
            "scenario finished"
        );

        Ok(ScenarioReport {
            name: config.name.clone(),
            body: config.body.name.clone(),
            initial_energy,
            t_end: config.t_end,
            runs,
            reference,
        })
    }

    fn fixed_step_runs(
        config: &ScenarioConfig,
        gravity: &CentralGravity,
    ) -> SimulationResult<Vec<RunRecord>> {
        let state0 = config.initial_state.to_state();
        let scheme = config.fixed_step_scheme;
        config
            .euler_steps
            .par_iter()
            .map(|&dt| -> SimulationResult<RunRecord> {
                let trajectory = TrajectoryBuilder::new(dt, config.t_end)
                    .with_scheme(scheme)
                    .build(state0, gravity)?;
                let drift = energy_drift(&trajectory, gravity)?;
                debug!(dt, samples = trajectory.len(), "fixed-step run done");
                Ok(RunRecord {
                    label: format!("{} (dt = {} s)", scheme.name(), dt),
                    kind: RunKind::FixedStep { dt },
                    outcome: RunOutcome::Completed(CompletedRun {
                        trajectory,
                        energy_drift: drift,
                        error: None,
                    }),
                })
            })
            .collect()
    }

    fn adaptive_runs(
        config: &ScenarioConfig,
        gravity: &CentralGravity,
    ) -> SimulationResult<Vec<RunRecord>> {
        let state0 = config.initial_state.to_state();
        let adaptive = &config.adaptive;
        let grid = SampleGrid::from_step(state0.time(), config.t_end, adaptive.sample_step)?;

        let mut records = Vec::with_capacity(adaptive.methods.len());
        for &method in &adaptive.methods {
            let adapter = AdaptiveSolverAdapter::new(
                EmbeddedRungeKutta::new(adaptive.max_steps),
                method,
                adaptive.tolerances(),
            );
            let outcome = match adapter.solve_on_grid(state0, &grid, gravity) {
                Ok(trajectory) => {
                    let drift = energy_drift(&trajectory, gravity)?;
                    debug!(method = method.name(), samples = trajectory.len(), "adaptive run done");
                    RunOutcome::Completed(CompletedRun {
                        trajectory,
                        energy_drift: drift,
                        error: None,
                    })
                }
                Err(SimulationError::SolverError(message)) => {
                    warn!(method = method.name(), %message, "adaptive run failed");
                    RunOutcome::Failed(message)
                }
                Err(e) => return Err(e),
            };
            records.push(RunRecord {
                label: method.name().to_string(),
                kind: RunKind::Adaptive { method },
                outcome,
            });
        }
        Ok(records)
    }

    /// Puts `candidate` on the reference grid when one is a multiple of the other.
    fn error_against(
        reference: &Trajectory,
        candidate: &Trajectory,
        gravity: &CentralGravity,
    ) -> SimulationResult<Option<ErrorSeries>> {
        let candidate = match Self::grid_stride(reference, candidate) {
            Some(1) => candidate.clone(),
            Some(stride) => candidate.subsample(stride)?,
            None => {
                debug!("sample grids do not line up, skipping comparison");
                return Ok(None);
            }
        };
        match compare(reference, &candidate, gravity) {
            Ok(series) => Ok(Some(series)),
            Err(SimulationError::PreconditionError(message)) => {
                debug!(%message, "skipping comparison");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn grid_stride(reference: &Trajectory, candidate: &Trajectory) -> Option<usize> {
        let reference_step = reference.states().get(1)?.time() - reference.initial().time();
        let candidate_step = candidate.states().get(1)?.time() - candidate.initial().time();
        let ratio = reference_step / candidate_step;
        let stride = ratio.round();
        if stride < 1.0 || (ratio - stride).abs() > 1e-9 * stride {
            return None;
        }
        Some(stride as usize)
    }
}
