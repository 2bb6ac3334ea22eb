use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{SimulationError, SimulationResult};

pub trait OdeSystem<const N: usize> {
    fn rhs(&self, t: f64, y: &[f64; N]) -> SimulationResult<[f64; N]>;
}

pub trait DenseSolution<const N: usize> {
    fn t_span(&self) -> (f64, f64);

    fn evaluate(&self, t: f64) -> SimulationResult<[f64; N]>;
}

/// Only RK45 and RK23 are integrated; the implicit selectors are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverMethod {
    #[serde(rename = "RK45")]
    Rk45,
    #[serde(rename = "RK23")]
    Rk23,
    #[serde(rename = "Radau")]
    Radau,
    #[serde(rename = "BDF")]
    Bdf,
    #[serde(rename = "LSODA")]
    Lsoda,
}

impl SolverMethod {
    pub fn name(&self) -> &'static str {
        match self {
            SolverMethod::Rk45 => "RK45",
            SolverMethod::Rk23 => "RK23",
            SolverMethod::Radau => "Radau",
            SolverMethod::Bdf => "BDF",
            SolverMethod::Lsoda => "LSODA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub rtol: f64,
    pub atol: f64,
}

impl Tolerances {
    pub fn new(rtol: f64, atol: f64) -> Self {
        Tolerances { rtol, atol }
    }

    /// Relative tolerances below `100 * EPSILON` cannot be met in double precision.
    pub fn validate(&self) -> SimulationResult<()> {
        if !self.rtol.is_finite() || self.rtol < 100.0 * f64::EPSILON {
            return Err(SimulationError::SolverError(format!(
                "relative tolerance {:e} is not achievable, it must be finite and at least {:e}",
                self.rtol,
                100.0 * f64::EPSILON
            )));
        }
        if !self.atol.is_finite() || self.atol < 0.0 {
            return Err(SimulationError::SolverError(format!(
                "absolute tolerance {:e} must be finite and non-negative",
                self.atol
            )));
        }
        Ok(())
    }
}

/// The integration service: solve from `t0` to `t1` and return a dense solution.
pub trait OdeSolver<const N: usize> {
    type Solution: DenseSolution<N>;

    fn integrate<S: OdeSystem<N>>(
        &self,
        system: &S,
        t0: f64,
        y0: [f64; N],
        t1: f64,
        method: SolverMethod,
        tolerances: &Tolerances,
    ) -> SimulationResult<Self::Solution>;
}

/// `e` and `p` have one more row than `b`: the extra stage is `f(t + h, y_new)`.
struct Tableau {
    c: &'static [f64],
    a: &'static [&'static [f64]],
    b: &'static [f64],
    e: &'static [f64],
    p: &'static [&'static [f64]],
    error_estimator_order: i32,
}

impl Tableau {
    fn stages(&self) -> usize {
        self.b.len()
    }
}

static DORMAND_PRINCE: Tableau = Tableau {
    c: &[0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0],
    a: &[
        &[],
        &[1.0 / 5.0],
        &[3.0 / 40.0, 9.0 / 40.0],
        &[44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0],
        &[
            19372.0 / 6561.0,
            -25360.0 / 2187.0,
            64448.0 / 6561.0,
            -212.0 / 729.0,
        ],
        &[
            9017.0 / 3168.0,
            -355.0 / 33.0,
            46732.0 / 5247.0,
            49.0 / 176.0,
            -5103.0 / 18656.0,
        ],
    ],
    b: &[
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
    e: &[
        -71.0 / 57600.0,
        0.0,
        71.0 / 16695.0,
        -71.0 / 1920.0,
        17253.0 / 339200.0,
        -22.0 / 525.0,
        1.0 / 40.0,
    ],
    p: &[
        &[
            1.0,
            -8048581381.0 / 2820520608.0,
            8663915743.0 / 2820520608.0,
            -12715105075.0 / 11282082432.0,
        ],
        &[0.0, 0.0, 0.0, 0.0],
        &[
            0.0,
            131558114200.0 / 32700410799.0,
            -68118460800.0 / 10900136933.0,
            87487479700.0 / 32700410799.0,
        ],
        &[
            0.0,
            -1754552775.0 / 470086768.0,
            14199869525.0 / 1410260304.0,
            -10690763975.0 / 1880347072.0,
        ],
        &[
            0.0,
            127303824393.0 / 49829197408.0,
            -318862633887.0 / 49829197408.0,
            701980252875.0 / 199316789632.0,
        ],
        &[
            0.0,
            -282668133.0 / 205662961.0,
            2019193451.0 / 616988883.0,
            -1453857185.0 / 822651844.0,
        ],
        &[
            0.0,
            40617522.0 / 29380423.0,
            -110615467.0 / 29380423.0,
            69997945.0 / 29380423.0,
        ],
    ],
    error_estimator_order: 4,
};

static BOGACKI_SHAMPINE: Tableau = Tableau {
    c: &[0.0, 1.0 / 2.0, 3.0 / 4.0],
    a: &[&[], &[1.0 / 2.0], &[0.0, 3.0 / 4.0]],
    b: &[2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0],
    e: &[5.0 / 72.0, -1.0 / 12.0, -1.0 / 9.0, 1.0 / 8.0],
    p: &[
        &[1.0, -4.0 / 3.0, 5.0 / 9.0],
        &[0.0, 1.0, -2.0 / 3.0],
        &[0.0, 4.0 / 3.0, -8.0 / 9.0],
        &[0.0, -1.0, 1.0],
    ],
    error_estimator_order: 2,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub fn_evals: u64,
    pub accepted_steps: u64,
    pub rejected_steps: u64,
}

/// `y(t_old + x h) = y_old + h * sum_j q[j] * x^(j+1)` for `x` in `[0, 1]`.
#[derive(Debug, Clone)]
struct Segment<const N: usize> {
    t_old: f64,
    h: f64,
    y_old: [f64; N],
    q: Vec<[f64; N]>,
}

impl<const N: usize> Segment<N> {
    #[allow(clippy::needless_range_loop)]
    fn evaluate(&self, t: f64) -> [f64; N] {
        let x = (t - self.t_old) / self.h;
        let mut y = self.y_old;
        for n in 0..N {
            // Horner on x * (q0 + x * (q1 + x * (...)))
            let mut acc = 0.0;
            for coefficients in self.q.iter().rev() {
                acc = acc * x + coefficients[n];
            }
            y[n] += self.h * acc * x;
        }
        y
    }
}

#[derive(Debug, Clone)]
pub struct PiecewiseSolution<const N: usize> {
    t_start: f64,
    t_end: f64,
    y_start: [f64; N],
    y_end: [f64; N],
    segments: Vec<Segment<N>>,
    pub stats: Stats,
}

impl<const N: usize> PiecewiseSolution<N> {
    pub fn final_state(&self) -> [f64; N] {
        self.y_end
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

impl<const N: usize> DenseSolution<N> for PiecewiseSolution<N> {
    fn t_span(&self) -> (f64, f64) {
        (self.t_start, self.t_end)
    }

    fn evaluate(&self, t: f64) -> SimulationResult<[f64; N]> {
        if !(self.t_start..=self.t_end).contains(&t) {
            return Err(SimulationError::PreconditionError(format!(
                "t = {} is outside the solution interval [{}, {}]",
                t, self.t_start, self.t_end
            )));
        }
        if t == self.t_start {
            return Ok(self.y_start);
        }
        if t == self.t_end {
            return Ok(self.y_end);
        }
        // first segment whose end lies at or beyond t
        let index = self
            .segments
            .partition_point(|segment| segment.t_old + segment.h < t)
            .min(self.segments.len() - 1);
        Ok(self.segments[index].evaluate(t))
    }
}

/// Step-size controller: `h_new = safety * h * error^(-1/(order + 1))`
#[derive(Debug, Clone, Copy)]
pub struct StepController {
    pub safety: f64,
    pub min_factor: f64,
    pub max_factor: f64,
}

impl Default for StepController {
    fn default() -> Self {
        StepController {
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 10.0,
        }
    }
}

impl StepController {
    fn factor(&self, error_norm: f64, exponent: f64) -> f64 {
        if error_norm == 0.0 {
            return self.max_factor;
        }
        (self.safety * error_norm.powf(-exponent)).clamp(self.min_factor, self.max_factor)
    }
}

/// Dormand-Prince 5(4) and Bogacki-Shampine 3(2) with dense output.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedRungeKutta {
    pub controller: StepController,
    /// Step attempts (accepted and rejected) allowed before giving up.
    pub max_steps: u64,
}

impl Default for EmbeddedRungeKutta {
    fn default() -> Self {
        EmbeddedRungeKutta {
            controller: StepController::default(),
            max_steps: crate::constants::MAX_SOLVER_STEPS,
        }
    }
}

fn rms_norm<const N: usize>(values: &[f64; N], scale: &[f64; N]) -> f64 {
    if N == 0 {
        return 0.0;
    }
    let sum: f64 = values
        .iter()
        .zip(scale)
        .map(|(value, s)| (value / s).powi(2))
        .sum();
    (sum / N as f64).sqrt()
}

impl EmbeddedRungeKutta {
    pub fn new(max_steps: u64) -> Self {
        EmbeddedRungeKutta {
            max_steps,
            ..Default::default()
        }
    }

    fn tableau(method: SolverMethod) -> SimulationResult<&'static Tableau> {
        match method {
            SolverMethod::Rk45 => Ok(&DORMAND_PRINCE),
            SolverMethod::Rk23 => Ok(&BOGACKI_SHAMPINE),
            SolverMethod::Radau | SolverMethod::Bdf | SolverMethod::Lsoda => {
                Err(SimulationError::SolverError(format!(
                    "method {} is not provided by the embedded Runge-Kutta backend",
                    method.name()
                )))
            }
        }
    }

    /// Initial step guess from the local derivative scale (Hairer, Norsett & Wanner).
    #[allow(clippy::too_many_arguments)]
    fn initial_step<const N: usize, S: OdeSystem<N>>(
        system: &S,
        t0: f64,
        y0: &[f64; N],
        f0: &[f64; N],
        span: f64,
        order: i32,
        tolerances: &Tolerances,
        stats: &mut Stats,
    ) -> SimulationResult<f64> {
        let scale = y0.map(|y| tolerances.atol + y.abs() * tolerances.rtol);
        let d0 = rms_norm(y0, &scale);
        let d1 = rms_norm(f0, &scale);
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        }
        .min(span);

        let mut y1 = *y0;
        for (y, f) in y1.iter_mut().zip(f0) {
            *y += h0 * f;
        }
        let f1 = system.rhs(t0 + h0, &y1)?;
        stats.fn_evals += 1;

        let mut difference = [0.0; N];
        for (d, (a, b)) in difference.iter_mut().zip(f1.iter().zip(f0)) {
            *d = a - b;
        }
        let d2 = rms_norm(&difference, &scale) / h0;

        let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(1.0 / f64::from(order + 1))
        };

        Ok((100.0 * h0).min(h1).min(span))
    }

    #[allow(clippy::needless_range_loop)]
    fn trial_step<const N: usize, S: OdeSystem<N>>(
        tableau: &Tableau,
        system: &S,
        t: f64,
        y: &[f64; N],
        f: &[f64; N],
        h: f64,
    ) -> SimulationResult<(Vec<[f64; N]>, [f64; N])> {
        let stages = tableau.stages();
        let mut k: Vec<[f64; N]> = Vec::with_capacity(stages + 1);
        k.push(*f);

        for s in 1..stages {
            let mut y_stage = *y;
            for n in 0..N {
                let mut sum = 0.0;
                for (j, a) in tableau.a[s].iter().enumerate() {
                    sum += a * k[j][n];
                }
                y_stage[n] += h * sum;
            }
            k.push(system.rhs(t + tableau.c[s] * h, &y_stage)?);
        }

        let mut y_new = *y;
        for n in 0..N {
            let mut sum = 0.0;
            for (j, b) in tableau.b.iter().enumerate() {
                sum += b * k[j][n];
            }
            y_new[n] += h * sum;
        }
        k.push(system.rhs(t + h, &y_new)?);

        Ok((k, y_new))
    }

    #[allow(clippy::needless_range_loop)]
    fn error_norm<const N: usize>(
        tableau: &Tableau,
        k: &[[f64; N]],
        y: &[f64; N],
        y_new: &[f64; N],
        h: f64,
        tolerances: &Tolerances,
    ) -> f64 {
        let mut error = [0.0; N];
        let mut scale = [0.0; N];
        for n in 0..N {
            let mut sum = 0.0;
            for (j, e) in tableau.e.iter().enumerate() {
                sum += e * k[j][n];
            }
            error[n] = h * sum;
            scale[n] = tolerances.atol + tolerances.rtol * y[n].abs().max(y_new[n].abs());
        }
        rms_norm(&error, &scale)
    }

    #[allow(clippy::needless_range_loop)]
    fn interpolant<const N: usize>(tableau: &Tableau, k: &[[f64; N]]) -> Vec<[f64; N]> {
        let degree = tableau.p[0].len();
        let mut q = vec![[0.0; N]; degree];
        for (power, coefficients) in q.iter_mut().enumerate() {
            for n in 0..N {
                let mut sum = 0.0;
                for (j, row) in tableau.p.iter().enumerate() {
                    sum += row[power] * k[j][n];
                }
                coefficients[n] = sum;
            }
        }
        q
    }
}

impl<const N: usize> OdeSolver<N> for EmbeddedRungeKutta {
    type Solution = PiecewiseSolution<N>;

    fn integrate<S: OdeSystem<N>>(
        &self,
        system: &S,
        t0: f64,
        y0: [f64; N],
        t1: f64,
        method: SolverMethod,
        tolerances: &Tolerances,
    ) -> SimulationResult<PiecewiseSolution<N>> {
        let tableau = Self::tableau(method)?;
        tolerances.validate()?;
        if !t0.is_finite() || !t1.is_finite() || t1 < t0 {
            return Err(SimulationError::PreconditionError(format!(
                "integration interval [{}, {}] must be finite and forward in time",
                t0, t1
            )));
        }
        if y0.iter().any(|y| !y.is_finite()) {
            return Err(SimulationError::PreconditionError(
                "initial state must be finite".to_string(),
            ));
        }

        let mut stats = Stats::default();
        let mut segments = Vec::new();
        let mut t = t0;
        let mut y = y0;

        if t1 > t0 {
            let exponent = 1.0 / f64::from(tableau.error_estimator_order + 1);
            let mut f = system.rhs(t, &y)?;
            stats.fn_evals += 1;
            let mut h_abs = Self::initial_step(
                system,
                t0,
                &y,
                &f,
                t1 - t0,
                tableau.error_estimator_order,
                tolerances,
                &mut stats,
            )?;

            while t < t1 {
                let min_step = 10.0 * f64::EPSILON * t.abs().max(f64::MIN_POSITIVE);
                let mut step_rejected = false;

                loop {
                    if stats.accepted_steps + stats.rejected_steps >= self.max_steps {
                        return Err(SimulationError::SolverError(format!(
                            "{} exceeded {} steps at t = {}",
                            method.name(),
                            self.max_steps,
                            t
                        )));
                    }
                    if h_abs < min_step {
                        return Err(SimulationError::SolverError(format!(
                            "{} step size {:e} fell below the floating spacing at t = {}",
                            method.name(),
                            h_abs,
                            t
                        )));
                    }

                    let mut t_new = t + h_abs;
                    if t_new >= t1 {
                        t_new = t1;
                    }
                    let h = t_new - t;

                    let (k, y_new) = Self::trial_step(tableau, system, t, &y, &f, h)?;
                    stats.fn_evals += tableau.stages() as u64;
                    let error_norm = Self::error_norm(tableau, &k, &y, &y_new, h, tolerances);

                    if error_norm.is_finite() && error_norm < 1.0 {
                        let mut factor = self.controller.factor(error_norm, exponent);
                        if step_rejected {
                            factor = factor.min(1.0);
                        }
                        stats.accepted_steps += 1;

                        segments.push(Segment {
                            t_old: t,
                            h,
                            y_old: y,
                            q: Self::interpolant(tableau, &k),
                        });
                        if y_new.iter().any(|value| !value.is_finite()) {
                            return Err(SimulationError::SolverError(format!(
                                "{} produced a non-finite state at t = {}",
                                method.name(),
                                t_new
                            )));
                        }

                        t = t_new;
                        y = y_new;
                        f = k[k.len() - 1];
                        h_abs = h * factor;
                        break;
                    }

                    stats.rejected_steps += 1;
                    step_rejected = true;
                    h_abs = h
                        * if error_norm.is_finite() {
                            self.controller.factor(error_norm, exponent)
                        } else {
                            self.controller.min_factor
                        };
                }
            }
        }

        debug!(
            method = method.name(),
            accepted = stats.accepted_steps,
            rejected = stats.rejected_steps,
            fn_evals = stats.fn_evals,
            "adaptive integration finished"
        );

        Ok(PiecewiseSolution {
            t_start: t0,
            t_end: t1,
            y_start: y0,
            y_end: y,
            segments,
            stats,
        })
    }
}
