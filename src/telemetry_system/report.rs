use std::fmt;

use crate::control::runner::{RunOutcome, ScenarioReport};
use crate::utils::vector2d::Vector2D;

/// Plain-text rendering of a [`ScenarioReport`].
pub struct Report<'a> {
    report: &'a ScenarioReport,
    /// Rows of the drift table, evenly spread over the run.
    table_rows: usize,
}

impl<'a> Report<'a> {
    pub fn new(report: &'a ScenarioReport) -> Self {
        Report {
            report,
            table_rows: 10,
        }
    }

    pub fn with_table_rows(mut self, rows: usize) -> Self {
        self.table_rows = rows;
        self
    }

    pub fn format_time(elapsed_time: f64) -> String {
        if elapsed_time >= 3600.0 {
            let hours = (elapsed_time / 3600.0).floor();
            let minutes = ((elapsed_time % 3600.0) / 60.0).floor();
            let seconds = elapsed_time % 60.0;
            format!("{:.0}h {:.0}m {:.2}s", hours, minutes, seconds)
        } else if elapsed_time >= 60.0 {
            let minutes = (elapsed_time / 60.0).floor();
            let seconds = elapsed_time % 60.0;
            format!("{:.0}m {:.2}s", minutes, seconds)
        } else {
            format!("{:.2}s", elapsed_time)
        }
    }

    pub fn format_distance(distance: f64) -> String {
        if distance.abs() >= 1000.0 {
            format!("{:.2} km", distance / 1000.0)
        } else {
            format!("{:.2} m", distance)
        }
    }

    fn format_vector2d(vec: &Vector2D) -> String {
        format!(
            "x = {}, y = {}",
            Self::format_distance(vec.x),
            Self::format_distance(vec.y)
        )
    }

    fn fmt_drift_table(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let completed: Vec<_> = self
            .report
            .runs
            .iter()
            .filter_map(|record| record.completed().map(|run| (&record.label, run)))
            .collect();
        if completed.is_empty() || self.table_rows == 0 {
            return Ok(());
        }

        writeln!(f, "\n--- Energy drift |E - E0| (J/kg) ---")?;
        write!(f, "{:>12}", "t")?;
        for (label, _) in &completed {
            write!(f, " {:>20}", label)?;
        }
        writeln!(f)?;

        let rows = self.table_rows.max(2);
        let t0 = completed[0].1.trajectory.initial().time();
        let t_end = self.report.t_end;
        for row in 0..rows {
            let t = t0 + (t_end - t0) * row as f64 / (rows - 1) as f64;
            write!(f, "{:>12}", Self::format_time(t))?;
            for (_, run) in &completed {
                match drift_at(&run.energy_drift, t) {
                    Some(drift) => write!(f, " {:>20.6e}", drift)?,
                    None => write!(f, " {:>20}", "-")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        writeln!(f, "--- Scenario: {} ({}) ---", report.name, report.body)?;
        writeln!(
            f,
            "Duration: {}, initial specific energy: {:.6e} J/kg",
            Self::format_time(report.t_end),
            report.initial_energy
        )?;
        if let Some(reference) = report.reference_run() {
            writeln!(f, "Reference run: {}", reference.label)?;
        }

        writeln!(f, "\n--- Runs ---")?;
        for record in &report.runs {
            match &record.outcome {
                RunOutcome::Completed(run) => {
                    writeln!(
                        f,
                        "{}: {} samples, final position {}, |E - E0| = {:.6e} J/kg",
                        record.label,
                        run.trajectory.len(),
                        Self::format_vector2d(&run.trajectory.last().position()),
                        run.final_energy_drift()
                    )?;
                    if let Some(error) = &run.error {
                        writeln!(
                            f,
                            "    vs reference: max |dr| = {}, max |dv| = {:.4} m/s, final dE = {:.6e} J/kg",
                            Self::format_distance(error.max_position_error()),
                            error.max_velocity_error(),
                            error.final_energy_drift()
                        )?;
                    }
                }
                RunOutcome::Failed(message) => {
                    writeln!(f, "{}: FAILED ({})", record.label, message)?;
                }
            }
        }

        self.fmt_drift_table(f)
    }
}

/// Drift of the last sample not after `t`.
fn drift_at(series: &[(f64, f64)], t: f64) -> Option<f64> {
    let index = series.partition_point(|&(time, _)| time <= t + 1e-9 * t.abs().max(1.0));
    index.checked_sub(1).map(|i| series[i].1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::runner::ScenarioRunner;
    use crate::control::scenario::ScenarioConfig;
    use crate::trajectory_system::ode_solver::SolverMethod;

    #[test]
    fn test_format_time() {
        assert_eq!(Report::format_time(42.5), "42.50s");
        assert_eq!(Report::format_time(125.0), "2m 5.00s");
        assert_eq!(Report::format_time(6000.0), "1h 40m 0.00s");
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(Report::format_distance(950.0), "950.00 m");
        assert_eq!(Report::format_distance(7.0e6), "7000.00 km");
        assert_eq!(Report::format_distance(-2500.0), "-2.50 km");
    }

    #[test]
    fn test_drift_at_takes_last_sample_not_after() {
        let series = vec![(0.0, 0.0), (5.0, 1.0), (10.0, 2.0)];
        assert_eq!(drift_at(&series, 0.0), Some(0.0));
        assert_eq!(drift_at(&series, 7.0), Some(1.0));
        assert_eq!(drift_at(&series, 10.0), Some(2.0));
        assert_eq!(drift_at(&series, -1.0), None);
    }

    #[test]
    fn test_render_lists_every_run() {
        let mut config = ScenarioConfig::default();
        config.t_end = 300.0;
        config.adaptive.rtol = 1e-9;
        config.adaptive.atol = 1e-6;
        config.adaptive.methods = vec![SolverMethod::Rk45, SolverMethod::Lsoda];
        let report = ScenarioRunner::run(&config).unwrap();

        let text = Report::new(&report).with_table_rows(4).to_string();
        println!("{}", text);
        assert!(text.contains("--- Scenario: Two-body LEO (Earth) ---"));
        assert!(text.contains("Reference run: RK45"));
        assert!(text.contains("Euler (dt = 5 s): 61 samples"));
        assert!(text.contains("LSODA: FAILED"));
        assert!(text.contains("vs reference"));
        assert!(text.contains("Energy drift"));
    }
}
