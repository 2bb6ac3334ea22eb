use orbit_simulation::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ScenarioConfig::default();
    let report = match ScenarioRunner::run(&config) {
        Ok(report) => report,
        Err(e) => {
            println!("Error during scenario {}: {}", config.name, e);
            return Err(e.into());
        }
    };

    println!("{}", Report::new(&report));

    for record in report.failed_runs() {
        println!("Run {} did not complete.", record.label);
    }

    Ok(())
}
