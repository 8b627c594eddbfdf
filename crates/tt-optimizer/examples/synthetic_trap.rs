use tt_optimizer::*;
use tt_types::*;

/// A smooth stand-in for the field solver: the trap deepens with RF
/// amplitude, centers at V_dc = 40 V and draws power quadratically in V_rf.
fn synthetic_trap(p: &PhysicalParameters) -> Result<TrapMetrics, OracleError> {
    let v_rf = p.get("V_rf").unwrap_or(0.0);
    let v_dc = p.get("V_dc").unwrap_or(0.0);
    let f_mhz = p.get("f").unwrap_or(1e7) / 1e6;

    let depth = 0.02 * v_rf * (10.0 / f_mhz).min(2.0);
    let offset = (v_dc - 40.0) / 25.0;
    let power = v_rf * v_rf / 200.0 * (f_mhz / 10.0);
    Ok(TrapMetrics::new(depth, offset, power))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("TrapTune synthetic trap example");

    let space = ParameterSpace::new()
        .add("V_rf", 0.0, 1000.0)
        .add("V_dc", 0.0, 500.0)
        .add("f", 1e6, 1e8);
    let mut baseline = PhysicalParameters::new();
    baseline.insert("V_rf", 300.0);
    baseline.insert("V_dc", 50.0);
    baseline.insert("f", 1e7);

    let config = OptimizationConfig::new("synthetic", space)
        .with_baseline(baseline)
        .with_max_iterations(200)
        .with_objective(
            ObjectiveConfig::default().with_weights(ObjectiveWeights::new(1.0, 10.0, 0.8)),
        );
    let optimizer = Optimizer::new(config)?;

    let log_path = std::env::temp_dir().join("synthetic_trap_log.csv");
    let mut logger = TrialLogger::create(&log_path, optimizer.config().parameters.names())?;
    let mut backend = StubBackend::new(StubOracle::from_fn(synthetic_trap));

    let run = optimizer.run(&mut backend, Some(&mut logger))?;
    println!("Run finished as {} after {} trials", run.state, run.trial_count());

    if let Some(best) = run.best_trial() {
        println!("Best configuration: {}", best.parameters);
        println!("Best score: {:.6}", best.score);
    }

    let table = read_trial_log(&log_path)?;
    for stats in table.column_stats() {
        println!(
            "{:>10}: min {:>12.4} max {:>12.4} mean {:>12.4}",
            stats.name, stats.min, stats.max, stats.mean
        );
    }
    println!("Trial log written to {}", log_path.display());

    Ok(())
}
