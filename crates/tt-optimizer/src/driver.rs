//! The minimizer loop: propose, evaluate, score, record, log, observe.

use tracing::{debug, info, warn};
use tt_types::{ConfigError, TrapMetrics, TtResult};

use crate::config::OptimizationConfig;
use crate::log::TrialLogger;
use crate::objective::{assess, Assessment};
use crate::oracle::{Oracle, OracleBackend};
use crate::simplex::NelderMead;
use crate::trial::{OptimizationRun, RunId, RunState, Trial, TrialOutcome};

/// Runs one Nelder-Mead search against an oracle.
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizationConfig,
}

impl Optimizer {
    /// Validate `config` and build an optimizer for it.
    pub fn new(config: OptimizationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Open a session on `backend`, run to termination and release it.
    ///
    /// A backend that cannot open ends the run as [`RunState::Aborted`]
    /// with no trials; that is reported through the returned run, not as an
    /// error. Errors are reserved for broken invariants inside the driver.
    pub fn run<B: OracleBackend>(
        &self,
        backend: &mut B,
        logger: Option<&mut TrialLogger>,
    ) -> TtResult<OptimizationRun> {
        let mut run = OptimizationRun::new(self.config.clone());
        run.mark_running()?;
        info!(
            "Starting optimization run {} ({}) over {} parameters",
            run.id,
            self.config.name,
            self.config.parameters.dimension()
        );

        let mut session = match backend.open() {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not open simulation oracle: {}", e);
                run.mark_aborted(e.to_string())?;
                return Ok(run);
            }
        };

        let result = self.drive(&mut run, &mut session, logger);
        if let Err(e) = session.release() {
            warn!("Failed to release oracle {}: {}", session.name(), e);
        }
        result?;

        report(&run);
        Ok(run)
    }

    /// Run against an already open oracle. The caller owns its release.
    pub fn run_with_oracle<O: Oracle>(
        &self,
        oracle: &mut O,
        logger: Option<&mut TrialLogger>,
    ) -> TtResult<OptimizationRun> {
        let mut run = OptimizationRun::new(self.config.clone());
        run.mark_running()?;
        self.drive(&mut run, oracle, logger)?;
        report(&run);
        Ok(run)
    }

    fn drive<O: Oracle>(
        &self,
        run: &mut OptimizationRun,
        oracle: &mut O,
        mut logger: Option<&mut TrialLogger>,
    ) -> TtResult<()> {
        let config = &self.config;
        let start = config.parameters.start_point(config.baseline.as_ref());
        let mut simplex = NelderMead::new(start, config.initial_step, config.tolerance());

        while run.trial_count() < config.max_iterations {
            if converged(&simplex, run) {
                break;
            }

            let point = simplex.propose();
            let trial = self.evaluate(oracle, run.id, run.trial_count() + 1, point)?;
            let score = trial.score;

            if let Some(logger) = logger.as_mut() {
                if let Err(e) = logger.append(&trial) {
                    warn!("Trial {} was not written to the log: {}", trial.number, e);
                    run.log_failures += 1;
                }
            }
            run.record(trial);
            simplex.observe(score);

            if let Some(limit) = config.max_consecutive_failures {
                let failures = run.consecutive_failures();
                if failures >= limit {
                    warn!("Oracle failed {} times in a row; aborting", failures);
                    run.mark_aborted(format!(
                        "oracle failed {failures} consecutive evaluations"
                    ))?;
                    return Ok(());
                }
            }
        }

        if converged(&simplex, run) {
            debug!(
                "Simplex converged after {} iterations (spread {:e}, size {:e})",
                simplex.iterations(),
                simplex.score_spread(),
                simplex.size()
            );
            run.mark_converged()?;
        } else {
            run.mark_max_iterations()?;
        }
        Ok(())
    }

    /// Turn one normalized proposal into a scored trial.
    fn evaluate<O: Oracle>(
        &self,
        oracle: &mut O,
        run_id: RunId,
        number: usize,
        point: Vec<f64>,
    ) -> TtResult<Trial> {
        let config = &self.config;
        let mut parameters = config.parameters.denormalize(&point)?;
        let adjusted = config
            .constraint
            .as_ref()
            .map_or(false, |c| c.apply(&mut parameters));
        if adjusted {
            debug!("Trial {}: geometry scaled into the simulation sphere", number);
        }

        let objective = &config.objective;
        let (outcome, score) = match oracle
            .evaluate(&parameters)
            .and_then(TrapMetrics::ensure_finite)
        {
            Ok(metrics) => match assess(&metrics, objective) {
                Assessment::Scored(breakdown) => {
                    debug!(
                        "Trial {}: depth {:.6} offset {:.6} power {:.6}",
                        number, breakdown.depth, breakdown.offset, breakdown.power
                    );
                    (TrialOutcome::Evaluated { metrics }, breakdown.total())
                }
                Assessment::Unphysical { reason } => {
                    warn!("Trial {} unphysical: {}", number, reason);
                    (
                        TrialOutcome::Unphysical { metrics, reason },
                        objective.penalty,
                    )
                }
            },
            Err(e) => {
                warn!("Trial {} failed on {}: {}", number, oracle.name(), e);
                (
                    TrialOutcome::Failed {
                        reason: e.to_string(),
                    },
                    objective.penalty,
                )
            }
        };

        info!("Trial {}: {} -> score {}", number, parameters, score);
        Ok(Trial::new(
            run_id, number, point, parameters, adjusted, outcome, score,
        ))
    }
}

/// The simplex has collapsed and its best point is a real trap.
fn converged(simplex: &NelderMead, run: &OptimizationRun) -> bool {
    simplex.has_converged() && run.best_trial().map_or(false, |t| !t.is_penalty())
}

fn report(run: &OptimizationRun) {
    info!(
        "Run {} finished as {} after {} trials",
        run.id,
        run.state,
        run.trial_count()
    );
    match run.best_trial() {
        Some(best) => {
            info!("Best trial #{}: {}", best.number, best.parameters);
            if let Some(m) = best.outcome.metrics() {
                info!(
                    "Best metrics: depth {} eV, offset {} mm, power {} mW",
                    m.depth_ev, m.offset_mm, m.power_mw
                );
            }
            info!("Best score: {}", best.score);
        }
        None => info!("No trials recorded"),
    }
    if run.state == RunState::Aborted {
        if let Some(error) = &run.error {
            warn!("Run aborted: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::InscribedCylinder;
    use crate::oracle::{StubBackend, StubOracle};
    use crate::space::ParameterSpace;
    use tt_types::{OracleError, PhysicalParameters};

    fn rf_space() -> ParameterSpace {
        ParameterSpace::new()
            .add("V_rf", 0.0, 1000.0)
            .add("f", 1e6, 1e8)
    }

    fn config(max_iterations: usize) -> OptimizationConfig {
        OptimizationConfig::new("test", rf_space()).with_max_iterations(max_iterations)
    }

    /// Offset grows with distance from V_rf = 300 V, f = 20 MHz.
    fn bowl(p: &PhysicalParameters) -> Result<TrapMetrics, OracleError> {
        let v = p.get("V_rf").unwrap_or(0.0);
        let f = p.get("f").unwrap_or(0.0);
        let offset = ((v - 300.0) / 100.0).powi(2) + ((f - 2e7) / 1e7).powi(2);
        Ok(TrapMetrics::new(6.0, offset, 950.0))
    }

    #[test]
    fn constant_oracle_converges_after_initial_simplex() {
        let optimizer = Optimizer::new(config(50)).unwrap();
        let mut backend =
            StubBackend::new(StubOracle::constant(TrapMetrics::new(6.0, 0.1, 950.0)));

        let run = optimizer.run(&mut backend, None).unwrap();

        assert_eq!(run.state, RunState::Converged);
        assert_eq!(run.trial_count(), 3);
        for score in run.scores() {
            assert!((score - 0.15).abs() < 1e-12, "score was {score}");
        }
        // the first trial stays best on a flat landscape
        assert_eq!(run.best_trial().unwrap().number, 1);
        assert_eq!(backend.release_count(), 1);
    }

    #[test]
    fn zero_depth_oracle_runs_to_cap() {
        let optimizer = Optimizer::new(config(12)).unwrap();
        let mut backend =
            StubBackend::new(StubOracle::constant(TrapMetrics::new(0.0, 0.0, 1000.0)));

        let run = optimizer.run(&mut backend, None).unwrap();

        assert_eq!(run.state, RunState::MaxIterations);
        assert_eq!(run.trial_count(), 12);
        assert!(run.scores().iter().all(|&s| s == 1e6));
        assert!(run.best_trial().unwrap().is_penalty());
        assert!(run
            .trials()
            .iter()
            .all(|t| matches!(t.outcome, TrialOutcome::Unphysical { .. })));
    }

    #[test]
    fn cap_gives_one_log_row_per_trial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optimization_log.csv");
        let optimizer = Optimizer::new(config(10)).unwrap();
        let mut logger = TrialLogger::create(&path, optimizer.config().parameters.names()).unwrap();
        let mut backend = StubBackend::new(StubOracle::from_fn(bowl));

        let run = optimizer.run(&mut backend, Some(&mut logger)).unwrap();

        assert_eq!(run.state, RunState::MaxIterations);
        assert_eq!(run.trial_count(), 10);
        assert_eq!(run.log_failures, 0);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 11);
    }

    #[test]
    fn log_rows_follow_each_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optimization_log.csv");
        let optimizer = Optimizer::new(config(3)).unwrap();
        let mut logger = TrialLogger::create(&path, optimizer.config().parameters.names()).unwrap();
        let mut backend = StubBackend::new(StubOracle::scripted(vec![
            Ok(TrapMetrics::new(6.0, 0.1, 950.0)),
            Ok(TrapMetrics::new(0.0, 0.0, 1000.0)),
            Err(OracleError::Timeout { seconds: 600 }),
        ]));

        let run = optimizer.run(&mut backend, Some(&mut logger)).unwrap();

        assert_eq!(run.trial_count(), 3);
        assert_eq!(run.log_failures, 0);
        let values = |t: &Trial| {
            t.parameters
                .values()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        let trials = run.trials();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec![
                "V_rf,f,depth_eV,offset_mm,P_est_mW,score,outcome".to_string(),
                format!("{},6,0.1,950,{},ok", values(&trials[0]), trials[0].score),
                format!("{},0,0,1000,1000000,unphysical", values(&trials[1])),
                format!("{},,,,1000000,failed", values(&trials[2])),
            ]
        );
    }

    #[test]
    fn search_improves_on_start() {
        let optimizer = Optimizer::new(config(60)).unwrap();
        let mut backend = StubBackend::new(StubOracle::from_fn(bowl));

        let run = optimizer.run(&mut backend, None).unwrap();

        let first = run.trials()[0].score;
        let best = run.best_trial().unwrap();
        assert!(best.score < first, "best {} vs start {}", best.score, first);
        let v = best.parameters.get("V_rf").unwrap();
        assert!((v - 300.0).abs() < 200.0, "V_rf {v}");
    }

    #[test]
    fn replay_is_deterministic() {
        let optimizer = Optimizer::new(config(25)).unwrap();
        let a = optimizer
            .run(&mut StubBackend::new(StubOracle::from_fn(bowl)), None)
            .unwrap();
        let b = optimizer
            .run(&mut StubBackend::new(StubOracle::from_fn(bowl)), None)
            .unwrap();

        assert_eq!(a.scores(), b.scores());
        let points = |run: &OptimizationRun| -> Vec<Vec<f64>> {
            run.trials().iter().map(|t| t.normalized.clone()).collect()
        };
        assert_eq!(points(&a), points(&b));
        assert_eq!(
            a.best_trial().unwrap().number,
            b.best_trial().unwrap().number
        );
    }

    #[test]
    fn unavailable_oracle_aborts_before_any_trial() {
        let optimizer = Optimizer::new(config(10)).unwrap();
        let mut backend = StubBackend::unavailable(OracleError::ModelLoad {
            message: "model file missing".to_string(),
        });

        let run = optimizer.run(&mut backend, None).unwrap();

        assert_eq!(run.state, RunState::Aborted);
        assert_eq!(run.trial_count(), 0);
        assert!(run.error.unwrap().contains("model file missing"));
        assert_eq!(backend.release_count(), 0);
    }

    #[test]
    fn oracle_failures_are_penalized_and_run_continues() {
        let optimizer = Optimizer::new(config(6)).unwrap();
        let mut backend = StubBackend::new(StubOracle::scripted(vec![
            Err(OracleError::Timeout { seconds: 600 }),
            Ok(TrapMetrics::new(6.0, 0.1, 950.0)),
        ]));

        let run = optimizer.run(&mut backend, None).unwrap();

        assert_ne!(run.state, RunState::Aborted);
        assert_eq!(run.trial_count(), 6);
        let failed: Vec<&Trial> = run
            .trials()
            .iter()
            .filter(|t| matches!(t.outcome, TrialOutcome::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 3);
        assert!(failed.iter().all(|t| t.score == 1e6));
        assert!(!run.best_trial().unwrap().is_penalty());
    }

    #[test]
    fn non_finite_metrics_count_as_failures() {
        let optimizer = Optimizer::new(config(4)).unwrap();
        let mut backend = StubBackend::new(StubOracle::constant(TrapMetrics::new(
            f64::NAN,
            0.1,
            950.0,
        )));

        let run = optimizer.run(&mut backend, None).unwrap();

        assert_eq!(run.state, RunState::MaxIterations);
        assert!(run
            .trials()
            .iter()
            .all(|t| matches!(t.outcome, TrialOutcome::Failed { .. })));
    }

    #[test]
    fn consecutive_failure_limit_aborts() {
        let optimizer =
            Optimizer::new(config(50).with_max_consecutive_failures(3)).unwrap();
        let mut backend = StubBackend::new(StubOracle::failing(OracleError::SolverFailed {
            message: "mesh error".to_string(),
        }));

        let run = optimizer.run(&mut backend, None).unwrap();

        assert_eq!(run.state, RunState::Aborted);
        assert_eq!(run.trial_count(), 3);
        assert_eq!(backend.release_count(), 1);
    }

    #[test]
    fn log_write_failures_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let optimizer = Optimizer::new(config(5)).unwrap();
        // header names that never match the trial parameters
        let mut logger = TrialLogger::create(dir.path().join("log.csv"), ["x", "y"]).unwrap();
        let mut backend = StubBackend::new(StubOracle::from_fn(bowl));

        let run = optimizer.run(&mut backend, Some(&mut logger)).unwrap();

        assert_eq!(run.trial_count(), 5);
        assert_eq!(run.log_failures, 5);
        assert_eq!(logger.rows(), 0);
    }

    #[test]
    fn constraint_adjusts_before_evaluation() {
        let space = ParameterSpace::new()
            .add("rod_spacing", 0.001, 0.02)
            .add("rod_radius", 0.0005, 0.001)
            .add("rod_length", 0.01, 0.1)
            .add("endcap_offset", 0.0, 0.01);
        let config = OptimizationConfig::new("rods", space)
            .with_max_iterations(5)
            .with_constraint(InscribedCylinder::rod_trap());
        let optimizer = Optimizer::new(config).unwrap();
        let mut oracle = StubOracle::constant(TrapMetrics::new(6.0, 0.1, 950.0));

        let run = optimizer.run_with_oracle(&mut oracle, None).unwrap();

        // mid-range geometry is far too long for a 15 mm sphere
        let first = &run.trials()[0];
        assert!(first.constraint_adjusted);
        assert!(first.parameters.get("rod_length").unwrap() < 0.055);
        assert_eq!(oracle.history()[0], first.parameters);
        assert_eq!(oracle.release_count(), 0);
    }

    #[test]
    fn invalid_config_rejected_up_front() {
        let bad = OptimizationConfig::new("bad", ParameterSpace::new());
        assert!(matches!(
            Optimizer::new(bad),
            Err(ConfigError::NoParameters)
        ));
    }
}
