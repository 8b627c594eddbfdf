//! Trial tracking and optimization run management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tt_types::{PhysicalParameters, RunError, TrapMetrics};
use uuid::Uuid;

use crate::config::OptimizationConfig;

/// Unique optimization run identifier.
pub type RunId = Uuid;

/// Lifecycle state for an optimization run.
///
/// `Initialized -> Running -> {Converged, MaxIterations, Aborted}`. No
/// transition skips `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Initialized,
    Running,
    Converged,
    MaxIterations,
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::MaxIterations | Self::Aborted)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Converged => "converged",
            Self::MaxIterations => "max-iterations",
            Self::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// What the oracle said about one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrialOutcome {
    Evaluated { metrics: TrapMetrics },
    /// The oracle answered but the trap does not confine (or is wildly off
    /// center); scored at the penalty.
    Unphysical { metrics: TrapMetrics, reason: String },
    /// The oracle failed; scored at the penalty.
    Failed { reason: String },
}

impl TrialOutcome {
    pub fn metrics(&self) -> Option<&TrapMetrics> {
        match self {
            Self::Evaluated { metrics } | Self::Unphysical { metrics, .. } => Some(metrics),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_penalty(&self) -> bool {
        !matches!(self, Self::Evaluated { .. })
    }

    /// Short marker written to the trial log.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Evaluated { .. } => "ok",
            Self::Unphysical { .. } => "unphysical",
            Self::Failed { .. } => "failed",
        }
    }
}

/// A single evaluated candidate. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub run_id: RunId,
    /// 1-based position in the run.
    pub number: usize,
    /// The point the minimizer proposed, before clamping.
    pub normalized: Vec<f64>,
    /// The values actually sent to the oracle.
    pub parameters: PhysicalParameters,
    /// Whether the geometry constraint rescaled `parameters`.
    pub constraint_adjusted: bool,
    pub outcome: TrialOutcome,
    pub score: f64,
    pub recorded_at: DateTime<Utc>,
}

impl Trial {
    pub fn new(
        run_id: RunId,
        number: usize,
        normalized: Vec<f64>,
        parameters: PhysicalParameters,
        constraint_adjusted: bool,
        outcome: TrialOutcome,
        score: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            number,
            normalized,
            parameters,
            constraint_adjusted,
            outcome,
            score,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_penalty(&self) -> bool {
        self.outcome.is_penalty()
    }
}

/// Aggregate state of one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRun {
    pub id: RunId,
    pub config: OptimizationConfig,
    pub state: RunState,
    trials: Vec<Trial>,
    best: Option<usize>,
    /// Rows that could not be written to the trial log.
    pub log_failures: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl OptimizationRun {
    pub fn new(config: OptimizationConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            state: RunState::Initialized,
            trials: Vec::new(),
            best: None,
            log_failures: 0,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    fn transition(&mut self, to: RunState) -> Result<(), RunError> {
        let allowed = matches!(
            (self.state, to),
            (RunState::Initialized, RunState::Running)
                | (RunState::Running, RunState::Converged)
                | (RunState::Running, RunState::MaxIterations)
                | (RunState::Running, RunState::Aborted)
        );
        if !allowed {
            return Err(RunError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn mark_running(&mut self) -> Result<(), RunError> {
        self.transition(RunState::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_converged(&mut self) -> Result<(), RunError> {
        self.transition(RunState::Converged)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_max_iterations(&mut self) -> Result<(), RunError> {
        self.transition(RunState::MaxIterations)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_aborted(&mut self, error: String) -> Result<(), RunError> {
        self.transition(RunState::Aborted)?;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
        Ok(())
    }

    /// Append a trial and update the best if it strictly improves on it.
    pub fn record(&mut self, trial: Trial) -> &Trial {
        let improves = match self.best_trial() {
            None => true,
            Some(best) => trial.score < best.score,
        };
        self.trials.push(trial);
        let index = self.trials.len() - 1;
        if improves {
            self.best = Some(index);
        }
        &self.trials[index]
    }

    /// Lowest-scoring trial; the earliest one wins ties.
    pub fn best_trial(&self) -> Option<&Trial> {
        self.best.map(|i| &self.trials[i])
    }

    /// Every recorded trial, in evaluation order.
    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn trial_count(&self) -> usize {
        self.trials.len()
    }

    /// Number of trailing trials whose oracle call failed.
    pub fn consecutive_failures(&self) -> usize {
        self.trials
            .iter()
            .rev()
            .take_while(|t| matches!(t.outcome, TrialOutcome::Failed { .. }))
            .count()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.trials.iter().map(|t| t.score).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::ParameterSpace;

    fn sample_run() -> OptimizationRun {
        let space = ParameterSpace::new().add("V_rf", 0.0, 1000.0);
        OptimizationRun::new(OptimizationConfig::new("test_run", space))
    }

    fn trial(run: &OptimizationRun, score: f64, outcome: TrialOutcome) -> Trial {
        let params: PhysicalParameters = [("V_rf".to_string(), 300.0)].into_iter().collect();
        Trial::new(run.id, run.trial_count() + 1, vec![0.3], params, false, outcome, score)
    }

    fn ok() -> TrialOutcome {
        TrialOutcome::Evaluated {
            metrics: TrapMetrics::new(6.0, 0.1, 950.0),
        }
    }

    fn failed() -> TrialOutcome {
        TrialOutcome::Failed {
            reason: "solver diverged".into(),
        }
    }

    #[test]
    fn run_lifecycle() {
        let mut run = sample_run();
        assert_eq!(run.state, RunState::Initialized);
        assert!(run.started_at.is_none());

        run.mark_running().unwrap();
        assert_eq!(run.state, RunState::Running);
        assert!(run.started_at.is_some());

        run.mark_converged().unwrap();
        assert_eq!(run.state, RunState::Converged);
        assert!(run.state.is_terminal());
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn no_transition_skips_running() {
        let mut run = sample_run();
        assert!(matches!(
            run.mark_converged(),
            Err(RunError::InvalidTransition { .. })
        ));
        assert!(run.mark_aborted("setup".into()).is_err());
        assert_eq!(run.state, RunState::Initialized);

        run.mark_running().unwrap();
        run.mark_max_iterations().unwrap();
        assert!(run.mark_running().is_err());
        assert!(run.mark_converged().is_err());
    }

    #[test]
    fn best_trial_tracking_minimize() {
        let mut run = sample_run();
        let a = trial(&run, 0.5, ok());
        run.record(a);
        assert_eq!(run.best_trial().unwrap().score, 0.5);

        let b = trial(&run, 0.2, ok());
        run.record(b);
        assert_eq!(run.best_trial().unwrap().score, 0.2);

        // worse result does not replace
        let c = trial(&run, 1e6, failed());
        run.record(c);
        assert_eq!(run.best_trial().unwrap().score, 0.2);

        // ties keep the earliest
        let d = trial(&run, 0.2, ok());
        run.record(d);
        assert_eq!(run.best_trial().unwrap().number, 2);
    }

    #[test]
    fn consecutive_failures_counts_tail() {
        let mut run = sample_run();
        for outcome in [failed(), ok(), failed(), failed()] {
            let t = trial(&run, 1.0, outcome);
            run.record(t);
        }
        assert_eq!(run.consecutive_failures(), 2);
    }

    #[test]
    fn outcome_labels_and_metrics() {
        assert_eq!(ok().label(), "ok");
        assert!(!ok().is_penalty());
        let unphysical = TrialOutcome::Unphysical {
            metrics: TrapMetrics::new(0.0, 0.0, 10.0),
            reason: "no confinement".into(),
        };
        assert_eq!(unphysical.label(), "unphysical");
        assert!(unphysical.is_penalty());
        assert!(unphysical.metrics().is_some());
        assert!(failed().metrics().is_none());
    }

    #[test]
    fn run_serializes_to_json() {
        let mut run = sample_run();
        run.mark_running().unwrap();
        let t = trial(&run, 0.15, ok());
        run.record(t);
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["state"], "Running");
        assert_eq!(json["trials"][0]["outcome"]["kind"], "evaluated");
        assert_eq!(json["trials"][0]["parameters"]["V_rf"], 300.0);
    }
}
