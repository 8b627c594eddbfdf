//! Deterministic in-process oracles for tests, demos and dry runs.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tt_types::{OracleError, PhysicalParameters, TrapMetrics};

use super::{Oracle, OracleBackend};

type Response = Result<TrapMetrics, OracleError>;
type ResponseFn = Box<dyn FnMut(&PhysicalParameters) -> Response>;

enum Behavior {
    Constant(Response),
    /// Replays responses in order, wrapping around at the end.
    Scripted { responses: Vec<Response>, cursor: usize },
    Function(ResponseFn),
}

/// A stand-in for the simulation engine with fully reproducible output.
pub struct StubOracle {
    behavior: Behavior,
    calls: usize,
    history: Vec<PhysicalParameters>,
    releases: Rc<Cell<usize>>,
}

impl StubOracle {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: 0,
            history: Vec::new(),
            releases: Rc::new(Cell::new(0)),
        }
    }

    /// Return the same metrics for every call.
    pub fn constant(metrics: TrapMetrics) -> Self {
        Self::with_behavior(Behavior::Constant(Ok(metrics)))
    }

    /// Fail every call with the same error.
    pub fn failing(error: OracleError) -> Self {
        Self::with_behavior(Behavior::Constant(Err(error)))
    }

    /// Replay `responses` in order, cycling when exhausted.
    ///
    /// # Panics
    ///
    /// Panics if `responses` is empty.
    pub fn scripted(responses: Vec<Response>) -> Self {
        assert!(!responses.is_empty(), "scripted oracle needs at least one response");
        Self::with_behavior(Behavior::Scripted {
            responses,
            cursor: 0,
        })
    }

    /// Compute metrics from the parameters with an arbitrary closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut(&PhysicalParameters) -> Response + 'static,
    {
        Self::with_behavior(Behavior::Function(Box::new(f)))
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Every parameter set this oracle has been asked to evaluate.
    pub fn history(&self) -> &[PhysicalParameters] {
        &self.history
    }

    /// How many times sessions sharing this counter have been released.
    pub fn release_count(&self) -> usize {
        self.releases.get()
    }
}

impl fmt::Debug for StubOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.behavior {
            Behavior::Constant(_) => "constant",
            Behavior::Scripted { .. } => "scripted",
            Behavior::Function(_) => "function",
        };
        f.debug_struct("StubOracle")
            .field("behavior", &kind)
            .field("calls", &self.calls)
            .finish()
    }
}

impl Oracle for StubOracle {
    fn evaluate(&mut self, params: &PhysicalParameters) -> Result<TrapMetrics, OracleError> {
        self.calls += 1;
        self.history.push(params.clone());
        match &mut self.behavior {
            Behavior::Constant(response) => response.clone(),
            Behavior::Scripted { responses, cursor } => {
                let response = responses[*cursor % responses.len()].clone();
                *cursor += 1;
                response
            }
            Behavior::Function(f) => f(params),
        }
    }

    fn release(&mut self) -> Result<(), OracleError> {
        self.releases.set(self.releases.get() + 1);
        Ok(())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Hands out a single [`StubOracle`] session, or fails to open.
#[derive(Debug)]
pub struct StubBackend {
    session: Option<StubOracle>,
    open_error: Option<OracleError>,
    releases: Rc<Cell<usize>>,
}

impl StubBackend {
    pub fn new(oracle: StubOracle) -> Self {
        let releases = Rc::clone(&oracle.releases);
        Self {
            session: Some(oracle),
            open_error: None,
            releases,
        }
    }

    /// A backend whose model never loads.
    pub fn unavailable(error: OracleError) -> Self {
        Self {
            session: None,
            open_error: Some(error),
            releases: Rc::new(Cell::new(0)),
        }
    }

    /// Number of sessions from this backend that have been released.
    pub fn release_count(&self) -> usize {
        self.releases.get()
    }
}

impl OracleBackend for StubBackend {
    type Session = StubOracle;

    fn open(&mut self) -> Result<StubOracle, OracleError> {
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }
        self.session.take().ok_or_else(|| OracleError::Unavailable {
            message: "stub session already handed out".to_string(),
        })
    }
}
