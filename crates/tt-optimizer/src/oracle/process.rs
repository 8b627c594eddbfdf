//! Oracle backed by a long-lived solver process speaking line-delimited JSON.
//!
//! Protocol, one JSON object per line:
//!
//! ```text
//! -> {"command":"ping"}
//! <- {"status":"ready"}
//! -> {"command":"evaluate","parameters":{"V_rf":300.0,...}}
//! <- {"depth_eV":6.1,"offset_mm":0.002,"P_est_mW":980.0}
//! <- {"error":"stationary solver did not converge"}
//! -> {"command":"shutdown"}
//! ```
//!
//! The process owns the loaded model, so it is started once per run and
//! evaluations are strictly sequential.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, info, warn};
use tt_types::{OracleError, PhysicalParameters, TrapMetrics};

use super::{Oracle, OracleBackend};

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum Request<'a> {
    Ping,
    Evaluate { parameters: &'a PhysicalParameters },
    Shutdown,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reply {
    Failure { error: String },
    Metrics(TrapMetrics),
    Status { status: String },
}

fn encode_request(request: &Request<'_>) -> Result<String, OracleError> {
    serde_json::to_string(request).map_err(|e| OracleError::Protocol {
        message: format!("failed to encode request: {e}"),
    })
}

fn parse_reply(line: &str) -> Result<Reply, OracleError> {
    serde_json::from_str(line.trim()).map_err(|e| OracleError::Protocol {
        message: format!("unparseable reply {:?}: {e}", line.trim()),
    })
}

/// Launch configuration for the solver process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessBackend {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl ProcessBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl OracleBackend for ProcessBackend {
    type Session = ProcessOracle;

    fn open(&mut self) -> Result<ProcessOracle, OracleError> {
        info!("Starting solver process: {} {:?}", self.program, self.args);

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| OracleError::Unavailable {
            message: format!("failed to start {}: {e}", self.program),
        })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(OracleError::Unavailable {
                    message: "solver process pipes unavailable".to_string(),
                });
            }
        };

        let mut session = ProcessOracle {
            label: self.program.clone(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        };

        match session.round_trip(&Request::Ping)? {
            Reply::Failure { error } => Err(OracleError::ModelLoad { message: error }),
            Reply::Status { status } => {
                info!("Solver process ready ({status})");
                Ok(session)
            }
            Reply::Metrics(_) => {
                debug!("Solver answered handshake with metrics; treating as ready");
                Ok(session)
            }
        }
    }
}

/// A running solver process with its model loaded.
#[derive(Debug)]
pub struct ProcessOracle {
    label: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl ProcessOracle {
    /// Send one request and read its reply.
    ///
    /// Lines that are not JSON objects are solver chatter and are skipped.
    /// Any other failure leaves request and reply streams out of step, so
    /// the process is stopped and every later call fails as unavailable.
    fn round_trip(&mut self, request: &Request<'_>) -> Result<Reply, OracleError> {
        let result = self.exchange(request);
        if result.is_err() {
            self.abandon();
        }
        result
    }

    fn exchange(&mut self, request: &Request<'_>) -> Result<Reply, OracleError> {
        self.send(request)?;
        loop {
            let mut line = String::new();
            let read = self
                .stdout
                .read_line(&mut line)
                .map_err(|e| OracleError::Unavailable {
                    message: format!("failed to read from solver process: {e}"),
                })?;
            if read == 0 {
                return Err(OracleError::Unavailable {
                    message: "solver process closed its output".to_string(),
                });
            }
            let line = line.trim();
            if line.starts_with('{') {
                return parse_reply(line);
            }
            if !line.is_empty() {
                debug!("{}: {}", self.label, line);
            }
        }
    }

    fn send(&mut self, request: &Request<'_>) -> Result<(), OracleError> {
        let line = encode_request(request)?;
        let stdin = self.stdin.as_mut().ok_or_else(|| OracleError::Unavailable {
            message: "solver process already released".to_string(),
        })?;
        writeln!(stdin, "{line}")
            .and_then(|_| stdin.flush())
            .map_err(|e| OracleError::Unavailable {
                message: format!("failed to write to solver process: {e}"),
            })
    }

    /// Stop a process whose replies can no longer be trusted.
    fn abandon(&mut self) {
        if self.stdin.take().is_some() {
            warn!("Solver process {} is out of step; stopping it", self.label);
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

impl Oracle for ProcessOracle {
    fn evaluate(&mut self, params: &PhysicalParameters) -> Result<TrapMetrics, OracleError> {
        match self.round_trip(&Request::Evaluate { parameters: params })? {
            Reply::Metrics(metrics) => metrics.ensure_finite(),
            Reply::Failure { error } => Err(OracleError::SolverFailed { message: error }),
            Reply::Status { status } => {
                self.abandon();
                Err(OracleError::Protocol {
                    message: format!("expected metrics, got status {status:?}"),
                })
            }
        }
    }

    /// Ask the solver to shut down, close its input and wait for it. The
    /// shutdown acknowledgement is not awaited.
    fn release(&mut self) -> Result<(), OracleError> {
        if self.stdin.is_none() {
            return Ok(());
        }
        if let Err(e) = self.send(&Request::Shutdown) {
            debug!("Solver shutdown request not delivered: {e}");
        }
        // EOF also stops solvers that ignore the shutdown command.
        self.stdin = None;
        let status = self.child.wait().map_err(|e| OracleError::Unavailable {
            message: format!("failed to wait for solver process: {e}"),
        })?;
        info!("Solver process exited with {status}");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.label
    }
}

impl Drop for ProcessOracle {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            warn!("Solver process dropped without release; killing it");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_tagged_by_command() {
        let mut params = PhysicalParameters::new();
        params.insert("V_rf", 300.0);
        assert_eq!(encode_request(&Request::Ping).unwrap(), r#"{"command":"ping"}"#);
        assert_eq!(
            encode_request(&Request::Evaluate { parameters: &params }).unwrap(),
            r#"{"command":"evaluate","parameters":{"V_rf":300.0}}"#
        );
    }

    #[test]
    fn replies_are_distinguished() {
        match parse_reply(r#"{"depth_eV":6.0,"offset_mm":0.1,"P_est_mW":950.0}"#).unwrap() {
            Reply::Metrics(m) => assert_eq!(m, TrapMetrics::new(6.0, 0.1, 950.0)),
            other => panic!("expected metrics, got {other:?}"),
        }
        assert!(matches!(
            parse_reply(r#"{"error":"mesh failed"}"#).unwrap(),
            Reply::Failure { .. }
        ));
        assert!(matches!(
            parse_reply("{\"status\":\"ready\"}\n").unwrap(),
            Reply::Status { .. }
        ));
        assert!(matches!(
            parse_reply("not json"),
            Err(OracleError::Protocol { .. })
        ));
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let mut backend = ProcessBackend::new("/nonexistent/traptune-solver");
        assert!(matches!(
            backend.open(),
            Err(OracleError::Unavailable { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn shell_solver_round_trip() {
        let script = r#"while read line; do
  case "$line" in
    *ping*) echo '{"status":"ready"}' ;;
    *shutdown*) echo '{"status":"bye"}'; exit 0 ;;
    *) echo '{"depth_eV":6.0,"offset_mm":0.1,"P_est_mW":950.0}' ;;
  esac
done"#;
        let mut backend = ProcessBackend::new("sh").with_args(["-c", script]);
        let mut oracle = backend.open().unwrap();

        let mut params = PhysicalParameters::new();
        params.insert("V_rf", 300.0);
        let metrics = oracle.evaluate(&params).unwrap();
        assert_eq!(metrics, TrapMetrics::new(6.0, 0.1, 950.0));

        oracle.release().unwrap();
        // second release is a no-op
        oracle.release().unwrap();
    }

    /// Echoes V_rf back as the depth, after printing a banner line before
    /// its first reply.
    #[cfg(unix)]
    const CHATTY_SOLVER: &str = r#"first=1
while read line; do
  case "$line" in
    *ping*) echo '{"status":"ready"}' ;;
    *shutdown*) exit 0 ;;
    *)
      if [ "$first" = 1 ]; then echo 'Loading mesh...'; first=0; fi
      v=$(echo "$line" | sed 's/.*"V_rf":\([0-9.]*\).*/\1/')
      echo "{\"depth_eV\":$v,\"offset_mm\":0.0,\"P_est_mW\":1000.0}" ;;
  esac
done"#;

    #[cfg(unix)]
    fn v_rf(value: f64) -> PhysicalParameters {
        let mut params = PhysicalParameters::new();
        params.insert("V_rf", value);
        params
    }

    #[cfg(unix)]
    #[test]
    fn solver_chatter_does_not_shift_replies() {
        let mut backend = ProcessBackend::new("sh").with_args(["-c", CHATTY_SOLVER]);
        let mut oracle = backend.open().unwrap();

        assert_eq!(oracle.evaluate(&v_rf(100.0)).unwrap().depth_ev, 100.0);
        assert_eq!(oracle.evaluate(&v_rf(900.0)).unwrap().depth_ev, 900.0);
        assert_eq!(oracle.evaluate(&v_rf(250.0)).unwrap().depth_ev, 250.0);

        oracle.release().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn malformed_reply_stops_the_session() {
        let script = r#"while read line; do
  case "$line" in
    *ping*) echo '{"status":"ready"}' ;;
    *) echo '{"depth_eV":'; echo '{"depth_eV":6.0,"offset_mm":0.1,"P_est_mW":950.0}' ;;
  esac
done"#;
        let mut backend = ProcessBackend::new("sh").with_args(["-c", script]);
        let mut oracle = backend.open().unwrap();

        assert!(matches!(
            oracle.evaluate(&v_rf(100.0)),
            Err(OracleError::Protocol { .. })
        ));
        // the trailing reply must never be handed to a later trial
        assert!(matches!(
            oracle.evaluate(&v_rf(900.0)),
            Err(OracleError::Unavailable { .. })
        ));
        oracle.release().unwrap();
    }
}
