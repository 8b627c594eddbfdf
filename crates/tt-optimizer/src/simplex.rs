//! Nelder-Mead downhill simplex with a propose/observe interface.
//!
//! The minimizer never calls the objective itself. The driver asks for one
//! point at a time with [`NelderMead::propose`], evaluates it, and feeds the
//! score back with [`NelderMead::observe`]. Every proposal is one expensive
//! oracle call, so the state machine below is laid out per evaluation rather
//! than per textbook iteration.

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Standard Nelder-Mead coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub reflection: f64,
    pub expansion: f64,
    pub contraction: f64,
    pub shrink: f64,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self {
            reflection: 1.0,
            expansion: 2.0,
            contraction: 0.5,
            shrink: 0.5,
        }
    }
}

/// Convergence thresholds. Either one being met counts as converged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Largest vertex distance (infinity norm) from the best vertex.
    pub x: f64,
    /// Spread between the best and worst vertex scores.
    pub f: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { x: 1e-9, f: 1e-9 }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    /// Evaluating vertex `next` of the initial simplex.
    Initial { next: usize },
    /// Iteration boundary; the next proposal is a reflection.
    Reflect,
    Expand { reflected: Vec<f64>, reflected_score: f64 },
    ContractOutside { reflected_score: f64 },
    ContractInside,
    /// Re-evaluating vertex `next` after shrinking toward the best.
    Shrink { next: usize },
}

#[derive(Debug, Clone)]
pub struct NelderMead {
    vertices: Vec<Vec<f64>>,
    scores: Vec<f64>,
    phase: Phase,
    pending: Option<Vec<f64>>,
    coefficients: Coefficients,
    tolerance: Tolerance,
    iterations: usize,
}

impl NelderMead {
    /// Build the initial simplex around `start`: the start point plus one
    /// vertex per axis displaced by `step`. A displacement that would leave
    /// the unit cube is taken in the opposite direction instead.
    pub fn new(start: Vec<f64>, step: f64, tolerance: Tolerance) -> Self {
        let n = start.len();
        let mut vertices = Vec::with_capacity(n + 1);
        vertices.push(start.clone());
        for k in 0..n {
            let mut vertex = start.clone();
            vertex[k] = if start[k] + step <= 1.0 {
                start[k] + step
            } else {
                start[k] - step
            };
            vertices.push(vertex);
        }

        Self {
            scores: vec![f64::NAN; n + 1],
            vertices,
            phase: Phase::Initial { next: 0 },
            pending: None,
            coefficients: Coefficients::default(),
            tolerance,
            iterations: 0,
        }
    }

    pub fn with_coefficients(mut self, coefficients: Coefficients) -> Self {
        self.coefficients = coefficients;
        self
    }

    pub fn dimension(&self) -> usize {
        self.vertices.len() - 1
    }

    /// Completed simplex iterations (not evaluations).
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// The next point to evaluate. Repeated calls without an intervening
    /// [`observe`](Self::observe) return the same point.
    pub fn propose(&mut self) -> Vec<f64> {
        if let Some(point) = &self.pending {
            return point.clone();
        }

        if self.phase == Phase::Reflect {
            self.order();
        }

        let n = self.dimension();
        let point = match &self.phase {
            Phase::Initial { next } => self.vertices[*next].clone(),
            Phase::Reflect => {
                let a = self.coefficients.reflection;
                self.along_worst(1.0 + a, -a)
            }
            Phase::Expand { .. } => {
                let rc = self.coefficients.reflection * self.coefficients.expansion;
                self.along_worst(1.0 + rc, -rc)
            }
            Phase::ContractOutside { .. } => {
                let rc = self.coefficients.reflection * self.coefficients.contraction;
                self.along_worst(1.0 + rc, -rc)
            }
            Phase::ContractInside => {
                let c = self.coefficients.contraction;
                self.along_worst(1.0 - c, c)
            }
            Phase::Shrink { next } => {
                let sigma = self.coefficients.shrink;
                let best = &self.vertices[0];
                best.iter()
                    .zip(&self.vertices[*next])
                    .map(|(b, v)| b + sigma * (v - b))
                    .collect()
            }
        };
        debug_assert_eq!(point.len(), n);

        self.pending = Some(point.clone());
        point
    }

    /// Feed back the score of the most recent proposal.
    pub fn observe(&mut self, score: f64) {
        let Some(point) = self.pending.take() else {
            warn!("Simplex received a score without a pending proposal; ignoring");
            return;
        };
        let n = self.dimension();
        let phase = std::mem::replace(&mut self.phase, Phase::Reflect);

        self.phase = match phase {
            Phase::Initial { next } => {
                self.scores[next] = score;
                if next == n {
                    Phase::Reflect
                } else {
                    Phase::Initial { next: next + 1 }
                }
            }
            Phase::Reflect => {
                let best = self.scores[0];
                let second_worst = self.scores[n.saturating_sub(1)];
                let worst = self.scores[n];
                if score < best {
                    Phase::Expand {
                        reflected: point,
                        reflected_score: score,
                    }
                } else if score < second_worst {
                    trace!("simplex: reflect");
                    self.replace_worst(point, score);
                    self.end_iteration()
                } else if score < worst {
                    Phase::ContractOutside {
                        reflected_score: score,
                    }
                } else {
                    Phase::ContractInside
                }
            }
            Phase::Expand {
                reflected,
                reflected_score,
            } => {
                if score < reflected_score {
                    trace!("simplex: expand");
                    self.replace_worst(point, score);
                } else {
                    trace!("simplex: reflect after failed expansion");
                    self.replace_worst(reflected, reflected_score);
                }
                self.end_iteration()
            }
            Phase::ContractOutside { reflected_score } => {
                if score <= reflected_score {
                    trace!("simplex: outside contraction");
                    self.replace_worst(point, score);
                    self.end_iteration()
                } else {
                    Phase::Shrink { next: 1 }
                }
            }
            Phase::ContractInside => {
                if score < self.scores[n] {
                    trace!("simplex: inside contraction");
                    self.replace_worst(point, score);
                    self.end_iteration()
                } else {
                    Phase::Shrink { next: 1 }
                }
            }
            Phase::Shrink { next } => {
                self.vertices[next] = point;
                self.scores[next] = score;
                if next == n {
                    trace!("simplex: shrink");
                    self.end_iteration()
                } else {
                    Phase::Shrink { next: next + 1 }
                }
            }
        };
    }

    /// True at an iteration boundary once the simplex has collapsed in
    /// either objective spread or vertex spread.
    pub fn has_converged(&self) -> bool {
        if self.phase != Phase::Reflect || self.pending.is_some() {
            return false;
        }
        self.score_spread() <= self.tolerance.f || self.size() <= self.tolerance.x
    }

    /// Best evaluated vertex and its score.
    pub fn best(&self) -> Option<(&[f64], f64)> {
        self.vertices
            .iter()
            .zip(&self.scores)
            .filter(|(_, s)| !s.is_nan())
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(v, s)| (v.as_slice(), *s))
    }

    /// Spread between the best and worst evaluated vertex scores.
    pub fn score_spread(&self) -> f64 {
        let evaluated = self.scores.iter().filter(|s| !s.is_nan());
        let (lo, hi) = evaluated.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
            (lo.min(s), hi.max(s))
        });
        if lo > hi {
            f64::INFINITY
        } else {
            hi - lo
        }
    }

    /// Largest infinity-norm distance of any vertex from the best vertex.
    pub fn size(&self) -> f64 {
        let Some((best, _)) = self.best() else {
            return f64::INFINITY;
        };
        self.vertices
            .iter()
            .flat_map(|v| v.iter().zip(best).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max)
    }

    fn order(&mut self) {
        let mut idx: Vec<usize> = (0..self.vertices.len()).collect();
        idx.sort_by(|&a, &b| self.scores[a].total_cmp(&self.scores[b]));
        self.vertices = idx.iter().map(|&i| self.vertices[i].clone()).collect();
        self.scores = idx.iter().map(|&i| self.scores[i]).collect();
    }

    /// `a * centroid + b * worst`, with the centroid taken over every vertex
    /// but the worst. Assumes the simplex is ordered.
    fn along_worst(&self, a: f64, b: f64) -> Vec<f64> {
        let n = self.dimension();
        let mut centroid = vec![0.0; n];
        for vertex in &self.vertices[..n] {
            for (c, v) in centroid.iter_mut().zip(vertex) {
                *c += v / n as f64;
            }
        }
        centroid
            .iter()
            .zip(&self.vertices[n])
            .map(|(c, w)| a * c + b * w)
            .collect()
    }

    fn replace_worst(&mut self, point: Vec<f64>, score: f64) {
        let n = self.dimension();
        self.vertices[n] = point;
        self.scores[n] = score;
    }

    fn end_iteration(&mut self) -> Phase {
        self.iterations += 1;
        Phase::Reflect
    }
}
