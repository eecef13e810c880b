//! Latency probing and best-server selection

use crate::client::Transport;
use crate::context::RunContext;
use crate::defaults::{FAILED_PROBE_PENALTY_MS, PROBE_TRIALS};
use crate::error::{AppError, Result};
use crate::logging::MeasurementLogger;
use crate::models::Server;
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::Instant;

/// Probe results for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub server: Server,
    /// Mean of all trials, failed trials counted at the penalty value
    pub latency_ms: f64,
    pub failed_trials: usize,
    pub trials: usize,
}

impl ProbeOutcome {
    pub fn all_failed(&self) -> bool {
        self.failed_trials >= self.trials
    }
}

/// Ranks candidates by measured latency
pub struct ServerProber {
    transport: Arc<dyn Transport>,
    logger: MeasurementLogger,
    trials: usize,
}

impl ServerProber {
    pub fn new(transport: Arc<dyn Transport>, logger: MeasurementLogger) -> Self {
        Self {
            transport,
            logger,
            trials: PROBE_TRIALS,
        }
    }

    /// Probe every candidate concurrently and return the fastest one with its
    /// latency recorded
    pub async fn select_best_server(&self, ctx: &RunContext, servers: &[Server]) -> Result<Server> {
        if servers.is_empty() {
            return Err(AppError::no_best_server("no candidate servers to probe"));
        }

        let outcomes = join_all(servers.iter().map(|server| self.probe_server(ctx, server))).await;

        if ctx.is_cancelled() {
            return Err(AppError::timeout("server selection deadline exceeded"));
        }
        pick_best(outcomes)
    }

    /// Sequential timed trials against the server's latency endpoint
    pub async fn probe_server(&self, ctx: &RunContext, server: &Server) -> ProbeOutcome {
        let url = server.latency_url();
        let mut total_ms = 0.0;
        let mut failed_trials = 0;

        for trial in 1..=self.trials {
            let started = Instant::now();
            let failure = match ctx.run(self.transport.probe(&url)).await {
                Ok(200) => None,
                Ok(status) => Some(format!("HTTP {}", status)),
                Err(e) => Some(e.to_string()),
            };

            match failure {
                None => total_ms += started.elapsed().as_secs_f64() * 1000.0,
                Some(reason) => {
                    total_ms += FAILED_PROBE_PENALTY_MS;
                    failed_trials += 1;
                    self.logger.log_probe_failure(server.id, trial, &reason).await;
                }
            }
        }

        let latency_ms = total_ms / self.trials.max(1) as f64;
        self.logger.log_probe_result(server.id, latency_ms, failed_trials).await;

        ProbeOutcome {
            server: server.clone(),
            latency_ms,
            failed_trials,
            trials: self.trials,
        }
    }
}

/// Minimum average latency wins; ties go to the nearer server, then to the
/// earlier candidate. Candidates whose every trial failed are never picked.
pub fn pick_best(outcomes: Vec<ProbeOutcome>) -> Result<Server> {
    if outcomes.is_empty() {
        return Err(AppError::no_best_server("no candidate servers to probe"));
    }

    outcomes
        .into_iter()
        .filter(|outcome| !outcome.all_failed())
        .min_by(|a, b| {
            a.latency_ms
                .total_cmp(&b.latency_ms)
                .then(a.server.distance.total_cmp(&b.server.distance))
        })
        .map(|best| best.server.with_latency(best.latency_ms))
        .ok_or_else(|| AppError::no_best_server("every latency probe failed"))
}
