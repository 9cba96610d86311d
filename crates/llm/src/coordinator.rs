//! Drives one analysis run across all providers.
//!
//! The coordinator is the only writer of a [`RunState`]. Every change is
//! published as a full snapshot on a `watch` channel; readers never see a
//! half-updated state.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use markpanel_core::model::{
    AnalysisOutcome, AnalysisResult, FinalOutput, Provider, RunState, RunStep,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::provider::ProviderAdapter;
use crate::synthesis::Synthesizer;

/// Order in which providers are called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// One after another in provider order.
    Sequential,
    /// All at once; results land in completion order.
    #[default]
    Concurrent,
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Schedule::Sequential => "sequential",
            Schedule::Concurrent => "concurrent",
        })
    }
}

impl FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Schedule::Sequential),
            "concurrent" => Ok(Schedule::Concurrent),
            other => Err(format!(
                "unknown schedule {other:?} (expected sequential or concurrent)"
            )),
        }
    }
}

pub struct RunCoordinator {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    synthesizer: Arc<dyn Synthesizer>,
    schedule: Schedule,
    active: Mutex<()>,
}

impl RunCoordinator {
    /// Adapters are called in the order given; callers pass them in provider order.
    pub fn new(
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        synthesizer: Arc<dyn Synthesizer>,
        schedule: Schedule,
    ) -> Self {
        Self {
            adapters,
            synthesizer,
            schedule,
            active: Mutex::new(()),
        }
    }

    /// True while a run is in flight.
    pub fn is_busy(&self) -> bool {
        self.active.try_lock().is_err()
    }

    /// Runs every provider on `case_text`, then synthesizes if any succeeded.
    ///
    /// Returns `None` without touching `progress` when another run is
    /// already in flight on this coordinator. Otherwise the returned state
    /// is always `Done`.
    pub async fn run(
        &self,
        run_id: &str,
        case_text: &str,
        progress: &watch::Sender<RunState>,
        cancel: &CancellationToken,
    ) -> Option<RunState> {
        let Ok(_guard) = self.active.try_lock() else {
            tracing::warn!(run_id, "run already in progress, ignoring start");
            return None;
        };

        let mut state = RunState::idle(run_id);
        state.pending = self.adapters.iter().map(|a| a.provider()).collect();
        progress.send_replace(state.clone());
        tracing::info!(run_id, schedule = %self.schedule, "run started");

        match self.schedule {
            Schedule::Sequential => {
                for adapter in &self.adapters {
                    let provider = adapter.provider();
                    state.step = RunStep::Analyzing(provider);
                    progress.send_replace(state.clone());

                    let res = adapter.invoke(case_text, cancel).await;
                    record(&mut state, provider, res);
                    progress.send_replace(state.clone());
                }
            }
            Schedule::Concurrent => {
                state.step = RunStep::FanOut;
                progress.send_replace(state.clone());

                let mut calls: FuturesUnordered<_> = self
                    .adapters
                    .iter()
                    .map(|adapter| async move {
                        (adapter.provider(), adapter.invoke(case_text, cancel).await)
                    })
                    .collect();
                while let Some((provider, res)) = calls.next().await {
                    record(&mut state, provider, res);
                    progress.send_replace(state.clone());
                }
            }
        }

        if state.any_success() && !cancel.is_cancelled() {
            state.step = RunStep::Synthesizing;
            progress.send_replace(state.clone());

            let mut ordered = state.results.clone();
            ordered.sort_by_key(|r| r.provider);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProviderError::Cancelled(Provider::OpenAi)),
                res = self.synthesizer.synthesize(&ordered) => res,
            };
            state.final_output = Some(match outcome {
                Ok(text) => FinalOutput::Synthesized(text),
                Err(err) => {
                    tracing::warn!(run_id, error = %err, "final analysis failed");
                    FinalOutput::Failed(err.to_string())
                }
            });
        } else if !state.any_success() {
            tracing::warn!(run_id, "no provider succeeded, skipping final analysis");
        }

        state.step = RunStep::Done;
        progress.send_replace(state.clone());
        tracing::info!(
            run_id,
            results = state.results.len(),
            errors = state.last_error.as_deref().unwrap_or(""),
            "run finished"
        );
        Some(state)
    }
}

fn record(
    state: &mut RunState,
    provider: Provider,
    res: Result<AnalysisResult, ProviderError>,
) {
    state.pending.retain(|p| *p != provider);
    let result = match res {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(%provider, error = %err, "provider call failed");
            AnalysisResult::failure(provider, &err)
        }
    };
    if matches!(result.outcome, AnalysisOutcome::Failure(_)) {
        state.note_error(provider);
    }
    state.results.push(result);
}
