//! In-memory registry of analysis runs.
//!
//! Every run gets its own [`RunCoordinator`]; the `active` table allows one
//! run per session, so a busy session never blocks another. Run snapshots are
//! read from the coordinator's `watch` channel.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use markpanel_core::model::{CaseInput, RunState};
use markpanel_core::new_ulid;
use markpanel_core::validation::analysis_prompt;
use markpanel_llm::{ProviderAdapter, RunCoordinator, Schedule, Synthesizer};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_SESSION: &str = "default";
/// Finished runs kept for reads; older ones are dropped first.
const MAX_RETAINED_RUNS: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("session {session} already has an active run")]
    Busy { session: String, run_id: String },
    #[error("run {0} not found")]
    NotFound(String),
    #[error("run {0} is still in progress")]
    NotFinished(String),
}

struct RunEntry {
    session: String,
    input: CaseInput,
    progress: watch::Receiver<RunState>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Tables {
    /// Keyed by ULID, so iteration is oldest first.
    runs: BTreeMap<String, RunEntry>,
    /// Session -> id of its active run. Entries leave when the run is done.
    active: HashMap<String, String>,
}

pub struct RunRegistry {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    synthesizer: Arc<dyn Synthesizer>,
    schedule: Schedule,
    tables: Arc<Mutex<Tables>>,
}

impl RunRegistry {
    pub fn new(
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        synthesizer: Arc<dyn Synthesizer>,
        schedule: Schedule,
    ) -> Self {
        Self {
            adapters,
            synthesizer,
            schedule,
            tables: Arc::new(Mutex::new(Tables::default())),
        }
    }

    /// Starts a run in the background and returns its id.
    pub fn start(&self, session: Option<&str>, input: CaseInput) -> Result<String, RunError> {
        let session = session
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SESSION)
            .to_string();

        let mut tables = lock(&self.tables);
        if let Some(active) = tables.active.get(&session) {
            return Err(RunError::Busy {
                session,
                run_id: active.clone(),
            });
        }

        let coordinator = RunCoordinator::new(
            self.adapters.clone(),
            Arc::clone(&self.synthesizer),
            self.schedule,
        );
        let run_id = new_ulid().to_string();
        let (tx, rx) = watch::channel(RunState::idle(run_id.clone()));
        let cancel = CancellationToken::new();
        let case_text = analysis_prompt(&input);

        tables.active.insert(session.clone(), run_id.clone());
        tables.runs.insert(
            run_id.clone(),
            RunEntry {
                session: session.clone(),
                input,
                progress: rx,
                cancel: cancel.clone(),
            },
        );
        prune(&mut tables);
        drop(tables);

        tracing::info!(%run_id, %session, "run accepted");
        let shared = Arc::clone(&self.tables);
        let id = run_id.clone();
        tokio::spawn(async move {
            // A fresh coordinator is never busy.
            coordinator.run(&id, &case_text, &tx, &cancel).await;
            let mut tables = lock(&shared);
            if tables.active.get(&session) == Some(&id) {
                tables.active.remove(&session);
            }
        });

        Ok(run_id)
    }

    /// Input and latest snapshot of a run.
    pub fn get(&self, run_id: &str) -> Result<(CaseInput, RunState), RunError> {
        let tables = lock(&self.tables);
        let entry = tables
            .runs
            .get(run_id)
            .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
        let state = entry.progress.borrow().clone();
        Ok((entry.input.clone(), state))
    }

    /// Like [`RunRegistry::get`], but only for runs that reached `Done`.
    pub fn finished(&self, run_id: &str) -> Result<(CaseInput, RunState), RunError> {
        let (input, state) = self.get(run_id)?;
        if !state.is_done() {
            return Err(RunError::NotFinished(run_id.to_string()));
        }
        Ok((input, state))
    }

    /// Requests cancellation; the run still reaches `Done`.
    pub fn cancel(&self, run_id: &str) -> Result<(CaseInput, RunState), RunError> {
        {
            let tables = lock(&self.tables);
            let entry = tables
                .runs
                .get(run_id)
                .ok_or_else(|| RunError::NotFound(run_id.to_string()))?;
            tracing::info!(%run_id, session = %entry.session, "run cancellation requested");
            entry.cancel.cancel();
        }
        self.get(run_id)
    }

    /// Cancels every active run, used on shutdown.
    pub fn cancel_all(&self) {
        let tables = lock(&self.tables);
        for id in tables.active.values() {
            if let Some(entry) = tables.runs.get(id) {
                entry.cancel.cancel();
            }
        }
    }
}

fn lock(tables: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn prune(tables: &mut Tables) {
    while tables.runs.len() > MAX_RETAINED_RUNS {
        let oldest_done = tables
            .runs
            .iter()
            .find(|(_, e)| e.progress.borrow().is_done())
            .map(|(id, _)| id.clone());
        match oldest_done {
            Some(id) => {
                tables.runs.remove(&id);
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use markpanel_core::model::{AnalysisResult, ChatMessage, Provider};
    use markpanel_llm::{Completion, ProviderError};
    use tokio::sync::mpsc;

    use super::*;

    struct Instant(Provider);

    #[async_trait]
    impl ProviderAdapter for Instant {
        fn provider(&self) -> Provider {
            self.0
        }

        fn streams(&self) -> bool {
            false
        }

        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _fragments: Option<mpsc::Sender<String>>,
            _cancel: &CancellationToken,
        ) -> Result<Completion, ProviderError> {
            Ok(Completion::Text("Ja.".into()))
        }
    }

    struct Echo;

    #[async_trait]
    impl Synthesizer for Echo {
        async fn synthesize(&self, results: &[AnalysisResult]) -> Result<String, ProviderError> {
            Ok(format!("{} Berichte", results.len()))
        }
    }

    fn registry() -> RunRegistry {
        let adapters: Vec<Arc<dyn ProviderAdapter>> = Provider::ALL
            .into_iter()
            .map(|p| Arc::new(Instant(p)) as Arc<dyn ProviderAdapter>)
            .collect();
        RunRegistry::new(adapters, Arc::new(Echo), Schedule::Concurrent)
    }

    fn input() -> CaseInput {
        CaseInput {
            auftragsmarke: "ACME".into(),
            gegenmarke: "AKME".into(),
        }
    }

    async fn wait_done(reg: &RunRegistry, run_id: &str) -> RunState {
        for _ in 0..500 {
            let (_, state) = reg.get(run_id).unwrap();
            if state.is_done() {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("run {run_id} did not finish");
    }

    async fn wait_idle(reg: &RunRegistry) {
        for _ in 0..500 {
            if lock(&reg.tables).active.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("sessions still active");
    }

    #[tokio::test]
    async fn many_sessions_leave_bounded_state() {
        let reg = registry();
        let sessions = MAX_RETAINED_RUNS + 44;
        for i in 0..sessions {
            let id = reg.start(Some(&format!("s{i}")), input()).unwrap();
            let state = wait_done(&reg, &id).await;
            assert_eq!(state.results.len(), 4);
        }
        wait_idle(&reg).await;

        let tables = lock(&reg.tables);
        assert!(tables.active.is_empty());
        assert_eq!(tables.runs.len(), MAX_RETAINED_RUNS);
    }

    #[tokio::test]
    async fn session_is_busy_until_its_run_is_done() {
        let reg = registry();
        let first = reg.start(None, input()).unwrap();
        assert_eq!(
            reg.start(Some(" "), input()),
            Err(RunError::Busy {
                session: DEFAULT_SESSION.to_string(),
                run_id: first.clone(),
            })
        );
        assert!(reg.start(Some("other"), input()).is_ok());

        let state = wait_done(&reg, &first).await;
        assert_eq!(
            state.final_output.map(|f| f.rendered()).as_deref(),
            Some("4 Berichte")
        );
        wait_idle(&reg).await;
        assert!(reg.start(None, input()).is_ok());
    }

    #[tokio::test]
    async fn unknown_and_unfinished_runs_are_reported() {
        let reg = registry();
        assert_eq!(
            reg.get("nope").unwrap_err(),
            RunError::NotFound("nope".into())
        );
        let id = reg.start(None, input()).unwrap();
        if let Err(err) = reg.finished(&id) {
            assert_eq!(err, RunError::NotFinished(id.clone()));
        }
        wait_done(&reg, &id).await;
        assert!(reg.finished(&id).is_ok());
    }
}
