//! Providers, run state and case records.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::EpochMs;

/// External LLM provider consulted for an opinion.
///
/// Declaration order is the fixed provider order of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Anthropic Claude.
    Anthropic,
    /// DeepSeek chat.
    #[serde(rename = "deepseek")]
    DeepSeek,
    /// Google Gemini.
    Gemini,
    /// OpenAI GPT-4o.
    #[serde(rename = "openai")]
    OpenAi,
}

impl Provider {
    /// All providers in run order.
    pub const ALL: [Provider; 4] = [
        Provider::Anthropic,
        Provider::DeepSeek,
        Provider::Gemini,
        Provider::OpenAi,
    ];

    /// Name used in routes, JSON and logs.
    pub fn wire_name(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::DeepSeek => "deepseek",
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
        }
    }

    /// Human name shown in reports.
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Anthropic => "Claude",
            Provider::DeepSeek => "DeepSeek",
            Provider::Gemini => "Gemini",
            Provider::OpenAi => "GPT-4o",
        }
    }

    /// Parses a wire name.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.wire_name() == name)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Outcome of one provider call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// The provider produced an opinion.
    Success(String),
    /// The provider refused because its quota is exhausted.
    QuotaExceeded(String),
    /// The call failed; the text explains why.
    Failure(String),
}

impl AnalysisOutcome {
    /// True only for a usable opinion.
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Success(_))
    }
}

/// One provider's contribution to a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Provider that answered.
    pub provider: Provider,
    /// What the provider delivered.
    pub outcome: AnalysisOutcome,
    /// When the outcome was recorded.
    pub timestamp_ms: EpochMs,
}

impl AnalysisResult {
    /// Wraps an outcome with the current time.
    pub fn new(provider: Provider, outcome: AnalysisOutcome) -> Self {
        Self {
            provider,
            outcome,
            timestamp_ms: crate::now_ms(),
        }
    }

    /// Failure result for a provider.
    pub fn failure(provider: Provider, message: impl fmt::Display) -> Self {
        Self::new(
            provider,
            AnalysisOutcome::Failure(format!(
                "Fehler bei der {}-Analyse: {message}",
                provider.display_name()
            )),
        )
    }

    /// Text as presented to readers and to the supervising model.
    ///
    /// Non-opinions carry a leading marker so a reader never mistakes a
    /// warning for legal content.
    pub fn rendered(&self) -> String {
        match &self.outcome {
            AnalysisOutcome::Success(t) => t.clone(),
            AnalysisOutcome::QuotaExceeded(t) => format!("⚠️ {t}"),
            AnalysisOutcome::Failure(t) => format!("❌ {t}"),
        }
    }
}

/// Chat message forwarded to a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Author of the message.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Message written by the user.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Author of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// The person asking.
    User,
    /// An earlier model reply.
    Assistant,
}

/// Progress step of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "step", content = "provider", rename_all = "snake_case")]
pub enum RunStep {
    /// Nothing started yet.
    Idle,
    /// Sequential schedule: this provider is being called.
    Analyzing(Provider),
    /// Concurrent schedule: all pending providers are being called.
    FanOut,
    /// The supervisor is combining the reports.
    Synthesizing,
    /// Terminal; every run ends here.
    Done,
}

/// Result slot of the synthesis step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum FinalOutput {
    /// Combined opinion of the supervisor.
    Synthesized(String),
    /// Why the synthesis call failed.
    Failed(String),
}

impl FinalOutput {
    /// Text for display; failures carry the error marker.
    pub fn rendered(&self) -> String {
        match self {
            FinalOutput::Synthesized(t) => t.clone(),
            FinalOutput::Failed(t) => format!("❌ Fehler bei der finalen Analyse: {t}"),
        }
    }
}

/// Snapshot of a run, owned and written by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunState {
    /// Run identifier.
    pub run_id: String,
    /// Current step.
    pub step: RunStep,
    /// Completion order.
    pub results: Vec<AnalysisResult>,
    /// Providers that have not reported yet.
    pub pending: Vec<Provider>,
    /// Set once synthesis ran.
    pub final_output: Option<FinalOutput>,
    /// Comma-joined `"<provider>-Fehler"` tags of failed providers.
    pub last_error: Option<String>,
}

impl RunState {
    /// Fresh state before any provider was called.
    pub fn idle(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            step: RunStep::Idle,
            results: vec![],
            pending: Provider::ALL.to_vec(),
            final_output: None,
            last_error: None,
        }
    }

    /// True once the run reached [`RunStep::Done`].
    pub fn is_done(&self) -> bool {
        self.step == RunStep::Done
    }

    /// True if at least one provider delivered an opinion.
    pub fn any_success(&self) -> bool {
        self.results.iter().any(|r| r.outcome.is_success())
    }

    /// Result of a provider, if it reported.
    pub fn result_for(&self, provider: Provider) -> Option<&AnalysisResult> {
        self.results.iter().find(|r| r.provider == provider)
    }

    /// Appends `"<provider>-Fehler"` to the aggregate error summary.
    pub fn note_error(&mut self, provider: Provider) {
        let tag = format!("{}-Fehler", provider.wire_name());
        self.last_error = Some(match self.last_error.take() {
            Some(prev) => format!("{prev}, {tag}"),
            None => tag,
        });
    }
}

/// The two marks under comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseInput {
    /// The client's mark.
    #[serde(default)]
    pub auftragsmarke: String,
    /// The opposing mark.
    #[serde(default)]
    pub gegenmarke: String,
}

/// Lifecycle of a persisted case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// Stored right after the analysis.
    AnalysisComplete,
    /// Client recorded and deadline set.
    OppositionPrepared,
    /// The opposition went out.
    OppositionSent,
}

/// Persisted case row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Case {
    /// Internal ULID, also the record key.
    pub case_id: String,
    /// Public `MR-...` number, unique.
    pub case_number: String,
    /// Lifecycle state.
    pub status: CaseStatus,

    /// The client's mark.
    pub auftragsmarke: String,
    /// The opposing mark.
    pub gegenmarke: String,

    /// Rendered Claude report.
    pub claude_analysis: Option<String>,
    /// Rendered DeepSeek report.
    pub deepseek_analysis: Option<String>,
    /// Rendered Gemini report.
    pub gemini_analysis: Option<String>,
    /// Rendered GPT-4o report.
    pub openai_analysis: Option<String>,
    /// Supervisor opinion.
    pub final_analysis: Option<String>,

    /// Recommended action, free text.
    pub recommendation: Option<String>,
    /// Confidence in percent.
    pub confidence_level: Option<u8>,

    /// Set when an opposition is prepared.
    pub client_email: Option<String>,
    /// Set when an opposition is prepared.
    pub client_name: Option<String>,
    /// Three calendar months after preparation.
    pub opposition_deadline: Option<NaiveDate>,

    /// When the analysis ran.
    pub analysis_date_ms: EpochMs,
    /// Row creation time.
    pub created_ms: EpochMs,
    /// Last update time.
    pub updated_ms: EpochMs,
}

/// Write-once content of a new case.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewCase {
    /// The two marks.
    #[serde(flatten)]
    pub input: CaseInput,
    /// See [`Case::claude_analysis`].
    #[serde(default)]
    pub claude_analysis: Option<String>,
    /// See [`Case::deepseek_analysis`].
    #[serde(default)]
    pub deepseek_analysis: Option<String>,
    /// See [`Case::gemini_analysis`].
    #[serde(default)]
    pub gemini_analysis: Option<String>,
    /// See [`Case::openai_analysis`].
    #[serde(default)]
    pub openai_analysis: Option<String>,
    /// See [`Case::final_analysis`].
    #[serde(default)]
    pub final_analysis: Option<String>,
    /// See [`Case::recommendation`].
    #[serde(default)]
    pub recommendation: Option<String>,
    /// See [`Case::confidence_level`].
    #[serde(default)]
    pub confidence_level: Option<u8>,
}

impl NewCase {
    /// Builds the case bundle from a finished run.
    pub fn from_run(input: CaseInput, run: &RunState) -> Self {
        let text = |p: Provider| run.result_for(p).map(AnalysisResult::rendered);
        Self {
            input,
            claude_analysis: text(Provider::Anthropic),
            deepseek_analysis: text(Provider::DeepSeek),
            gemini_analysis: text(Provider::Gemini),
            openai_analysis: text(Provider::OpenAi),
            final_analysis: run.final_output.as_ref().map(FinalOutput::rendered),
            recommendation: None,
            confidence_level: None,
        }
    }
}
