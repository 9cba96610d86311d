//! Request and response bodies of the daemon HTTP API.

use serde::{Deserialize, Serialize};

use crate::documents::OppositionEmail;
use crate::model::{AnalysisResult, Case, CaseInput, ChatMessage, RunState};

/// Case creation response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaseCreated {
    /// Internal id.
    pub case_id: String,
    /// Public case number.
    pub case_number: String,
    /// Link to the case page.
    pub case_url: String,
}

/// Case lookup response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResponse {
    /// The stored case.
    pub case: Case,
}

/// Query of `GET /cases`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseQuery {
    /// Required; absent yields 400.
    pub case_number: Option<String>,
}

/// Opposition preparation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareOppositionRequest {
    /// Case to prepare.
    #[serde(default)]
    pub case_id: Option<String>,
    /// Where the client is notified.
    #[serde(default)]
    pub client_email: String,
    /// Client name used in the email.
    #[serde(default)]
    pub client_name: String,
}

/// Opposition preparation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareOppositionResponse {
    /// Always true on 200.
    pub success: bool,
    /// Case after the update.
    pub case: Case,
    /// Draft notification for the client.
    pub email_content: OppositionEmail,
    /// Link to the case page.
    pub case_url: String,
}

/// Marks an opposition as sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OppositionSentRequest {
    /// Case to update.
    #[serde(default)]
    pub case_id: Option<String>,
}

/// Body of `POST /providers/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Conversation so far, oldest first.
    pub messages: Vec<ChatMessage>,
}

/// Whole-body provider reply, also one chunk of a streamed reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentResponse {
    /// Reply text or fragment.
    pub content: String,
}

/// Body returned with HTTP 429.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaResponse {
    /// Short headline.
    pub error: String,
    /// Vendor detail, e.g. when to retry.
    pub details: String,
    /// What the panel does instead.
    pub fallback: String,
}

/// Body of `POST /analysis/final`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnalysisRequest {
    /// Provider reports to combine; must not be empty.
    pub reports: Vec<AnalysisResult>,
}

/// Starts a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRunRequest {
    /// Caller session; one active run per session.
    #[serde(default)]
    pub session: Option<String>,
    /// Marks to analyse.
    pub input: CaseInput,
}

/// Accepted run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRunResponse {
    /// Id to poll with `GET /runs/{id}`.
    pub run_id: String,
}

/// Run snapshot plus the input it was started with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    /// Marks the run was started with.
    pub input: CaseInput,
    /// Latest snapshot.
    pub state: RunState,
}

/// Persists a finished run as a case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseFromRunRequest {
    /// Stored as [`Case::recommendation`].
    #[serde(default)]
    pub recommendation: Option<String>,
    /// Stored as [`Case::confidence_level`].
    #[serde(default)]
    pub confidence_level: Option<u8>,
}

/// Error body for every non-2xx reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: String,
    /// Root cause or conflicting run id.
    #[serde(default)]
    pub details: Option<String>,
}
