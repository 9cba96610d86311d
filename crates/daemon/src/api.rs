use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use markpanel_core::api::{
    CaseCreated, CaseFromRunRequest, CaseQuery, CaseResponse, ContentResponse, ErrorResponse,
    FinalAnalysisRequest, OppositionSentRequest, PrepareOppositionRequest,
    PrepareOppositionResponse, ProviderRequest, QuotaResponse, RunResponse, StartRunRequest,
    StartRunResponse,
};
use markpanel_core::documents::{case_url, opposition_email, opposition_letter};
use markpanel_core::model::{Case, NewCase, Provider};
use markpanel_core::validation::{
    validate_case_input, validate_case_text, validate_client_contact, CaseInputError,
};
use markpanel_llm::{
    build_http_client, Completion, HttpProvider, ProviderAdapter, ProviderError,
    SupervisorSynthesizer, Synthesizer,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::config::DaemonConfig;
use crate::db::{Db, StoreError};
use crate::runs::{RunError, RunRegistry};

/// Buffered fragments between a provider call and a streaming response.
const FRAGMENT_BUFFER: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<DaemonConfig>,
    pub runs: Arc<RunRegistry>,
    adapters: Arc<Vec<Arc<dyn ProviderAdapter>>>,
    synthesizer: Arc<dyn Synthesizer>,
}

impl AppState {
    /// Wires HTTP adapters for every provider from the configuration.
    pub fn from_config(db: Db, config: DaemonConfig) -> anyhow::Result<Self> {
        let client = build_http_client(config.call_timeout).context("building http client")?;
        let adapters: Vec<Arc<dyn ProviderAdapter>> = Provider::ALL
            .into_iter()
            .map(|p| {
                let settings = config.provider_settings(p);
                if settings.api_key.is_none() {
                    tracing::warn!(provider = %p, "no API key configured, calls will fail");
                }
                Arc::new(HttpProvider::new(p, settings, client.clone())) as Arc<dyn ProviderAdapter>
            })
            .collect();
        let synthesizer = Arc::new(SupervisorSynthesizer::new(
            config.provider_settings(Provider::OpenAi),
            client,
        ));
        Ok(Self::new(db, config, adapters, synthesizer))
    }

    pub fn new(
        db: Db,
        config: DaemonConfig,
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        let runs = RunRegistry::new(adapters.clone(), Arc::clone(&synthesizer), config.schedule);
        Self {
            db,
            config: Arc::new(config),
            runs: Arc::new(runs),
            adapters: Arc::new(adapters),
            synthesizer,
        }
    }

    fn adapter(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.provider() == provider)
            .cloned()
    }

    fn case_url(&self, case: &Case) -> String {
        case_url(&self.config.public_base_url, &case.case_number)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/cases", post(create_case).get(get_case))
        .route("/cases/{case_number}/letter", get(case_letter))
        .route("/opposition/prepare", post(prepare_opposition))
        .route("/opposition/sent", post(opposition_sent))
        .route("/providers/{name}", post(provider_proxy))
        .route("/analysis/final", post(final_analysis))
        .route("/runs", post(start_run))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/cancel", post(cancel_run))
        .route("/runs/{id}/case", post(case_from_run))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn create_case(
    State(st): State<AppState>,
    Json(new): Json<NewCase>,
) -> Result<Json<CaseCreated>, AppError> {
    validate_case_input(&new.input)?;
    let case = st
        .db
        .create_case(new, Utc::now())
        .await
        .context("failed to create case")?;
    Ok(Json(CaseCreated {
        case_url: st.case_url(&case),
        case_id: case.case_id,
        case_number: case.case_number,
    }))
}

async fn get_case(
    State(st): State<AppState>,
    Query(q): Query<CaseQuery>,
) -> Result<Json<CaseResponse>, AppError> {
    let number = required(q.case_number.as_deref(), "case_number")?;
    Ok(Json(CaseResponse {
        case: find_case_by_number(&st, number).await?,
    }))
}

async fn case_letter(
    State(st): State<AppState>,
    Path(case_number): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let case = find_case_by_number(&st, &case_number).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        opposition_letter(&case),
    ))
}

async fn prepare_opposition(
    State(st): State<AppState>,
    Json(req): Json<PrepareOppositionRequest>,
) -> Result<Json<PrepareOppositionResponse>, AppError> {
    let case_id = required(req.case_id.as_deref(), "caseId")?;
    st.db
        .get_case(case_id)
        .await
        .context("failed to load case")?
        .ok_or_else(|| AppError::NotFound(format!("case {case_id} not found")))?;
    validate_client_contact(&req.client_email, &req.client_name)?;

    let case = st
        .db
        .prepare_opposition(
            case_id,
            &req.client_email,
            &req.client_name,
            Utc::now().date_naive(),
        )
        .await
        .context("failed to prepare opposition")?;
    let url = st.case_url(&case);
    tracing::info!(case_number = %case.case_number, deadline = ?case.opposition_deadline, "opposition prepared");
    Ok(Json(PrepareOppositionResponse {
        success: true,
        email_content: opposition_email(&case, &url),
        case_url: url,
        case,
    }))
}

async fn opposition_sent(
    State(st): State<AppState>,
    Json(req): Json<OppositionSentRequest>,
) -> Result<Json<CaseResponse>, AppError> {
    let case_id = required(req.case_id.as_deref(), "caseId")?;
    let case = st
        .db
        .mark_opposition_sent(case_id)
        .await
        .context("failed to update case")?;
    Ok(Json(CaseResponse { case }))
}

/// Forwards a conversation to one provider.
///
/// Streaming providers answer with `data: {"content": ...}` records as soon
/// as the first fragment arrives; the others with one JSON body. A streaming
/// call that ends before its first fragment is answered like a whole body.
async fn provider_proxy(
    State(st): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ProviderRequest>,
) -> Result<Response, AppError> {
    let provider = Provider::from_wire_name(&name)
        .ok_or_else(|| AppError::NotFound(format!("unknown provider {name}")))?;
    let adapter = st
        .adapter(provider)
        .ok_or_else(|| AppError::NotFound(format!("provider {name} is not registered")))?;
    let text: String = req.messages.iter().map(|m| m.content.as_str()).collect();
    validate_case_text(&text)?;

    let cancel = CancellationToken::new();
    if !adapter.streams() {
        return completion_response(adapter.complete(&req.messages, None, &cancel).await);
    }

    let (tx, mut rx) = mpsc::channel::<String>(FRAGMENT_BUFFER);
    let mut call = tokio::spawn({
        let cancel = cancel.clone();
        async move { adapter.complete(&req.messages, Some(tx), &cancel).await }
    });

    let first = tokio::select! {
        biased;
        fragment = rx.recv() => FirstEvent::Fragment(fragment),
        res = &mut call => FirstEvent::Finished(res),
    };

    match first {
        FirstEvent::Fragment(Some(fragment)) => {
            tokio::spawn(async move {
                match call.await {
                    Ok(Err(err)) => tracing::warn!(%provider, error = %err, "stream ended with error"),
                    Err(err) => tracing::error!(%provider, error = %err, "provider task failed"),
                    Ok(Ok(_)) => {}
                }
            });
            Ok(stream_fragments(fragment, rx, cancel))
        }
        FirstEvent::Fragment(None) => {
            completion_response(call.await.context("provider task failed")?)
        }
        FirstEvent::Finished(res) => completion_response(res.context("provider task failed")?),
    }
}

enum FirstEvent {
    Fragment(Option<String>),
    Finished(Result<Result<Completion, ProviderError>, tokio::task::JoinError>),
}

fn stream_fragments(
    first: String,
    rest: mpsc::Receiver<String>,
    cancel: CancellationToken,
) -> Response {
    // Dropping the body (client gone) cancels the upstream call.
    let guard = cancel.drop_guard();
    let records = stream::once(async move { first })
        .chain(ReceiverStream::new(rest))
        .map(move |fragment| {
            let _guard = &guard;
            let record = serde_json::json!({ "content": fragment });
            Ok::<_, Infallible>(format!("data: {record}\n\n"))
        })
        .chain(stream::once(async { Ok("data: [DONE]\n\n".to_string()) }));

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(records),
    )
        .into_response()
}

fn completion_response(res: Result<Completion, ProviderError>) -> Result<Response, AppError> {
    match res? {
        Completion::Text(content) => Ok(Json(ContentResponse { content }).into_response()),
        Completion::Quota(notice) => Ok((
            StatusCode::TOO_MANY_REQUESTS,
            Json(QuotaResponse {
                error: notice.error,
                details: notice.details,
                fallback: notice.fallback,
            }),
        )
            .into_response()),
    }
}

async fn final_analysis(
    State(st): State<AppState>,
    Json(req): Json<FinalAnalysisRequest>,
) -> Result<Json<ContentResponse>, AppError> {
    if req.reports.is_empty() {
        return Err(AppError::BadRequest("reports must not be empty".into()));
    }
    let content = st
        .synthesizer
        .synthesize(&req.reports)
        .await
        .context("final analysis failed")?;
    Ok(Json(ContentResponse { content }))
}

async fn start_run(
    State(st): State<AppState>,
    Json(req): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<StartRunResponse>), AppError> {
    validate_case_input(&req.input)?;
    let run_id = st.runs.start(req.session.as_deref(), req.input)?;
    Ok((StatusCode::ACCEPTED, Json(StartRunResponse { run_id })))
}

async fn get_run(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, AppError> {
    let (input, state) = st.runs.get(&id)?;
    Ok(Json(RunResponse { input, state }))
}

async fn cancel_run(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, AppError> {
    let (input, state) = st.runs.cancel(&id)?;
    Ok(Json(RunResponse { input, state }))
}

async fn case_from_run(
    State(st): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CaseFromRunRequest>,
) -> Result<Json<CaseCreated>, AppError> {
    let (input, state) = st.runs.finished(&id)?;
    let mut new = NewCase::from_run(input, &state);
    new.recommendation = req.recommendation;
    new.confidence_level = req.confidence_level;

    let case = st
        .db
        .create_case(new, Utc::now())
        .await
        .context("failed to create case")?;
    Ok(Json(CaseCreated {
        case_url: st.case_url(&case),
        case_id: case.case_id,
        case_number: case.case_number,
    }))
}

async fn find_case_by_number(st: &AppState, number: &str) -> Result<Case, AppError> {
    st.db
        .get_case_by_number(number)
        .await
        .context("failed to load case")?
        .ok_or_else(|| AppError::NotFound(format!("case {number} not found")))
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, CaseInputError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(CaseInputError::MissingField(field))
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict { message: String, details: String },
    Internal(anyhow::Error),
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(value: E) -> Self {
        let err: anyhow::Error = value.into();
        if let Some(input) = err.downcast_ref::<CaseInputError>() {
            return AppError::BadRequest(input.to_string());
        }
        if let Some(StoreError::NotFound(id)) = err.downcast_ref::<StoreError>() {
            return AppError::NotFound(format!("case {id} not found"));
        }
        if let Some(run) = err.downcast_ref::<RunError>() {
            return match run {
                RunError::NotFound(_) => AppError::NotFound(run.to_string()),
                RunError::Busy { run_id, .. } => AppError::Conflict {
                    message: run.to_string(),
                    details: run_id.clone(),
                },
                RunError::NotFinished(id) => AppError::Conflict {
                    message: run.to_string(),
                    details: id.clone(),
                },
            };
        }
        AppError::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(error) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse { error, details: None },
            ),
            AppError::NotFound(error) => (
                StatusCode::NOT_FOUND,
                ErrorResponse { error, details: None },
            ),
            AppError::Conflict { message, details } => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error: message,
                    details: Some(details),
                },
            ),
            AppError::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "request failed");
                let details = err.root_cause().to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: err.to_string(),
                        details: Some(details),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
