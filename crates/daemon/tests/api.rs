use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use markpanel_core::api::{
    CaseCreated, CaseResponse, ContentResponse, ErrorResponse, PrepareOppositionResponse,
    RunResponse, StartRunResponse,
};
use markpanel_core::case_number;
use markpanel_core::deadline::opposition_deadline;
use markpanel_core::model::{
    AnalysisResult, CaseStatus, ChatMessage, FinalOutput, Provider, RunStep,
};
use markpanel_daemon::api::{self, AppState};
use markpanel_daemon::config::DaemonConfig;
use markpanel_daemon::db::Db;
use markpanel_llm::{
    Completion, ProviderAdapter, ProviderError, ProviderSettings, Schedule, Synthesizer,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn bind(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn sse(chunks: Vec<String>) -> Response {
    let stream = futures_util::stream::iter(
        chunks
            .into_iter()
            .map(|c| Ok::<_, std::io::Error>(Bytes::from(c))),
    );
    axum::http::Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(stream))
        .unwrap()
}

fn chat_chunk(text: &str) -> String {
    format!("data: {}\n\n", json!({"choices": [{"delta": {"content": text}}]}))
}

/// Stand-in for all four provider APIs.
fn fake_upstream() -> Router {
    Router::new()
        .route(
            "/v1/messages",
            post(|| async {
                sse(vec![format!(
                    "data: {}\n\n",
                    json!({"type": "content_block_delta", "delta": {"type": "text_delta", "text": "Claude: Verwechslungsgefahr."}})
                )])
            }),
        )
        .route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                if body["stream"] == true {
                    return sse(vec![
                        chat_chunk("DeepSeek: "),
                        chat_chunk("Ja."),
                        "data: [DONE]\n\n".to_string(),
                    ]);
                }
                let system = body["messages"][0]["content"].as_str().unwrap_or_default();
                let content = if system.starts_with("Du bist der leitende") {
                    "FINALE ANALYSE"
                } else {
                    "GPT-4o: Ja."
                };
                Json(json!({"choices": [{"message": {"content": content}}]})).into_response()
            }),
        )
        .route(
            "/v1beta/models/{action}",
            post(|| async {
                Json(json!({"candidates": [{"content": {"parts": [{"text": "Gemini: Ja."}]}}]}))
            }),
        )
}

struct TestApp {
    base: String,
    http: reqwest::Client,
}

impl TestApp {
    async fn start(state: AppState) -> Self {
        Self {
            base: bind(api::router(state)).await,
            http: reqwest::Client::new(),
        }
    }

    async fn with_upstream(upstream: Option<&str>) -> Self {
        let mut config = DaemonConfig {
            public_base_url: "https://panel.example".into(),
            schedule: Schedule::Concurrent,
            call_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        if let Some(url) = upstream {
            for p in Provider::ALL {
                config.providers.insert(
                    p,
                    ProviderSettings::default_for(p)
                        .with_api_key(Some("k".into()))
                        .with_base_url(Some(url.into())),
                );
            }
        }
        let db = mem_db().await;
        Self::start(AppState::from_config(db, config).unwrap()).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.http.post(self.url(path)).json(&body).send().await.unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.http.get(self.url(path)).send().await.unwrap()
    }

    async fn wait_done(&self, run_id: &str) -> RunResponse {
        for _ in 0..250 {
            let run: RunResponse = self
                .get(&format!("/runs/{run_id}"))
                .await
                .json()
                .await
                .unwrap();
            if run.state.is_done() {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("run {run_id} did not finish");
    }
}

async fn mem_db() -> Db {
    let db = Db::connect("mem://").await.unwrap();
    db.bootstrap_schema().await.unwrap();
    db
}

#[tokio::test]
async fn test_healthz() {
    let app = TestApp::with_upstream(None).await;
    let res = app.get("/healthz").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_case_lifecycle() {
    let app = TestApp::with_upstream(None).await;

    let res = app
        .post(
            "/cases",
            json!({
                "auftragsmarke": "ACME",
                "gegenmarke": "AKME",
                "final_analysis": "Widerspruch wird empfohlen.",
                "confidence_level": 85
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let created: CaseCreated = res.json().await.unwrap();
    assert!(case_number::is_well_formed(&created.case_number));
    assert_eq!(
        created.case_url,
        format!("https://panel.example/case/{}", created.case_number)
    );

    let fetched: CaseResponse = app
        .get(&format!("/cases?case_number={}", created.case_number))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(fetched.case.case_id, created.case_id);
    assert_eq!(fetched.case.status, CaseStatus::AnalysisComplete);
    assert_eq!(fetched.case.confidence_level, Some(85));

    let res = app
        .post(
            "/opposition/prepare",
            json!({
                "caseId": created.case_id,
                "clientEmail": "max.example.com",
                "clientName": "Max Mustermann"
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .post(
            "/opposition/prepare",
            json!({
                "caseId": created.case_id,
                "clientEmail": "max@example.com",
                "clientName": "Max Mustermann"
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let prepared: PrepareOppositionResponse = res.json().await.unwrap();
    assert!(prepared.success);
    assert_eq!(prepared.case.status, CaseStatus::OppositionPrepared);
    assert_eq!(
        prepared.case.opposition_deadline,
        Some(opposition_deadline(Utc::now().date_naive()))
    );
    assert_eq!(
        prepared.email_content.subject,
        format!(
            "Markenrechts-Analyse {} - Widerspruch empfohlen",
            created.case_number
        )
    );
    assert!(prepared.email_content.text.contains(&created.case_url));
    assert!(prepared.email_content.text.contains("Konfidenz: 85%"));

    let letter = app
        .get(&format!("/cases/{}/letter", created.case_number))
        .await
        .text()
        .await
        .unwrap();
    assert!(letter.starts_with("Betreff: Widerspruch gegen Markenanmeldung - AKME"));
    assert!(letter.contains("Widerspruch wird empfohlen."));

    let sent: CaseResponse = app
        .post("/opposition/sent", json!({"caseId": created.case_id}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(sent.case.status, CaseStatus::OppositionSent);
}

#[tokio::test]
async fn test_malformed_requests_are_rejected() {
    let app = TestApp::with_upstream(None).await;

    let res = app.post("/cases", json!({"auftragsmarke": "  "})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: ErrorResponse = res.json().await.unwrap();
    assert!(err.error.contains("auftragsmarke"));

    assert_eq!(app.get("/cases").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        app.get("/cases?case_number=MR-20250101000000-AAAAAA")
            .await
            .status(),
        StatusCode::NOT_FOUND
    );

    let res = app.post("/opposition/prepare", json!({})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: ErrorResponse = res.json().await.unwrap();
    assert_eq!(err.error, "caseId is required");

    let res = app
        .post(
            "/opposition/prepare",
            json!({"caseId": "missing", "clientEmail": "a@b.de", "clientName": "A"}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // An unknown case wins over a malformed contact.
    let res = app
        .post(
            "/opposition/prepare",
            json!({"caseId": "missing", "clientEmail": "kein-at", "clientName": ""}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .post("/runs", json!({"input": {"auftragsmarke": "", "gegenmarke": ""}}))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.get("/runs/nope").await.status(), StatusCode::NOT_FOUND);

    let res = app
        .post(
            "/providers/mistral",
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .post(
            "/providers/openai",
            json!({"messages": [{"role": "user", "content": "  "}, {"role": "assistant", "content": ""}]}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: ErrorResponse = res.json().await.unwrap();
    assert_eq!(err.error, "case text must not be empty");
}

#[tokio::test]
async fn test_run_then_persist_case() {
    let upstream = bind(fake_upstream()).await;
    let app = TestApp::with_upstream(Some(&upstream)).await;

    let res = app
        .post(
            "/runs",
            json!({"input": {"auftragsmarke": "ACME", "gegenmarke": "AKME"}}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let started: StartRunResponse = res.json().await.unwrap();

    let run = app.wait_done(&started.run_id).await;
    assert_eq!(run.input.auftragsmarke, "ACME");
    assert_eq!(run.state.results.len(), 4);
    assert!(run.state.results.iter().all(|r| r.outcome.is_success()));
    assert_eq!(run.state.last_error, None);
    assert_eq!(
        run.state.final_output,
        Some(FinalOutput::Synthesized("FINALE ANALYSE".into()))
    );

    let res = app
        .post(
            &format!("/runs/{}/case", started.run_id),
            json!({"recommendation": "Widerspruch einlegen", "confidence_level": 90}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let created: CaseCreated = res.json().await.unwrap();

    let case = app
        .get(&format!("/cases?case_number={}", created.case_number))
        .await
        .json::<CaseResponse>()
        .await
        .unwrap()
        .case;
    assert_eq!(case.claude_analysis.as_deref(), Some("Claude: Verwechslungsgefahr."));
    assert_eq!(case.deepseek_analysis.as_deref(), Some("DeepSeek: Ja."));
    assert_eq!(case.gemini_analysis.as_deref(), Some("Gemini: Ja."));
    assert_eq!(case.openai_analysis.as_deref(), Some("GPT-4o: Ja."));
    assert_eq!(case.final_analysis.as_deref(), Some("FINALE ANALYSE"));
    assert_eq!(case.confidence_level, Some(90));
}

#[tokio::test]
async fn test_run_without_keys_skips_synthesis() {
    let app = TestApp::with_upstream(None).await;
    let started: StartRunResponse = app
        .post("/runs", json!({"session": "s1", "input": {"gegenmarke": "AKME"}}))
        .await
        .json()
        .await
        .unwrap();

    let run = app.wait_done(&started.run_id).await;
    assert_eq!(run.state.step, RunStep::Done);
    assert_eq!(run.state.final_output, None);
    assert!(run
        .state
        .results
        .iter()
        .all(|r| r.rendered().starts_with("❌")));
    let summary = run.state.last_error.unwrap();
    for p in Provider::ALL {
        assert!(summary.contains(&format!("{}-Fehler", p.wire_name())));
    }
}

#[tokio::test]
async fn test_provider_routes() {
    let upstream = bind(fake_upstream()).await;
    let app = TestApp::with_upstream(Some(&upstream)).await;
    let body = json!({"messages": [{"role": "user", "content": "ACME vs AKME"}]});

    let res = app.post("/providers/openai", body.clone()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let whole: ContentResponse = res.json().await.unwrap();
    assert_eq!(whole.content, "GPT-4o: Ja.");

    let res = app.post("/providers/deepseek", body.clone()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    let streamed = res.text().await.unwrap();
    assert!(streamed.contains(r#"data: {"content":"DeepSeek: "}"#), "{streamed}");
    assert!(streamed.contains(r#"data: {"content":"Ja."}"#));
    assert!(streamed.ends_with("data: [DONE]\n\n"));

    let reports = vec![
        AnalysisResult::failure(Provider::Anthropic, "timeout"),
        AnalysisResult::new(
            Provider::OpenAi,
            markpanel_core::model::AnalysisOutcome::Success("GPT-4o: Ja.".into()),
        ),
    ];
    let res = app
        .post("/analysis/final", json!({ "reports": reports }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let final_: ContentResponse = res.json().await.unwrap();
    assert_eq!(final_.content, "FINALE ANALYSE");
}

#[tokio::test]
async fn test_provider_quota_is_429() {
    let upstream = bind(Router::new().route(
        "/v1beta/models/{action}",
        post(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": {"details": [
                    {"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "12s"}
                ]}})),
            )
        }),
    ))
    .await;
    let app = TestApp::with_upstream(Some(&upstream)).await;

    let res = app
        .post(
            "/providers/gemini",
            json!({"messages": [{"role": "user", "content": "Fall"}]}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Gemini API Quota erreicht");
    assert!(body["details"].as_str().unwrap().contains("12s"));
    assert!(body["fallback"].as_str().unwrap().contains("Claude und DeepSeek"));
}

/// Adapter that only returns once its call is cancelled.
struct Stalled(Provider);

#[async_trait]
impl ProviderAdapter for Stalled {
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
        cancel: &CancellationToken,
    ) -> Result<Completion, ProviderError> {
        cancel.cancelled().await;
        Err(ProviderError::Cancelled(self.0))
    }
}

struct NeverCalled;

#[async_trait]
impl Synthesizer for NeverCalled {
    async fn synthesize(&self, _results: &[AnalysisResult]) -> Result<String, ProviderError> {
        panic!("synthesis must not run for cancelled runs");
    }
}

#[tokio::test]
async fn test_busy_session_and_cancel() {
    let adapters: Vec<Arc<dyn ProviderAdapter>> = Provider::ALL
        .into_iter()
        .map(|p| Arc::new(Stalled(p)) as Arc<dyn ProviderAdapter>)
        .collect();
    let state = AppState::new(
        mem_db().await,
        DaemonConfig::default(),
        adapters,
        Arc::new(NeverCalled),
    );
    let app = TestApp::start(state).await;
    let input = json!({"auftragsmarke": "ACME"});

    let first: StartRunResponse = app
        .post("/runs", json!({"input": input}))
        .await
        .json()
        .await
        .unwrap();

    let res = app.post("/runs", json!({"input": input})).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let err: ErrorResponse = res.json().await.unwrap();
    assert_eq!(err.details.as_deref(), Some(first.run_id.as_str()));

    let res = app
        .post("/runs", json!({"session": "other", "input": input}))
        .await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let other: StartRunResponse = res.json().await.unwrap();

    let res = app
        .post(&format!("/runs/{}/case", first.run_id), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    for id in [&first.run_id, &other.run_id] {
        let res = app.post(&format!("/runs/{id}/cancel"), json!({})).await;
        assert_eq!(res.status(), StatusCode::OK);
        let run = app.wait_done(id).await;
        assert_eq!(run.state.results.len(), 4);
        assert_eq!(run.state.final_output, None);
        assert!(run.state.last_error.is_some());
    }

    // The session is released right after the final snapshot is published.
    let mut status = StatusCode::CONFLICT;
    for _ in 0..50 {
        status = app.post("/runs", json!({"input": input})).await.status();
        if status != StatusCode::CONFLICT {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, StatusCode::ACCEPTED);
}
