use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use markpanel_core::api::{
    CaseCreated, CaseFromRunRequest, CaseResponse, ContentResponse, ErrorResponse,
    OppositionSentRequest, PrepareOppositionRequest, PrepareOppositionResponse, ProviderRequest,
    RunResponse, StartRunRequest, StartRunResponse,
};
use markpanel_core::model::{CaseInput, ChatMessage};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Matches the daemon's default `--listen` address.
const DEFAULT_DAEMON: &str = "http://127.0.0.1:8080";

#[derive(Parser, Debug)]
#[command(name = "markpanelctl")]
struct Args {
    /// Base URL of the daemon.
    #[arg(long, global = true, env = "MARKPANEL_DAEMON", default_value = DEFAULT_DAEMON)]
    daemon: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Runs all providers on a case and waits for the result.
    Analyze {
        #[arg(long, default_value = "")]
        auftragsmarke: String,
        #[arg(long, default_value = "")]
        gegenmarke: String,
        #[arg(long)]
        session: Option<String>,
        /// Persist the finished run as a case.
        #[arg(long)]
        save: bool,
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,
    },
    /// Sends one message to a single provider.
    Ask {
        #[arg(long)]
        provider: String,
        #[arg(long)]
        message: String,
    },
    Run {
        #[command(subcommand)]
        run: RunCmd,
    },
    Case {
        #[command(subcommand)]
        case: CaseCmd,
    },
    Opposition {
        #[command(subcommand)]
        opposition: OppositionCmd,
    },
}

#[derive(Subcommand, Debug)]
enum RunCmd {
    Get {
        #[arg(long)]
        run_id: String,
    },
    Cancel {
        #[arg(long)]
        run_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum CaseCmd {
    Get {
        #[arg(long)]
        case_number: String,
    },
    CreateFromRun {
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        recommendation: Option<String>,
        #[arg(long)]
        confidence: Option<u8>,
    },
    Letter {
        #[arg(long)]
        case_number: String,
    },
}

#[derive(Subcommand, Debug)]
enum OppositionCmd {
    Prepare {
        #[arg(long)]
        case_id: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
    Sent {
        #[arg(long)]
        case_id: String,
    },
}

struct Daemon {
    base: String,
    http: reqwest::Client,
}

impl Daemon {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let resp = self.http.get(self.url(path)).send().await?;
        decode(resp).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> anyhow::Result<T> {
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        decode(resp).await
    }
}

/// Reads a JSON reply, surfacing the daemon's error body on failure.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> anyhow::Result<T> {
    let status = resp.status();
    if status.is_success() {
        return resp.json().await.context("decoding response");
    }
    let text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(err) => match err.details {
            Some(details) => bail!("{status}: {} ({details})", err.error),
            None => bail!("{status}: {}", err.error),
        },
        Err(_) => bail!("{status}: {text}"),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Text of the `data:` records of a streamed provider reply.
fn stream_text(body: &str) -> String {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .filter_map(|data| serde_json::from_str::<ContentResponse>(data).ok())
        .map(|c| c.content)
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let daemon = Daemon {
        base: args.daemon.trim_end_matches('/').to_string(),
        http: reqwest::Client::new(),
    };

    match args.cmd {
        Cmd::Analyze {
            auftragsmarke,
            gegenmarke,
            session,
            save,
            poll_ms,
        } => {
            let req = StartRunRequest {
                session,
                input: CaseInput {
                    auftragsmarke,
                    gegenmarke,
                },
            };
            let started: StartRunResponse = daemon.post("/runs", &req).await?;
            eprintln!("run {} started", started.run_id);

            let path = format!("/runs/{}", started.run_id);
            let run = loop {
                let run: RunResponse = daemon.get(&path).await?;
                if run.state.is_done() {
                    break run;
                }
                eprintln!("step: {:?}", run.state.step);
                tokio::time::sleep(Duration::from_millis(poll_ms)).await;
            };
            print_json(&run)?;

            if save {
                let created: CaseCreated = daemon
                    .post(
                        &format!("/runs/{}/case", started.run_id),
                        &CaseFromRunRequest::default(),
                    )
                    .await?;
                print_json(&created)?;
            }
        }
        Cmd::Ask { provider, message } => {
            let req = ProviderRequest {
                messages: vec![ChatMessage::user(message)],
            };
            let resp = daemon
                .http
                .post(daemon.url(&format!("/providers/{provider}")))
                .json(&req)
                .send()
                .await?;
            let streamed = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("text/event-stream"));
            if streamed {
                println!("{}", stream_text(&resp.text().await?));
            } else if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let quota: serde_json::Value = resp.json().await?;
                print_json(&quota)?;
            } else {
                let reply: ContentResponse = decode(resp).await?;
                println!("{}", reply.content);
            }
        }
        Cmd::Run { run } => match run {
            RunCmd::Get { run_id } => {
                let resp: RunResponse = daemon.get(&format!("/runs/{run_id}")).await?;
                print_json(&resp)?;
            }
            RunCmd::Cancel { run_id } => {
                let resp: RunResponse = daemon
                    .post(&format!("/runs/{run_id}/cancel"), &serde_json::json!({}))
                    .await?;
                print_json(&resp)?;
            }
        },
        Cmd::Case { case } => match case {
            CaseCmd::Get { case_number } => {
                let resp: CaseResponse = daemon
                    .get(&format!("/cases?case_number={case_number}"))
                    .await?;
                print_json(&resp)?;
            }
            CaseCmd::CreateFromRun {
                run_id,
                recommendation,
                confidence,
            } => {
                let req = CaseFromRunRequest {
                    recommendation,
                    confidence_level: confidence,
                };
                let resp: CaseCreated = daemon.post(&format!("/runs/{run_id}/case"), &req).await?;
                print_json(&resp)?;
            }
            CaseCmd::Letter { case_number } => {
                let resp = daemon
                    .http
                    .get(daemon.url(&format!("/cases/{case_number}/letter")))
                    .send()
                    .await?
                    .error_for_status()?;
                println!("{}", resp.text().await?);
            }
        },
        Cmd::Opposition { opposition } => match opposition {
            OppositionCmd::Prepare {
                case_id,
                email,
                name,
            } => {
                let req = PrepareOppositionRequest {
                    case_id: Some(case_id),
                    client_email: email,
                    client_name: name,
                };
                let resp: PrepareOppositionResponse =
                    daemon.post("/opposition/prepare", &req).await?;
                print_json(&resp)?;
            }
            OppositionCmd::Sent { case_id } => {
                let req = OppositionSentRequest {
                    case_id: Some(case_id),
                };
                let resp: CaseResponse = daemon.post("/opposition/sent", &req).await?;
                print_json(&resp)?;
            }
        },
    }

    Ok(())
}
