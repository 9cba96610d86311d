use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use markpanel_core::model::{Case, CaseStatus, NewCase};
use markpanel_core::{case_number, deadline, new_ulid, now_ms};
use serde_json::json;
use surrealdb::engine::any::{connect, Any};
use surrealdb::Surreal;
use thiserror::Error;

const TABLE: &str = "trademark_case";
const CASE_NUMBER_INDEX: &str = "case_number_idx";
/// Attempts to find an unused case number before giving up.
pub const CASE_NUMBER_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("case {0} not found")]
    NotFound(String),

    #[error("no unused case number after {0} attempts")]
    Conflict(u32),

    #[error("datastore error: {0}")]
    Backend(#[from] surrealdb::Error),
}

/// Case store backed by SurrealDB.
#[derive(Clone)]
pub struct Db {
    inner: Surreal<Any>,
}

impl Db {
    /// Connects to `surrealkv://<dir>` (created if missing) or `mem://`.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        if let Some(dir) = url.strip_prefix("surrealkv://") {
            std::fs::create_dir_all(dir).with_context(|| format!("creating db dir {dir}"))?;
        }
        let inner = connect(url)
            .await
            .with_context(|| format!("connecting to {url}"))?;
        inner
            .use_ns("markpanel")
            .use_db("main")
            .await
            .context("selecting surreal namespace/db")?;
        Ok(Self { inner })
    }

    pub async fn bootstrap_schema(&self) -> anyhow::Result<()> {
        let schema = include_str!("../schema.surql");
        self.inner
            .query(schema)
            .await
            .context("applying schema")?
            .check()
            .context("applying schema")?;
        Ok(())
    }

    /// Stores a finished analysis under a fresh case number.
    pub async fn create_case(&self, new: NewCase, now: DateTime<Utc>) -> Result<Case, StoreError> {
        self.create_case_with(new, now, || case_number::generate(now))
            .await
    }

    pub(crate) async fn create_case_with(
        &self,
        new: NewCase,
        now: DateTime<Utc>,
        mut next_number: impl FnMut() -> String,
    ) -> Result<Case, StoreError> {
        let ts = now.timestamp_millis();
        for attempt in 1..=CASE_NUMBER_ATTEMPTS {
            let case = Case {
                case_id: new_ulid().to_string(),
                case_number: next_number(),
                status: CaseStatus::AnalysisComplete,
                auftragsmarke: new.input.auftragsmarke.clone(),
                gegenmarke: new.input.gegenmarke.clone(),
                claude_analysis: new.claude_analysis.clone(),
                deepseek_analysis: new.deepseek_analysis.clone(),
                gemini_analysis: new.gemini_analysis.clone(),
                openai_analysis: new.openai_analysis.clone(),
                final_analysis: new.final_analysis.clone(),
                recommendation: new.recommendation.clone(),
                confidence_level: new.confidence_level,
                client_email: None,
                client_name: None,
                opposition_deadline: None,
                analysis_date_ms: ts,
                created_ms: ts,
                updated_ms: ts,
            };

            let res = self
                .inner
                .query("CREATE type::thing($tb, $id) CONTENT $case RETURN NONE;")
                .bind(("tb", TABLE))
                .bind(("id", case.case_id.clone()))
                .bind(("case", case.clone()))
                .await
                .and_then(|r| r.check());

            match res {
                Ok(_) => {
                    tracing::info!(case_id = %case.case_id, case_number = %case.case_number, "case created");
                    return Ok(case);
                }
                Err(err) if is_number_conflict(&err) => {
                    tracing::warn!(attempt, case_number = %case.case_number, "case number taken, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::Conflict(CASE_NUMBER_ATTEMPTS))
    }

    pub async fn get_case(&self, case_id: &str) -> Result<Option<Case>, StoreError> {
        let mut res = self
            .inner
            .query("SELECT * OMIT id FROM type::thing($tb, $id);")
            .bind(("tb", TABLE))
            .bind(("id", case_id.to_string()))
            .await?;
        let rows: Vec<Case> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn get_case_by_number(&self, number: &str) -> Result<Option<Case>, StoreError> {
        let mut res = self
            .inner
            .query("SELECT * OMIT id FROM type::table($tb) WHERE case_number = $number LIMIT 1;")
            .bind(("tb", TABLE))
            .bind(("number", number.to_string()))
            .await?;
        let rows: Vec<Case> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Records the client and sets the opposition deadline three months after `today`.
    pub async fn prepare_opposition(
        &self,
        case_id: &str,
        client_email: &str,
        client_name: &str,
        today: NaiveDate,
    ) -> Result<Case, StoreError> {
        let mut case = self
            .get_case(case_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(case_id.to_string()))?;

        case.status = CaseStatus::OppositionPrepared;
        case.client_email = Some(client_email.trim().to_string());
        case.client_name = Some(client_name.trim().to_string());
        case.opposition_deadline = Some(deadline::opposition_deadline(today));
        case.updated_ms = now_ms();

        self.merge(
            case_id,
            json!({
                "status": case.status,
                "client_email": case.client_email,
                "client_name": case.client_name,
                "opposition_deadline": case.opposition_deadline,
                "updated_ms": case.updated_ms,
            }),
        )
        .await?;
        Ok(case)
    }

    pub async fn mark_opposition_sent(&self, case_id: &str) -> Result<Case, StoreError> {
        let mut case = self
            .get_case(case_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(case_id.to_string()))?;

        case.status = CaseStatus::OppositionSent;
        case.updated_ms = now_ms();
        self.merge(
            case_id,
            json!({ "status": case.status, "updated_ms": case.updated_ms }),
        )
        .await?;
        Ok(case)
    }

    async fn merge(&self, case_id: &str, patch: serde_json::Value) -> Result<(), StoreError> {
        self.inner
            .query("UPDATE type::thing($tb, $id) MERGE $patch RETURN NONE;")
            .bind(("tb", TABLE))
            .bind(("id", case_id.to_string()))
            .bind(("patch", patch))
            .await?
            .check()?;
        Ok(())
    }
}

/// A duplicate on a unique index is `Db::IndexExists`, displayed as
/// "Database index `case_number_idx` already contains ...". Errors that reach
/// us in another wrapper are matched on that text.
fn is_number_conflict(err: &surrealdb::Error) -> bool {
    match err {
        surrealdb::Error::Db(surrealdb::error::Db::IndexExists { index, .. }) => {
            index == CASE_NUMBER_INDEX
        }
        other => other.to_string().contains(CASE_NUMBER_INDEX),
    }
}
