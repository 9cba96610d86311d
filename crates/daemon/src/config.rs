use std::collections::BTreeMap;
use std::time::Duration;

use markpanel_core::model::Provider;
use markpanel_llm::{ProviderSettings, Schedule};

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// SurrealDB endpoint, `surrealkv://<dir>` or `mem://`.
    pub db_url: String,
    /// Public origin used to build case links.
    pub public_base_url: String,

    pub providers: BTreeMap<Provider, ProviderSettings>,
    pub call_timeout: Duration,
    pub schedule: Schedule,
}

impl DaemonConfig {
    /// Settings for a provider; public defaults when not configured.
    pub fn provider_settings(&self, provider: Provider) -> ProviderSettings {
        self.providers
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| ProviderSettings::default_for(provider))
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            db_url: "mem://".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            providers: BTreeMap::new(),
            call_timeout: markpanel_llm::http_client::DEFAULT_CALL_TIMEOUT,
            schedule: Schedule::default(),
        }
    }
}
