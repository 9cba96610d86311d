#![forbid(unsafe_code)]

//! Provider adapters, response decoding, synthesis and the run coordinator.
//!
//! Every provider is reached through [`ProviderAdapter`]. The concrete
//! [`HttpProvider`] builds the provider-specific request and decodes either a
//! whole JSON body or an event stream through a configured [`StreamDecoder`].

pub mod coordinator;
pub mod error;
pub mod http_client;
pub mod prompts;
pub mod provider;
pub mod providers;
pub mod stream;
pub mod synthesis;

pub use coordinator::{RunCoordinator, Schedule};
pub use error::ProviderError;
pub use http_client::build_http_client;
pub use provider::{Completion, HttpProvider, ProviderAdapter, ProviderSettings, QuotaNotice};
pub use stream::StreamDecoder;
pub use synthesis::{SupervisorSynthesizer, Synthesizer};
