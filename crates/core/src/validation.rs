//! Request checks and the provider analysis prompt.

use thiserror::Error;

use crate::model::CaseInput;

/// Rejected request input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaseInputError {
    /// Both marks are blank.
    #[error("at least one of auftragsmarke or gegenmarke must be provided")]
    NoMarks,
    /// Nothing to send to a provider.
    #[error("case text must not be empty")]
    EmptyText,
    /// A required field is absent or blank.
    #[error("{0} is required")]
    MissingField(&'static str),
    /// The email does not look like an address.
    #[error("client email {0:?} is not a valid address")]
    InvalidEmail(String),
}

/// Checks that a case carries at least one mark.
pub fn validate_case_input(input: &CaseInput) -> Result<(), CaseInputError> {
    if input.auftragsmarke.trim().is_empty() && input.gegenmarke.trim().is_empty() {
        return Err(CaseInputError::NoMarks);
    }
    Ok(())
}

/// Checks free text sent to a provider.
pub fn validate_case_text(text: &str) -> Result<(), CaseInputError> {
    if text.trim().is_empty() {
        return Err(CaseInputError::EmptyText);
    }
    Ok(())
}

/// Checks the client contact captured when preparing an opposition.
pub fn validate_client_contact(email: &str, name: &str) -> Result<(), CaseInputError> {
    if name.trim().is_empty() {
        return Err(CaseInputError::MissingField("clientName"));
    }
    let email = email.trim();
    if email.is_empty() {
        return Err(CaseInputError::MissingField("clientEmail"));
    }
    // Shape check only: one '@' with text on both sides.
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(CaseInputError::InvalidEmail(email.to_string())),
    }
}

/// Renders the analysis request sent to every provider.
///
/// An empty side is left out entirely.
pub fn analysis_prompt(input: &CaseInput) -> String {
    let mut out = String::from("MARKENINFORMATIONEN:\n\n");
    let auftrag = input.auftragsmarke.trim();
    if !auftrag.is_empty() {
        out.push_str("AUFTRAGSMARKE:\n");
        out.push_str(auftrag);
        out.push_str("\n\n");
    }
    let gegen = input.gegenmarke.trim();
    if !gegen.is_empty() {
        out.push_str("GEGENMARKE:\n");
        out.push_str(gegen);
        out.push_str("\n\n");
    }
    out.push_str(
        "ANALYSE-ANFRAGE:\nBitte führen Sie eine vollständige Markenrechtsanalyse basierend auf \
         den oben genannten Markeninformationen durch. Prüfen Sie insbesondere die \
         Verwechslungsgefahr zwischen den beiden Marken.",
    );
    out
}
