use markpanel_core::model::CaseInput;
use markpanel_core::validation::{
    analysis_prompt, validate_case_input, validate_case_text, validate_client_contact,
    CaseInputError,
};

fn input(auftrag: &str, gegen: &str) -> CaseInput {
    CaseInput {
        auftragsmarke: auftrag.into(),
        gegenmarke: gegen.into(),
    }
}

#[test]
fn blocks_case_without_marks() {
    assert_eq!(
        validate_case_input(&input("  ", "\n")),
        Err(CaseInputError::NoMarks)
    );
}

#[test]
fn allows_single_mark() {
    assert!(validate_case_input(&input("ACME", "")).is_ok());
    assert!(validate_case_input(&input("", "AKME")).is_ok());
}

#[test]
fn blocks_blank_case_text() {
    assert_eq!(validate_case_text(" \t "), Err(CaseInputError::EmptyText));
    assert!(validate_case_text("x").is_ok());
}

#[test]
fn prompt_lists_both_marks() {
    let prompt = analysis_prompt(&input(" ACME ", "AKME"));
    assert!(prompt.starts_with("MARKENINFORMATIONEN:\n\nAUFTRAGSMARKE:\nACME\n\nGEGENMARKE:\nAKME\n\n"));
    assert!(prompt.contains("ANALYSE-ANFRAGE:"));
}

#[test]
fn prompt_omits_empty_side() {
    let prompt = analysis_prompt(&input("", "AKME"));
    assert!(!prompt.contains("AUFTRAGSMARKE"));
    assert!(prompt.contains("GEGENMARKE:\nAKME"));
}

#[test]
fn client_contact_rules() {
    assert!(validate_client_contact("max@example.com", "Max").is_ok());
    assert_eq!(
        validate_client_contact("max@example.com", " "),
        Err(CaseInputError::MissingField("clientName"))
    );
    assert_eq!(
        validate_client_contact("", "Max"),
        Err(CaseInputError::MissingField("clientEmail"))
    );
    assert!(matches!(
        validate_client_contact("max.example.com", "Max"),
        Err(CaseInputError::InvalidEmail(_))
    ));
    assert!(matches!(
        validate_client_contact("a@b@c", "Max"),
        Err(CaseInputError::InvalidEmail(_))
    ));
}
