//! Client email and opposition letter drafts built from a case.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::Case;

const DEFAULT_RECOMMENDATION: &str = "Widerspruch einlegen";
const MARK_EXCERPT_CHARS: usize = 100;
const LETTER_MARK_CHARS: usize = 50;
const LETTER_ANALYSIS_CHARS: usize = 1000;

/// Email announcing a prepared opposition to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OppositionEmail {
    /// Subject line naming the case number.
    pub subject: String,
    /// Plain-text body.
    pub text: String,
}

/// Public link to a case.
pub fn case_url(base_url: &str, case_number: &str) -> String {
    format!("{}/case/{case_number}", base_url.trim_end_matches('/'))
}

/// German calendar date, e.g. `30.04.2025`.
pub fn format_date_de(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

fn excerpt(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Builds the notification sent after an opposition was prepared.
pub fn opposition_email(case: &Case, case_url: &str) -> OppositionEmail {
    let client = case.client_name.as_deref().unwrap_or("Mandant/in");
    let recommendation = case
        .recommendation
        .as_deref()
        .unwrap_or(DEFAULT_RECOMMENDATION);
    let confidence = case
        .confidence_level
        .map(|c| format!("{c}%"))
        .unwrap_or_else(|| "Hoch".to_string());
    let deadline = case
        .opposition_deadline
        .map(format_date_de)
        .unwrap_or_else(|| "N/A".to_string());

    let subject = format!(
        "Markenrechts-Analyse {} - Widerspruch empfohlen",
        case.case_number
    );
    let text = format!(
        "{subject}\n\n\
         Sehr geehrte/r {client},\n\n\
         unsere KI-gestützte Markenrechtsanalyse für Ihren Fall ist abgeschlossen.\n\
         Basierend auf der Analyse wird ein Widerspruch empfohlen.\n\n\
         Falldetails:\n\
         - Auftragsmarke: {auftrag}...\n\
         - Gegenmarke: {gegen}...\n\
         - Empfehlung: {recommendation}\n\
         - Konfidenz: {confidence}\n\n\
         Vollständige Analyse anzeigen: {case_url}\n\n\
         WICHTIG: Widerspruchsfrist beachten! Deadline: {deadline}\n",
        auftrag = excerpt(&case.auftragsmarke, MARK_EXCERPT_CHARS),
        gegen = excerpt(&case.gegenmarke, MARK_EXCERPT_CHARS),
    );
    OppositionEmail { subject, text }
}

/// Draft opposition letter addressed to the holder of the opposing mark.
pub fn opposition_letter(case: &Case) -> String {
    let reasoning = match case.final_analysis.as_deref() {
        Some(analysis) => format!(
            "Basierend auf unserer umfassenden Markenrechtsanalyse bestehen erhebliche \
             Verwechslungsgefahren zwischen den Marken.\n\n\
             DETAILLIERTE ANALYSE:\n{}...\n",
            excerpt(analysis, LETTER_ANALYSIS_CHARS)
        ),
        None => "Eine detaillierte Begründung folgt in separater Anlage.".to_string(),
    };
    let analysis_date = DateTime::from_timestamp_millis(case.analysis_date_ms)
        .map(|dt| format_date_de(dt.date_naive()))
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        "Betreff: Widerspruch gegen Markenanmeldung - {subject_mark}\n\n\
         Sehr geehrte Damen und Herren,\n\n\
         hiermit lege ich namens meines Mandanten Widerspruch gegen die Markenanmeldung ein:\n\n\
         Gegenmarke: {gegen}\n\
         Auftragsmarke: {auftrag}\n\n\
         BEGRÜNDUNG:\n\n{reasoning}\n\
         ANTRAG:\n\
         Wir beantragen, die Markenanmeldung zurückzuweisen bzw. den Widerspruch als begründet \
         anzuerkennen.\n\n\
         Mit freundlichen Grüßen\n\n\
         ---\n\
         Fall-Nr.: {number}\n\
         Analyse-Datum: {analysis_date}\n",
        subject_mark = excerpt(&case.gegenmarke, LETTER_MARK_CHARS),
        gegen = case.gegenmarke,
        auftrag = case.auftragsmarke,
        number = case.case_number,
    )
}
