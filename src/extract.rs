//! Pull a specialist's name out of an agent's free-text reply.

use crate::prompts::CONSULTANTS;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_DOCTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"Dr\.\s+[A-Za-z]+").unwrap());

/// Find the specialist named in `text`.
///
/// Labels in `known` are tried in order and the first one contained in the
/// text wins, wherever it appears. Without a known label, the first
/// `Dr. <Name>` in the text is returned.
pub fn find_specialist(text: &str, known: &[&str]) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    if let Some(label) = known.iter().find(|label| text.contains(**label)) {
        return Some((*label).to_string());
    }
    RE_DOCTOR.find(text).map(|m| m.as_str().to_string())
}

/// [`find_specialist`] over the consultant roster.
pub fn find_known_specialist(text: &str) -> Option<String> {
    let known: Vec<&str> = CONSULTANTS.iter().map(|s| s.name).collect();
    find_specialist(text, &known)
}
