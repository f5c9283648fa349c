//! Cleanup of the text an inference call returns for one page.
//!
//! Even when told to return bare Markdown, vision agents sometimes wrap it in
//! a ```` ```markdown ```` fence, emit CRLF line endings, or leak zero-width
//! characters. These rules fix that without touching content.
//!
//! Order matters: fences are stripped before line endings are normalised so
//! the fence regex sees the raw reply, and the outer trim runs last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every rule, in order:
///
/// 1. Strip an outer code fence wrapping the whole reply
/// 2. Normalise line endings (CRLF / CR → LF)
/// 3. Remove invisible Unicode (zero-width spaces, BOM, soft hyphen)
/// 4. Trim trailing whitespace per line, keeping Markdown hard breaks
/// 5. Collapse runs of blank lines to one blank line
/// 6. Trim leading and trailing blank space
pub fn clean_page_text(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed) {
        // A fence line inside means the reply opens and closes with two different blocks.
        Some(caps) if !caps[1].lines().any(|l| l.trim_start().starts_with("```")) => {
            caps[1].to_string()
        }
        _ => input.to_string(),
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

const INVISIBLE: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'];

fn remove_invisible_chars(input: &str) -> String {
    input.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

/// Markdown hard breaks (two trailing spaces before a non-blank line) survive.
fn trim_trailing_whitespace(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_end();
        let hard_break = !trimmed.is_empty()
            && line.ends_with("  ")
            && lines.get(i + 1).is_some_and(|next| !next.trim().is_empty());
        if hard_break {
            out.push(format!("{trimmed}  "));
        } else {
            out.push(trimmed.to_string());
        }
    }
    out.join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}
