use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::vocab::{self, Category, Vocabulary};

/// Which rule set a locale tag selects
enum LocaleRules {
    Swedish,
    English,
    Other,
}

fn rules_for(tag: &str) -> LocaleRules {
    if tag == "sv-SE" {
        LocaleRules::Swedish
    } else if tag.starts_with("en") {
        LocaleRules::English
    } else {
        LocaleRules::Other
    }
}

/// Applies heuristic punctuation to one finalized utterance
///
/// Pure and deterministic. Operates on a whole utterance, not the running
/// transcript, and is NOT idempotent: re-applying it to its own output can
/// double-append punctuation, so callers apply it exactly once per segment.
///
/// # Arguments
/// * `raw` - Raw recognizer output for one finalized segment
/// * `locale` - Locale tag selecting vocabulary and rules; unknown tags fall
///   back to the default locale's table with no locale-specific pass
#[must_use]
pub fn format(raw: &str, locale: &str) -> String {
    let text = collapse_whitespace(raw);
    if text.is_empty() {
        // The capitalization step indexes the first character; never let an
        // empty utterance reach it.
        return text;
    }

    let vocab = vocab::lookup(locale);
    let text = match rules_for(locale) {
        LocaleRules::Swedish => {
            let marked = apply_locale_marks(text, vocab);
            title_case_categories(marked, vocab)
        }
        LocaleRules::English => apply_locale_marks(text, vocab),
        LocaleRules::Other => text,
    };

    let formatted = apply_common_formatting(text, vocab);
    debug!(locale = locale, len = formatted.len(), "segment formatted");
    formatted
}

/// Collapse internal whitespace runs to single spaces and trim the ends
fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Question mark, exclamation mark, and quotation rewriting
///
/// The question and exclamation patterns are anchored to end-of-string, so
/// only the last trigger word of the utterance can fire, and only when no
/// terminal punctuation already follows it.
fn apply_locale_marks(text: String, vocab: &Vocabulary) -> String {
    let mut text = text;

    if let Some(re) = vocab.category(Category::QuestionWords) {
        text = re
            .replace_all(&text, |caps: &Captures| format!("{}?", &caps[0]))
            .into_owned();
    }

    if let Some(re) = vocab.category(Category::Exclamations) {
        text = re
            .replace_all(&text, |caps: &Captures| format!("{}!", &caps[0]))
            .into_owned();
    }

    // "sa att hon kommer" -> "sa \"hon kommer\"": wrap the reported clause
    // and drop the connective word.
    if let Some(re) = vocab.category(Category::Quotations) {
        text = re
            .replace_all(&text, |caps: &Captures| {
                let verb = &caps[1];
                let clause = caps.get(3).map_or("", |m| m.as_str()).trim();
                format!("{verb} \"{clause}\"")
            })
            .into_owned();
    }

    text
}

/// Swedish enrichment: title-case every substring matched by any category,
/// walking the table in order
///
/// Runs after punctuation insertion; a matched category can re-lowercase a
/// sentence start capitalized by an earlier step (see DESIGN.md).
fn title_case_categories(text: String, vocab: &Vocabulary) -> String {
    let mut text = text;
    for (_, re) in vocab.categories() {
        text = re
            .replace_all(&text, |caps: &Captures| title_case(&caps[0]))
            .into_owned();
    }
    text
}

fn title_case(matched: &str) -> String {
    let mut chars = matched.chars();
    chars.next().map_or_else(String::new, |first| {
        let mut out: String = first.to_uppercase().collect();
        out.push_str(&chars.as_str().to_lowercase());
        out
    })
}

#[allow(clippy::expect_used)] // Static pattern, exercised by tests
static TERMINAL_BEFORE_LETTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.!?])\s*([a-zA-Z])").expect("static pattern compiles"));

/// Formatting applied to every locale: sentence-start capitalization, comma
/// before conjunctions, and a default trailing period
fn apply_common_formatting(text: String, vocab: &Vocabulary) -> String {
    let text = TERMINAL_BEFORE_LETTER
        .replace_all(&text, |caps: &Captures| {
            format!("{} {}", &caps[1], caps[2].to_uppercase())
        })
        .into_owned();

    // All occurrences, unlike the end-anchored trigger patterns.
    let text = vocab
        .conjunction_spacing()
        .replace_all(&text, |caps: &Captures| {
            format!(", {} ", caps[1].to_lowercase())
        })
        .into_owned();

    let mut out = capitalize_first(&text);
    if !out.ends_with(['.', '!', '?']) {
        out.push('.');
    }
    out
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        let mut out: String = first.to_uppercase().collect();
        out.push_str(chars.as_str());
        out
    })
}
