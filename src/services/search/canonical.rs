//! Canonical normalization for entity terms.
//!
//! `canonical` produces the matching key used to compare surface forms:
//! all spellings of the same logical identifier collapse to one string.
//!
//!     canonical("ENG-0008-103") == canonical("eng 0008 103") == "eng0008103"
//!     canonical("four c") == canonical("4-C") == "4c"
//!
//! Pipeline (ordered): trim -> lowercase -> expand number words -> strip
//! separators. Idempotent and deterministic; an input that trims to empty
//! yields "" and the caller drops the term.
//!
//! `canonical_identifier` is the storage-form sibling used for EXACT
//! matching: it uppercases but keeps structural punctuation, because the
//! backing tables store identifiers with their hyphens intact.

/// Closed dictionary of number words. Deliberately small: identifiers only
/// ever embed low ordinals ("generator one", "four c").
const NUMBER_WORDS: &[(&str, &str)] = &[
    ("zero", "0"),
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
    ("ten", "10"),
];

/// Separators stripped between alphanumerics.
const SEPARATORS: &[char] = &['-', '_', '/', '.'];

/// Matching-key normalization. Idempotent: `canonical(canonical(x)) == canonical(x)`.
pub fn canonical(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let lowered = trimmed.to_lowercase();
    let expanded = expand_number_words(&lowered);
    strip_separators(&expanded)
}

/// Storage-form normalization for EXACT probes: uppercase, structure kept.
pub fn canonical_identifier(text: &str) -> String {
    text.trim().to_uppercase()
}

fn expand_number_words(text: &str) -> String {
    let mut out = Vec::new();
    for word in text.split_whitespace() {
        let replaced = NUMBER_WORDS
            .iter()
            .find(|(w, _)| *w == word)
            .map(|(_, d)| (*d).to_string())
            .unwrap_or_else(|| word.to_string());
        out.push(replaced);
    }
    out.join(" ")
}

/// Remove declared separators between alphanumerics. A space is stripped
/// only when it sits inside an identifier-looking token, i.e. when at least
/// one neighbour is a digit ("4 c" -> "4c", "generator 1" -> "generator1")
/// so that plain prose ("fuel filter") keeps its word boundary.
fn strip_separators(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(chars.len());

    for (i, &c) in chars.iter().enumerate() {
        let prev = out.chars().last();
        let next = chars[i + 1..].iter().find(|n| !n.is_whitespace()).copied();

        let is_sep = SEPARATORS.contains(&c);
        let is_space = c == ' ';

        if is_sep || is_space {
            let prev_alnum = prev.is_some_and(|p| p.is_alphanumeric());
            let next_alnum = next.is_some_and(|n| n.is_alphanumeric());
            if prev_alnum && next_alnum {
                let digit_neighbour = prev.is_some_and(|p| p.is_ascii_digit())
                    || next.is_some_and(|n| n.is_ascii_digit());
                if is_sep || digit_neighbour {
                    continue;
                }
            }
        }
        out.push(c);
    }

    // Collapse any whitespace runs left behind by stripped separators.
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
