//! String helpers shared across the preprocessing pipeline.

/// Clean an optional string field: trim and drop empty values.
#[inline]
pub fn clean_optional_string(s: Option<&String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// String cleaning extension trait.
pub trait StringExt {
    /// Trim; empty results become `None`.
    fn clean(&self) -> Option<String>;

    /// Trimmed copy.
    fn trimmed(&self) -> String;

    /// True when the value looks like a structured identifier rather than
    /// prose: no internal whitespace and at least one digit.
    fn looks_like_identifier(&self) -> bool;
}

impl StringExt for str {
    #[inline]
    fn clean(&self) -> Option<String> {
        let trimmed = self.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    }

    #[inline]
    fn trimmed(&self) -> String {
        self.trim().to_string()
    }

    fn looks_like_identifier(&self) -> bool {
        let t = self.trim();
        !t.is_empty()
            && !t.chars().any(char::is_whitespace)
            && t.chars().any(|c| c.is_ascii_digit())
    }
}

impl StringExt for String {
    #[inline]
    fn clean(&self) -> Option<String> {
        self.as_str().clean()
    }

    #[inline]
    fn trimmed(&self) -> String {
        self.as_str().trimmed()
    }

    #[inline]
    fn looks_like_identifier(&self) -> bool {
        self.as_str().looks_like_identifier()
    }
}
