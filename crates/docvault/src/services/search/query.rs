//! Query normalization shared by every strategy

/// Minimum normalized length for prefix and trigram matching
pub const MIN_FUZZY_CHARS: usize = 3;

/// A user query in the forms the strategies consume
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedQuery {
    raw: String,
    normalized: String,
    tokens: Vec<String>,
}

impl NormalizedQuery {
    /// Lowercase and split on anything that is not a letter or digit
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let lowered = raw.to_lowercase();
        let tokens: Vec<String> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            normalized: tokens.join(" "),
            raw,
            tokens,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_blank(&self) -> bool {
        self.raw.is_empty()
    }

    /// Length of the normalized form in characters
    pub fn normalized_len(&self) -> usize {
        self.normalized.chars().count()
    }

    /// Whether the raw text has anything besides wildcards and whitespace
    pub fn has_literal(&self) -> bool {
        self.raw
            .chars()
            .any(|c| !matches!(c, '*' | '?') && !c.is_whitespace())
    }

    /// FTS5 expression requiring every token
    pub(crate) fn fts_all_terms(&self) -> Option<String> {
        if self.tokens.is_empty() {
            return None;
        }
        Some(
            self.tokens
                .iter()
                .map(|t| format!("\"{}\"", t))
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    /// FTS5 expression matching any long-enough token as a prefix
    pub(crate) fn fts_prefix_terms(&self) -> Option<String> {
        let terms: Vec<String> = self
            .tokens
            .iter()
            .filter(|t| t.chars().count() >= MIN_FUZZY_CHARS)
            .map(|t| format!("\"{}\"*", t))
            .collect();
        if terms.is_empty() {
            None
        } else {
            Some(terms.join(" OR "))
        }
    }

    /// LIKE pattern: `*` and `?` become `%` and `_`, everything else is
    /// literal, and the whole pattern matches as a substring
    pub(crate) fn like_pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.raw.len() + 2);
        pattern.push('%');
        for c in self.raw.chars() {
            match c {
                '*' => pattern.push('%'),
                '?' => pattern.push('_'),
                '%' | '_' | '\\' => {
                    pattern.push('\\');
                    pattern.push(c);
                }
                _ => pattern.push(c),
            }
        }
        pattern.push('%');
        pattern
    }
}
