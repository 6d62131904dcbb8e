//! Trigram similarity in the style of PostgreSQL's pg_trgm
//!
//! Each word is lowercased and padded with two leading blanks and one
//! trailing blank before being cut into trigrams. Similarity is the
//! Jaccard index of the two trigram sets.

use std::collections::HashSet;

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn word_trigrams(word: &str, out: &mut HashSet<[char; 3]>) {
    let padded: Vec<char> = "  "
        .chars()
        .chain(word.chars())
        .chain(std::iter::once(' '))
        .collect();
    for window in padded.windows(3) {
        out.insert([window[0], window[1], window[2]]);
    }
}

/// Trigram set of a text
pub fn trigrams(text: &str) -> HashSet<[char; 3]> {
    let mut set = HashSet::new();
    for word in words(text) {
        word_trigrams(&word, &mut set);
    }
    set
}

/// Jaccard similarity of the trigram sets, in `0.0..=1.0`
pub fn similarity(a: &str, b: &str) -> f64 {
    similarity_of(&trigrams(a), &trigrams(b))
}

fn similarity_of(a: &HashSet<[char; 3]>, b: &HashSet<[char; 3]>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

/// Best similarity between `query` and either the whole of `text` or any
/// single word in it
pub fn best_match(query: &str, text: &str) -> f64 {
    let query_set = trigrams(query);
    let mut best = similarity_of(&query_set, &trigrams(text));
    for word in words(text) {
        let mut word_set = HashSet::new();
        word_trigrams(&word, &mut word_set);
        best = best.max(similarity_of(&query_set, &word_set));
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_trigrams() {
        let set = trigrams("Cat");
        let expected: HashSet<[char; 3]> = [
            [' ', ' ', 'c'],
            [' ', 'c', 'a'],
            ['c', 'a', 't'],
            ['a', 't', ' '],
        ]
        .into_iter()
        .collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn test_similarity_values() {
        assert_eq!(similarity("report", "report"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert_eq!(similarity("", "abc"), 0.0);
        // 6 shared of 9 distinct trigrams
        let s = similarity("invoic", "invoice");
        assert!((s - 6.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_best_match_uses_words() {
        let whole = similarity("quarterly", "Quarterly Budget Review 2024");
        let best = best_match("quarterly", "Quarterly Budget Review 2024");
        assert!(best > whole);
        assert_eq!(best, 1.0);
        assert!(best_match("quartrly", "Quarterly Budget") >= 0.3);
        assert!(best_match("zebra", "Quarterly Budget") < 0.3);
    }
}
