//! Tokenization and TF-IDF cosine similarity for the local intent matcher
//! (spec §4.3 "Local Matcher", resolved concretely in SPEC_FULL §4.3.1).
//!
//! Corresponds to `butler/core/algorithms.py::text_cosine_similarity`'s
//! scikit-learn `TfidfVectorizer` + `cosine_similarity` pipeline, fit on
//! exactly the two texts being compared. Reimplemented here without an
//! external ML dependency (none of the example repos pull one in for text
//! similarity) as a small pairwise TF-IDF: for each candidate docstring,
//! the vocabulary is just the union of tokens in the utterance and that one
//! docstring, so "corpus" means "this pair", not the whole intent set.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

static WORD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

/// Lower-cases and splits on Unicode word boundaries, discarding
/// non-alphanumeric runs (spec §4.3.1 "Tokenization").
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn term_frequencies(tokens: &[String]) -> HashMap<&str, f64> {
    let mut counts: HashMap<&str, f64> = HashMap::new();
    for t in tokens {
        *counts.entry(t.as_str()).or_insert(0.0) += 1.0;
    }
    let total = tokens.len() as f64;
    if total > 0.0 {
        for v in counts.values_mut() {
            *v /= total;
        }
    }
    counts
}

/// Cosine similarity between the TF-IDF vectors of `utterance` and
/// `docstring`, computed over the two-document pair (idf is 1 or 2 per
/// term depending on whether it occurs in one or both texts). Returns
/// `0.0` for a zero vector on either side rather than `NaN` (spec §4.3.1).
pub fn tfidf_cosine_similarity(utterance: &[String], docstring: &[String]) -> f64 {
    if utterance.is_empty() || docstring.is_empty() {
        return 0.0;
    }

    let vocab: HashSet<&str> = utterance
        .iter()
        .chain(docstring.iter())
        .map(|s| s.as_str())
        .collect();

    let tf_a = term_frequencies(utterance);
    let tf_b = term_frequencies(docstring);

    let idf = |term: &str| -> f64 {
        let df = [&tf_a, &tf_b].iter().filter(|m| m.contains_key(term)).count() as f64;
        // Standard smoothed idf over a two-document corpus: ln((1+N)/(1+df)) + 1.
        ((1.0 + 2.0) / (1.0 + df)).ln() + 1.0
    };

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for term in &vocab {
        let weight = idf(term);
        let a = tf_a.get(term).copied().unwrap_or(0.0) * weight;
        let b = tf_b.get(term).copied().unwrap_or(0.0) * weight;
        dot += a * b;
        norm_a += a * a;
        norm_b += b * b;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_splits_on_punctuation() {
        let tokens = tokenize("What's the Weather in Berlin?");
        assert_eq!(
            tokens,
            vec!["what", "s", "the", "weather", "in", "berlin"]
        );
    }

    #[test]
    fn identical_texts_have_similarity_one() {
        let a = tokenize("open the browser");
        let b = tokenize("open the browser");
        let sim = tfidf_cosine_similarity(&a, &b);
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_texts_have_similarity_zero() {
        let a = tokenize("open the browser");
        let b = tokenize("play music loudly");
        let sim = tfidf_cosine_similarity(&a, &b);
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn empty_inputs_never_produce_nan() {
        let a: Vec<String> = Vec::new();
        let b = tokenize("anything");
        assert_eq!(tfidf_cosine_similarity(&a, &b), 0.0);
        assert_eq!(tfidf_cosine_similarity(&b, &a), 0.0);
    }

    #[test]
    fn partial_overlap_is_between_zero_and_one() {
        let a = tokenize("set the volume to eleven");
        let b = tokenize("set the brightness to max");
        let sim = tfidf_cosine_similarity(&a, &b);
        assert!(sim > 0.0 && sim < 1.0);
    }
}
