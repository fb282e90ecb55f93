//! Input Classifier module
//!
//! Classification maps free text to a set of planning domains. It is a pure
//! function behind an interface, so the keyword implementation can be swapped
//! for an ML classifier without touching the scheduler.

use std::collections::{BTreeSet, HashMap};

use crate::types::Domain;

/// Classifier trait - pure text-to-domains mapping
pub trait InputClassifier: Send + Sync {
    /// Classify text into zero or more domains. An empty set is a valid
    /// outcome, not an error.
    fn classify(&self, text: &str) -> BTreeSet<Domain>;
}

/// Keyword-based classifier. Case-insensitive substring matching against a
/// configured keyword table.
pub struct KeywordClassifier {
    keywords: HashMap<Domain, Vec<String>>,
}

impl KeywordClassifier {
    /// Create a classifier from a keyword table
    pub fn new(keywords: HashMap<Domain, Vec<String>>) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|(domain, terms)| {
                (
                    domain,
                    terms.into_iter().map(|t| t.to_lowercase()).collect(),
                )
            })
            .collect();
        Self { keywords }
    }

    /// Built-in keyword table covering the stock party domains
    pub fn with_defaults() -> Self {
        let mut keywords: HashMap<Domain, Vec<String>> = HashMap::new();
        keywords.insert(
            "theme".to_string(),
            vec!["theme", "jungle", "pirate", "princess", "superhero", "decoration style"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        keywords.insert(
            "venue".to_string(),
            vec!["venue", "location", "hall", "garden", "park", "backyard", "restaurant"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        keywords.insert(
            "cake".to_string(),
            vec!["cake", "dessert", "cupcake", "bakery"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        keywords.insert(
            "catering".to_string(),
            vec!["catering", "food", "menu", "dinner", "buffet", "snacks"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        keywords.insert(
            "entertainment".to_string(),
            vec!["entertainment", "music", "band", "dj", "magician", "games"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        keywords.insert(
            "budget".to_string(),
            vec!["budget", "cost", "spend", "price", "cheap", "expensive"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        Self::new(keywords)
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl InputClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> BTreeSet<Domain> {
        let lowered = text.to_lowercase();
        let mut domains = BTreeSet::new();
        for (domain, terms) in &self.keywords {
            if terms.iter().any(|term| lowered.contains(term.as_str())) {
                domains.insert(domain.clone());
            }
        }
        tracing::debug!(
            domains = ?domains,
            chars = text.len(),
            "classified input"
        );
        domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_classifier_matches_multiple_domains() {
        let classifier = KeywordClassifier::with_defaults();
        let domains = classifier.classify("Jungle theme with a big cake in the park");
        assert!(domains.contains("theme"));
        assert!(domains.contains("cake"));
        assert!(domains.contains("venue"));
    }

    #[test]
    fn test_empty_classification_is_valid() {
        let classifier = KeywordClassifier::with_defaults();
        assert!(classifier.classify("hello there").is_empty());
        assert!(classifier.classify("").is_empty());
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let classifier = KeywordClassifier::new(HashMap::from([(
            "venue".to_string(),
            vec!["Garden".to_string()],
        )]));
        assert!(classifier.classify("a GARDEN party").contains("venue"));
    }
}
