//! Complexity Router module
//!
//! The router scores each input deterministically and picks the cheap
//! fast-path extractor or the expensive slow-path planner. Both paths
//! produce the same NormalizedPlan contract, so downstream consumers never
//! care which path ran.
//!
//! Scoring is auditable: every contributing signal is recorded as a named
//! reason on the assessment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::classifier::InputClassifier;
use crate::types::NormalizedPlan;

/// Slow-path planner errors
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("planner provider error: {0}")]
    Provider(String),

    #[error("planning was cancelled")]
    Cancelled,
}

/// Routing outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePath {
    /// Deterministic extraction
    Fast,
    /// Generative planning
    Slow,
}

/// ComplexityAssessment - ephemeral scoring result, produced per input,
/// logged and discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityAssessment {
    /// Final clamped score (0-100); higher means simpler
    pub score: u8,
    /// Chosen path
    pub path: RoutePath,
    /// Named signals that contributed to the score
    pub reasons: Vec<String>,
}

/// Fixed signal weights for the scoring algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterWeights {
    /// Explicit event-category keyword present
    pub explicit_category: i16,
    /// Explicit count (digits) present
    pub explicit_count: i16,
    /// Explicit date or location hint present
    pub explicit_date_or_location: i16,
    /// Input is short
    pub short_text: i16,
    /// Input is delimiter-structured
    pub structured: i16,
    /// Narrative / subjective vocabulary present (subtracted)
    pub narrative: i16,
    /// Input is very long (subtracted)
    pub long_text: i16,
    /// An image description accompanies the input (subtracted)
    pub image_description: i16,
}

impl Default for RouterWeights {
    fn default() -> Self {
        Self {
            explicit_category: 25,
            explicit_count: 20,
            explicit_date_or_location: 15,
            short_text: 15,
            structured: 10,
            narrative: 25,
            long_text: 15,
            image_description: 20,
        }
    }
}

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Score at or above this routes fast; ties favor the cheaper path
    pub cutoff: u8,
    /// Signal weights
    pub weights: RouterWeights,
    /// Timeout applied to every slow-path call
    pub slow_path_timeout: Duration,
    /// Inputs shorter than this count as "short"
    pub short_text_chars: usize,
    /// Inputs longer than this count as "very long"
    pub long_text_chars: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cutoff: 50,
            weights: RouterWeights::default(),
            slow_path_timeout: Duration::from_secs(20),
            short_text_chars: 120,
            long_text_chars: 600,
        }
    }
}

/// Fast-path extractor - synchronous, deterministic, no network I/O
pub trait FastExtractor: Send + Sync {
    /// Extract a normalized plan from text
    fn extract(&self, text: &str) -> NormalizedPlan;
}

/// Slow-path planner - may call external inference services; must honor the
/// caller-supplied timeout and cancellation token.
#[async_trait]
pub trait SlowPlanner: Send + Sync {
    /// Produce a normalized plan from text and an optional image description
    async fn plan(
        &self,
        text: &str,
        image_description: Option<&str>,
    ) -> Result<NormalizedPlan, PlanError>;
}

/// Result of routing one input
#[derive(Debug, Clone)]
pub struct RoutedPlan {
    /// The assessment that picked the path
    pub assessment: ComplexityAssessment,
    /// The normalized plan the chosen path produced
    pub plan: NormalizedPlan,
}

const CATEGORY_KEYWORDS: &[&str] = &[
    "birthday",
    "wedding",
    "anniversary",
    "shower",
    "graduation",
    "party",
    "corporate",
    "retirement",
];

const DATE_LOCATION_HINTS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "monday", "tuesday", "wednesday", "thursday", "friday",
    "saturday", "sunday", "tomorrow", "next week", "downtown", "rooftop",
];

const NARRATIVE_VOCABULARY: &[&str] = &[
    "love",
    "loves",
    "elegant",
    "beautiful",
    "special",
    "memorable",
    "dream",
    "cozy",
    "feel",
    "something",
];

/// ComplexityRouter - scores inputs and delegates to the chosen path
pub struct ComplexityRouter {
    config: RouterConfig,
    fast: Arc<dyn FastExtractor>,
    slow: Arc<dyn SlowPlanner>,
}

impl ComplexityRouter {
    /// Create a new router
    pub fn new(
        config: RouterConfig,
        fast: Arc<dyn FastExtractor>,
        slow: Arc<dyn SlowPlanner>,
    ) -> Self {
        Self { config, fast, slow }
    }

    /// Score an input. Deterministic and side-effect free.
    pub fn assess(&self, text: &str, image_description: Option<&str>) -> ComplexityAssessment {
        let trimmed = text.trim();
        // Empty input is maximally simple: fast path, empty plan, no error.
        if trimmed.is_empty() {
            return ComplexityAssessment {
                score: 100,
                path: RoutePath::Fast,
                reasons: vec!["empty_input".to_string()],
            };
        }

        let weights = &self.config.weights;
        let lowered = trimmed.to_lowercase();
        let mut score: i32 = 0;
        let mut reasons = Vec::new();

        if CATEGORY_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            score += i32::from(weights.explicit_category);
            reasons.push("explicit_category".to_string());
        }
        if lowered.chars().any(|c| c.is_ascii_digit()) {
            score += i32::from(weights.explicit_count);
            reasons.push("explicit_count".to_string());
        }
        if DATE_LOCATION_HINTS.iter().any(|k| lowered.contains(k)) {
            score += i32::from(weights.explicit_date_or_location);
            reasons.push("explicit_date_or_location".to_string());
        }
        if trimmed.chars().count() < self.config.short_text_chars {
            score += i32::from(weights.short_text);
            reasons.push("short_text".to_string());
        }
        let delimiters = trimmed
            .chars()
            .filter(|c| matches!(c, ',' | ';' | '|' | '\n'))
            .count();
        if delimiters >= 2 {
            score += i32::from(weights.structured);
            reasons.push("structured".to_string());
        }

        if NARRATIVE_VOCABULARY
            .iter()
            .any(|k| contains_word(&lowered, k))
        {
            score -= i32::from(weights.narrative);
            reasons.push("narrative_vocabulary".to_string());
        }
        if trimmed.chars().count() > self.config.long_text_chars {
            score -= i32::from(weights.long_text);
            reasons.push("long_text".to_string());
        }
        if image_description.is_some() {
            score -= i32::from(weights.image_description);
            reasons.push("image_description".to_string());
        }

        let score = score.clamp(0, 100) as u8;
        let path = if score >= self.config.cutoff {
            RoutePath::Fast
        } else {
            RoutePath::Slow
        };

        ComplexityAssessment {
            score,
            path,
            reasons,
        }
    }

    /// Route an input through the chosen path.
    ///
    /// Never blocks indefinitely on the slow path and never raises for a
    /// failed provider: on timeout, cancellation, or provider error the
    /// result is a degraded plan with confidence 0 and `path_failed` set.
    pub async fn route(
        &self,
        text: &str,
        image_description: Option<&str>,
        cancel: &CancellationToken,
    ) -> RoutedPlan {
        let assessment = self.assess(text, image_description);
        tracing::debug!(
            score = assessment.score,
            path = ?assessment.path,
            reasons = ?assessment.reasons,
            "assessed input complexity"
        );

        let plan = match assessment.path {
            RoutePath::Fast => {
                if text.trim().is_empty() {
                    NormalizedPlan::empty()
                } else {
                    self.fast.extract(text)
                }
            }
            RoutePath::Slow => {
                let planning = self.slow.plan(text, image_description);
                tokio::select! {
                    outcome = tokio::time::timeout(self.config.slow_path_timeout, planning) => {
                        match outcome {
                            Ok(Ok(plan)) => plan,
                            Ok(Err(e)) => {
                                tracing::warn!(error = %e, "slow path failed, degrading");
                                NormalizedPlan::degraded(format!("slow path failed: {}", e))
                            }
                            Err(_) => {
                                tracing::warn!(
                                    timeout_ms = self.config.slow_path_timeout.as_millis() as u64,
                                    "slow path timed out, degrading"
                                );
                                NormalizedPlan::degraded("slow path timed out")
                            }
                        }
                    }
                    _ = cancel.cancelled() => {
                        tracing::warn!("slow path cancelled, degrading");
                        NormalizedPlan::degraded("slow path cancelled")
                    }
                }
            }
        };

        RoutedPlan { assessment, plan }
    }
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

/// Default fast-path extractor: pure keyword and digit pulls, categories
/// delegated to the injected classifier.
pub struct FieldExtractor {
    classifier: Arc<dyn InputClassifier>,
}

impl FieldExtractor {
    /// Create a new extractor backed by a classifier
    pub fn new(classifier: Arc<dyn InputClassifier>) -> Self {
        Self { classifier }
    }
}

impl FastExtractor for FieldExtractor {
    fn extract(&self, text: &str) -> NormalizedPlan {
        let trimmed = text.trim();
        let lowered = trimmed.to_lowercase();
        let mut plan = NormalizedPlan::empty();

        if let Some(category) = CATEGORY_KEYWORDS.iter().find(|k| lowered.contains(*k)) {
            plan.set_field("event_type", json!(category));
        }
        if let Some(count) = first_integer(trimmed) {
            plan.set_field("guest_count", json!(count));
        }
        if let Some(hint) = DATE_LOCATION_HINTS.iter().find(|k| lowered.contains(*k)) {
            plan.set_field("when_or_where", json!(hint));
        }

        plan.categories = self.classifier.classify(trimmed);
        plan.summary = trimmed.to_string();
        plan.confidence = if plan.fields.is_empty() { 0.5 } else { 0.9 };
        plan
    }
}

fn first_integer(text: &str) -> Option<u64> {
    let mut digits = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() {
            break;
        }
    }
    digits.parse().ok()
}
