//! Builtin domain agents.
//!
//! Deterministic, network-free agents for the stock party domains. They are
//! intentionally simple: real deployments inject their own `DomainAgent`
//! implementations (search-backed, LLM-backed) through the registry; these
//! exist so the pipeline runs end-to-end out of the box and in tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use soiree_core::graph::DependencyGraph;
use soiree_core::router::{PlanError, SlowPlanner};
use soiree_core::types::{Input, NormalizedPlan, Session};

use crate::registry::{AgentError, AgentRegistry, DomainAgent};

fn joined_content(inputs: &[Input]) -> String {
    inputs
        .iter()
        .map(|i| i.content.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

fn guest_count(session: &Session) -> u64 {
    for input in session.active_inputs() {
        let mut digits = String::new();
        for c in input.content.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if !digits.is_empty() {
                break;
            }
        }
        if let Ok(count) = digits.parse() {
            return count;
        }
    }
    20
}

/// Theme agent: picks a theme keyword out of the contributing inputs.
pub struct ThemeAgent;

#[async_trait]
impl DomainAgent for ThemeAgent {
    fn domain(&self) -> &str {
        "theme"
    }

    fn description(&self) -> &str {
        "suggests a party theme and palette"
    }

    async fn run(
        &self,
        _snapshot: &Session,
        inputs: &[Input],
        _cancel: CancellationToken,
    ) -> Result<(Value, f64), AgentError> {
        let content = joined_content(inputs).to_lowercase();
        let (theme, palette, confidence) = if content.contains("jungle") {
            ("jungle", "green and gold", 0.9)
        } else if content.contains("pirate") {
            ("pirate", "black and red", 0.9)
        } else if content.contains("princess") {
            ("princess", "pink and silver", 0.9)
        } else {
            ("classic", "white and gold", 0.5)
        };
        Ok((
            json!({
                "summary": format!("{} theme, {} palette", theme, palette),
                "theme": theme,
                "palette": palette,
                "estimated_cost": 120.0,
            }),
            confidence,
        ))
    }
}

/// Venue agent: sizes a venue suggestion from the guest count. Tolerates a
/// missing theme result (upstream context is an ordering hint, not a
/// barrier).
pub struct VenueAgent;

#[async_trait]
impl DomainAgent for VenueAgent {
    fn domain(&self) -> &str {
        "venue"
    }

    fn description(&self) -> &str {
        "suggests a venue sized for the guest count"
    }

    async fn run(
        &self,
        snapshot: &Session,
        inputs: &[Input],
        _cancel: CancellationToken,
    ) -> Result<(Value, f64), AgentError> {
        let guests = guest_count(snapshot);
        let content = joined_content(inputs).to_lowercase();
        let venue = if content.contains("garden") || content.contains("park") {
            "botanical garden pavilion"
        } else if guests > 80 {
            "event hall"
        } else {
            "community clubhouse"
        };
        Ok((
            json!({
                "summary": format!("{} for ~{} guests", venue, guests),
                "venue": venue,
                "capacity": guests + guests / 5,
                "estimated_cost": 400.0 + (guests as f64) * 8.0,
            }),
            0.8,
        ))
    }
}

/// Cake agent: matches the cake to the theme result when one exists.
pub struct CakeAgent;

#[async_trait]
impl DomainAgent for CakeAgent {
    fn domain(&self) -> &str {
        "cake"
    }

    fn description(&self) -> &str {
        "suggests a cake matching the theme"
    }

    async fn run(
        &self,
        snapshot: &Session,
        _inputs: &[Input],
        _cancel: CancellationToken,
    ) -> Result<(Value, f64), AgentError> {
        // Upstream theme may be missing; fall back gracefully.
        let theme = snapshot
            .result("theme")
            .and_then(|r| r.payload.get("theme"))
            .and_then(|v| v.as_str())
            .unwrap_or("classic")
            .to_string();
        let guests = guest_count(snapshot);
        Ok((
            json!({
                "summary": format!("two-tier {} cake for {} guests", theme, guests),
                "flavor": "vanilla and chocolate",
                "matches_theme": theme,
                "estimated_cost": 80.0 + (guests as f64) * 2.5,
            }),
            if theme == "classic" { 0.6 } else { 0.85 },
        ))
    }
}

/// Catering agent: proposes a menu scaled to the guest count.
pub struct CateringAgent;

#[async_trait]
impl DomainAgent for CateringAgent {
    fn domain(&self) -> &str {
        "catering"
    }

    fn description(&self) -> &str {
        "proposes a menu scaled to the guest count"
    }

    async fn run(
        &self,
        snapshot: &Session,
        inputs: &[Input],
        _cancel: CancellationToken,
    ) -> Result<(Value, f64), AgentError> {
        let guests = guest_count(snapshot);
        let content = joined_content(inputs).to_lowercase();
        let style = if content.contains("buffet") {
            "buffet"
        } else if guests > 60 {
            "stations"
        } else {
            "plated dinner"
        };
        Ok((
            json!({
                "summary": format!("{} for {} guests", style, guests),
                "style": style,
                "estimated_cost": (guests as f64) * 22.0,
            }),
            0.75,
        ))
    }
}

/// Registry with every builtin agent registered.
pub fn default_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(ThemeAgent));
    registry.register(Arc::new(VenueAgent));
    registry.register(Arc::new(CakeAgent));
    registry.register(Arc::new(CateringAgent));
    registry
}

/// Stock dependency graph for the builtin domains: cake follows the theme,
/// catering follows the venue.
pub fn default_graph() -> DependencyGraph {
    DependencyGraph::new()
        .with_edge("theme", "cake")
        .with_edge("venue", "catering")
        .with_priority("theme", 10)
        .with_priority("venue", 20)
        .with_priority("cake", 30)
        .with_priority("catering", 40)
}

/// Slow planner stub for deployments without an inference backend: always
/// errors, so the router degrades slow-path inputs instead of hanging.
pub struct UnavailablePlanner;

#[async_trait]
impl SlowPlanner for UnavailablePlanner {
    async fn plan(
        &self,
        _text: &str,
        _image_description: Option<&str>,
    ) -> Result<NormalizedPlan, PlanError> {
        Err(PlanError::Provider(
            "no slow-path planner configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn session_with(contents: &[&str]) -> (Session, Vec<Input>) {
        let mut session = Session::new("party-1");
        let mut inputs = Vec::new();
        for content in contents {
            let input = Input::text(*content, "user");
            session.add_input(input.clone());
            inputs.push(input);
        }
        (session, inputs)
    }

    #[test]
    fn test_theme_agent_detects_jungle() {
        tokio_test::block_on(async {
            let (session, inputs) = session_with(&["jungle theme please"]);
            let (payload, confidence) = ThemeAgent
                .run(&session, &inputs, CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(payload["theme"], "jungle");
            assert!(confidence > 0.8);
        });
    }

    #[test]
    fn test_cake_agent_tolerates_missing_theme() {
        tokio_test::block_on(async {
            let (session, inputs) = session_with(&["a cake for 30 guests"]);
            let (payload, confidence) = CakeAgent
                .run(&session, &inputs, CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(payload["matches_theme"], "classic");
            assert!(confidence < 0.7);
        });
    }

    #[test]
    fn test_cake_agent_follows_completed_theme() {
        tokio_test::block_on(async {
            let (mut session, inputs) = session_with(&["50 guests"]);
            let mut theme = soiree_core::types::AgentResult::scheduled("theme", BTreeSet::new());
            theme.complete(json!({"theme": "pirate"}), 0.9);
            session.set_result(theme);

            let (payload, confidence) = CakeAgent
                .run(&session, &inputs, CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(payload["matches_theme"], "pirate");
            assert!(confidence > 0.8);
        });
    }

    #[test]
    fn test_venue_agent_scales_with_guest_count() {
        tokio_test::block_on(async {
            let (session, inputs) = session_with(&["120 guests expected"]);
            let (payload, _) = VenueAgent
                .run(&session, &inputs, CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(payload["venue"], "event hall");
        });
    }

    #[test]
    fn test_default_graph_is_valid() {
        assert!(default_graph().validate().is_ok());
    }
}
