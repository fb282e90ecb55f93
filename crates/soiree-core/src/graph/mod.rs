//! Dependency Graph module
//!
//! Static domain-to-domain dependency edges: whenever an upstream domain's
//! result changes, every downstream domain must be rerun or invalidated.
//! The graph is loaded once at startup, validated, and never mutated.

use std::collections::{BTreeSet, HashMap, HashSet};

use thiserror::Error;

use crate::types::Domain;

/// Priority assigned to domains with no configured entry. Lower runs earlier.
const DEFAULT_PRIORITY: u32 = 100;

/// Graph validation errors
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("dependency graph contains cycle involving domain: {0}")]
    CycleDetected(String),

    #[error("edge references empty domain name")]
    EmptyDomain,
}

/// DependencyGraph - static downstream edges plus stable priorities
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<Domain, BTreeSet<Domain>>,
    priorities: HashMap<Domain, u32>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from edge and priority maps
    pub fn from_parts(
        edges: HashMap<Domain, BTreeSet<Domain>>,
        priorities: HashMap<Domain, u32>,
    ) -> Self {
        Self { edges, priorities }
    }

    /// Add a downstream edge (builder style)
    pub fn with_edge(mut self, upstream: impl Into<Domain>, downstream: impl Into<Domain>) -> Self {
        self.edges
            .entry(upstream.into())
            .or_default()
            .insert(downstream.into());
        self
    }

    /// Set a domain's scheduling priority (builder style); lower runs earlier
    pub fn with_priority(mut self, domain: impl Into<Domain>, priority: u32) -> Self {
        self.priorities.insert(domain.into(), priority);
        self
    }

    /// Downstream domains of the given domain
    pub fn downstream_of(&self, domain: &str) -> BTreeSet<Domain> {
        self.edges.get(domain).cloned().unwrap_or_default()
    }

    /// Upstream domains of the given domain
    pub fn upstream_of(&self, domain: &str) -> BTreeSet<Domain> {
        self.edges
            .iter()
            .filter(|(_, downstream)| downstream.contains(domain))
            .map(|(upstream, _)| upstream.clone())
            .collect()
    }

    /// Stable scheduling priority for a domain
    pub fn priority(&self, domain: &str) -> u32 {
        self.priorities.get(domain).copied().unwrap_or(DEFAULT_PRIORITY)
    }

    /// All domains reachable from the seed set via downstream edges,
    /// including the seeds themselves. This is the justification closure:
    /// a domain is justified iff it is tagged directly or reachable from a
    /// tagged domain.
    pub fn closure(&self, seeds: &BTreeSet<Domain>) -> BTreeSet<Domain> {
        let mut reached: BTreeSet<Domain> = seeds.clone();
        let mut frontier: Vec<Domain> = seeds.iter().cloned().collect();
        while let Some(domain) = frontier.pop() {
            for downstream in self.downstream_of(&domain) {
                if reached.insert(downstream.clone()) {
                    frontier.push(downstream);
                }
            }
        }
        reached
    }

    /// Validate the graph: non-empty domain names, no cycles.
    ///
    /// The scheduler assumes acyclicity by construction; a cyclic config is
    /// rejected at startup instead of being detected at runtime.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (upstream, downstream) in &self.edges {
            if upstream.trim().is_empty() {
                return Err(GraphError::EmptyDomain);
            }
            if downstream.iter().any(|d| d.trim().is_empty()) {
                return Err(GraphError::EmptyDomain);
            }
        }
        self.detect_cycles()
    }

    /// Detect cycles using DFS
    fn detect_cycles(&self) -> Result<(), GraphError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        fn dfs<'a>(
            node: &'a str,
            edges: &'a HashMap<Domain, BTreeSet<Domain>>,
            visited: &mut HashSet<&'a str>,
            rec_stack: &mut HashSet<&'a str>,
        ) -> Option<&'a str> {
            visited.insert(node);
            rec_stack.insert(node);

            if let Some(neighbors) = edges.get(node) {
                for neighbor in neighbors {
                    if !visited.contains(neighbor.as_str()) {
                        if let Some(cycle_node) = dfs(neighbor, edges, visited, rec_stack) {
                            return Some(cycle_node);
                        }
                    } else if rec_stack.contains(neighbor.as_str()) {
                        return Some(neighbor);
                    }
                }
            }

            rec_stack.remove(node);
            None
        }

        for node in self.edges.keys() {
            if !visited.contains(node.as_str()) {
                if let Some(cycle_node) = dfs(node, &self.edges, &mut visited, &mut rec_stack) {
                    return Err(GraphError::CycleDetected(cycle_node.to_string()));
                }
            }
        }

        Ok(())
    }

    /// Order domains for scheduling: domains with no unmet upstream
    /// dependency first, ties broken by priority then name. `unmet` reports
    /// whether a given upstream domain has not yet produced a result.
    ///
    /// This is an ordering hint for efficiency, not a hard barrier.
    pub fn schedule_order<F>(&self, domains: BTreeSet<Domain>, unmet: F) -> Vec<Domain>
    where
        F: Fn(&str) -> bool,
    {
        let mut ordered: Vec<Domain> = domains.into_iter().collect();
        ordered.sort_by_key(|domain| {
            let unmet_upstream = self
                .upstream_of(domain)
                .iter()
                .filter(|up| unmet(up))
                .count();
            (unmet_upstream > 0, self.priority(domain), domain.clone())
        });
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party_graph() -> DependencyGraph {
        DependencyGraph::new()
            .with_edge("theme", "cake")
            .with_edge("theme", "decoration")
            .with_edge("venue", "catering")
            .with_priority("theme", 10)
            .with_priority("venue", 20)
            .with_priority("cake", 30)
    }

    #[test]
    fn test_downstream_and_upstream_lookups() {
        let graph = party_graph();
        assert_eq!(
            graph.downstream_of("theme"),
            BTreeSet::from(["cake".to_string(), "decoration".to_string()])
        );
        assert_eq!(
            graph.upstream_of("cake"),
            BTreeSet::from(["theme".to_string()])
        );
        assert!(graph.downstream_of("cake").is_empty());
    }

    #[test]
    fn test_closure_includes_transitive_downstream() {
        let graph = DependencyGraph::new()
            .with_edge("theme", "cake")
            .with_edge("cake", "bakery");
        let closure = graph.closure(&BTreeSet::from(["theme".to_string()]));
        assert_eq!(
            closure,
            BTreeSet::from([
                "theme".to_string(),
                "cake".to_string(),
                "bakery".to_string()
            ])
        );
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let graph = DependencyGraph::new()
            .with_edge("theme", "cake")
            .with_edge("cake", "theme");
        assert!(matches!(
            graph.validate(),
            Err(GraphError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_validate_accepts_acyclic_graph() {
        assert!(party_graph().validate().is_ok());
    }

    #[test]
    fn test_schedule_order_puts_unblocked_domains_first() {
        let graph = party_graph();
        let domains = BTreeSet::from([
            "cake".to_string(),
            "theme".to_string(),
            "venue".to_string(),
        ]);
        // Nothing has a result yet, so cake's upstream (theme) is unmet.
        let ordered = graph.schedule_order(domains, |_| true);
        assert_eq!(ordered, vec!["theme", "venue", "cake"]);
    }

    #[test]
    fn test_schedule_order_ties_break_by_priority() {
        let graph = DependencyGraph::new()
            .with_priority("venue", 5)
            .with_priority("theme", 1);
        let domains = BTreeSet::from(["venue".to_string(), "theme".to_string()]);
        let ordered = graph.schedule_order(domains, |_| false);
        assert_eq!(ordered, vec!["theme", "venue"]);
    }
}
