//! Workflow Planner (spec §4.4).
//!
//! Corresponds to `package/workflow_manager.py::WorkflowManager`: parses a
//! small spec-file DSL describing modules, their execution cost, a
//! display position, and their dependencies; builds a dependency DAG;
//! topologically orders it; and finds the minimum-cost path from a start
//! node using a DP shortest-path over the DAG's edges (spec §4.4
//! "cost[v] edge-weight semantics").

use std::collections::{HashMap, VecDeque};

use crate::error::{CoreError, CoreResult};
use crate::registry::ExtensionRegistry;
use crate::tool::InvokeArgs;

/// One parsed line of the workflow spec: `<module> <cost> <position_key>[ <csv_deps>]`,
/// where `csv_deps` is a single comma-separated token (spec §4.4.1).
#[derive(Debug, Clone)]
struct SpecLine {
    module: String,
    cost: u64,
    position_key: String,
    deps: Vec<String>,
}

/// Parse the spec-file DSL. Blank lines and lines starting with `#` are
/// skipped. A negative or unparsable cost is an `InvalidSpec` error (spec
/// §4.4 "Invariants").
fn parse_spec(text: &str) -> CoreResult<Vec<SpecLine>> {
    let mut lines = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let module = parts
            .next()
            .ok_or_else(|| CoreError::InvalidSpec(format!("line {}: missing module name", lineno + 1)))?
            .to_string();
        let cost_str = parts
            .next()
            .ok_or_else(|| CoreError::InvalidSpec(format!("line {}: missing cost", lineno + 1)))?;
        let cost: i64 = cost_str
            .parse()
            .map_err(|_| CoreError::InvalidSpec(format!("line {}: cost is not a number", lineno + 1)))?;
        if cost < 0 {
            return Err(CoreError::InvalidSpec(format!(
                "line {}: cost must not be negative",
                lineno + 1
            )));
        }
        let position_key = parts
            .next()
            .ok_or_else(|| CoreError::InvalidSpec(format!("line {}: missing position key", lineno + 1)))?
            .to_string();
        // Dependencies, if present, are a single comma-separated token (spec
        // §4.4.1 "<module> <cost> <position_key>[ <csv_deps>]"), not further
        // whitespace-separated fields.
        let deps = match parts.next() {
            Some(csv) => csv
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
            None => Vec::new(),
        };
        lines.push(SpecLine {
            module,
            cost: cost as u64,
            position_key,
            deps,
        });
    }
    Ok(lines)
}

/// The parsed dependency graph: nodes are every declared module plus every
/// module referenced only as a dependency (spec §4.4 "undeclared deps get
/// cost 0"); edges run dependency -> dependent.
pub struct DependencyGraph {
    costs: HashMap<String, u64>,
    positions: HashMap<String, String>,
    deps: HashMap<String, Vec<String>>,
    order: Vec<String>,
}

impl DependencyGraph {
    /// Parse and build a graph from spec-file text.
    pub fn from_spec(text: &str) -> CoreResult<Self> {
        let lines = parse_spec(text)?;
        let mut costs = HashMap::new();
        let mut positions = HashMap::new();
        let mut deps: HashMap<String, Vec<String>> = HashMap::new();
        let mut order = Vec::new();

        for line in &lines {
            if !costs.contains_key(&line.module) {
                order.push(line.module.clone());
            }
            costs.insert(line.module.clone(), line.cost);
            positions.insert(line.module.clone(), line.position_key.clone());
            deps.insert(line.module.clone(), line.deps.clone());
            for dep in &line.deps {
                if !costs.contains_key(dep) {
                    costs.insert(dep.clone(), 0);
                    order.push(dep.clone());
                }
            }
        }

        Ok(Self {
            costs,
            positions,
            deps,
            order,
        })
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn cost(&self, module: &str) -> Option<u64> {
        self.costs.get(module).copied()
    }

    /// The display position a module was declared with, a pure passthrough
    /// for external consumers (spec §4.4.1).
    pub fn position(&self, module: &str) -> Option<&str> {
        self.positions.get(module).map(|s| s.as_str())
    }

    fn dependents_of(&self, module: &str) -> Vec<&str> {
        self.deps
            .iter()
            .filter(|(_, deps)| deps.iter().any(|d| d == module))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Deterministic topological sort (Kahn's algorithm, ties broken by
    /// node name) over dependency -> dependent edges. Returns
    /// `CyclicGraph` if the graph isn't a DAG.
    pub fn topological_order(&self) -> CoreResult<Vec<String>> {
        let mut indegree: HashMap<&str, usize> = self.order.iter().map(|n| (n.as_str(), 0)).collect();
        // edge direction: dep -> module, so module's indegree = number of its deps.
        for module in &self.order {
            let count = self.deps.get(module).map(|d| d.len()).unwrap_or(0);
            indegree.insert(module.as_str(), count);
        }

        let mut ready: Vec<&str> = indegree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(n, _)| *n)
            .collect();
        ready.sort();
        let mut queue: VecDeque<&str> = ready.into();
        let mut result = Vec::new();
        let mut remaining = indegree.clone();

        while let Some(node) = queue.pop_front() {
            result.push(node.to_string());
            let mut newly_ready = Vec::new();
            for dependent in self.dependents_of(node) {
                if let Some(deg) = remaining.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(dependent);
                    }
                }
            }
            newly_ready.sort();
            for n in newly_ready {
                queue.push_back(n);
            }
        }

        if result.len() != self.order.len() {
            return Err(CoreError::CyclicGraph);
        }
        Ok(result)
    }

    /// Minimum-cost path from `start` to every reachable node, via a DP
    /// shortest path over the topological order: `dist[start] = 0`, and for
    /// each node in order, relax every dependent with `dist[v] + cost[v]`
    /// (spec §4.4 "cost[v] edge-weight semantics": a node's cost is paid
    /// when leaving it along an edge, not when entering).
    pub fn shortest_cost_path(&self, start: &str, goal: &str) -> CoreResult<Option<Vec<String>>> {
        let order = self.topological_order()?;
        if !self.costs.contains_key(start) {
            return Ok(None);
        }

        let mut dist: HashMap<&str, u64> = HashMap::new();
        let mut pred: HashMap<&str, &str> = HashMap::new();
        dist.insert(start, 0);

        for node in &order {
            let Some(&d) = dist.get(node.as_str()) else {
                continue;
            };
            let edge_cost = self.costs.get(node.as_str()).copied().unwrap_or(0);
            for dependent in self.dependents_of(node) {
                let candidate = d + edge_cost;
                let better = match dist.get(dependent) {
                    None => true,
                    Some(&existing) => candidate < existing,
                };
                if better {
                    dist.insert(dependent, candidate);
                    pred.insert(dependent, node.as_str());
                }
            }
        }

        if !dist.contains_key(goal) {
            return Ok(None);
        }

        let mut path = vec![goal.to_string()];
        let mut current = goal;
        while current != start {
            let Some(&p) = pred.get(current) else {
                break;
            };
            path.push(p.to_string());
            current = p;
        }
        path.reverse();
        Ok(Some(path))
    }

    /// Execute every module in `plan`, in order, through the extension
    /// registry. When `stop_on_error` is set the first failing invocation
    /// aborts the remaining plan; otherwise every module still runs and all
    /// results are collected (spec §4.4 "execute(plan)").
    pub async fn execute(
        &self,
        plan: &[String],
        registry: &ExtensionRegistry,
        stop_on_error: bool,
    ) -> Vec<(String, CoreResult<crate::tool::ToolResult>)> {
        let mut results = Vec::new();
        for module in plan {
            let result = registry.invoke(module, InvokeArgs::Program(Vec::new())).await;
            let failed = result.is_err();
            results.push((module.clone(), result));
            if failed && stop_on_error {
                break;
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_and_skips_comments() {
        let spec = "# header\nfetch 2 top\nprocess 3 mid fetch\n\nstore 1 bottom process\n";
        let graph = DependencyGraph::from_spec(spec).unwrap();
        assert_eq!(graph.cost("fetch"), Some(2));
        assert_eq!(graph.position("process"), Some("mid"));
    }

    #[test]
    fn rejects_negative_cost() {
        let spec = "fetch -1 top\n";
        let err = DependencyGraph::from_spec(spec).unwrap_err();
        assert_eq!(err.kind(), "InvalidSpec");
    }

    #[test]
    fn undeclared_dependency_gets_zero_cost() {
        let spec = "process 3 mid fetch\n";
        let graph = DependencyGraph::from_spec(spec).unwrap();
        assert_eq!(graph.cost("fetch"), Some(0));
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let spec = "fetch 1 a\nprocess 1 b fetch\nstore 1 c process\n";
        let graph = DependencyGraph::from_spec(spec).unwrap();
        let order = graph.topological_order().unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("fetch") < pos("process"));
        assert!(pos("process") < pos("store"));
    }

    #[test]
    fn cyclic_graph_is_detected() {
        let spec = "a 1 p1 b\nb 1 p2 a\n";
        let graph = DependencyGraph::from_spec(spec).unwrap();
        let err = graph.topological_order().unwrap_err();
        assert_eq!(err.kind(), "CyclicGraph");
    }

    #[test]
    fn shortest_cost_path_prefers_cheaper_route() {
        // fetch -> process (cost 5) -> store
        // fetch -> cache (cost 1) -> store
        let spec = "fetch 0 a\nprocess 5 b fetch\ncache 1 c fetch\nstore 0 d process,cache\n";
        let graph = DependencyGraph::from_spec(spec).unwrap();
        let path = graph.shortest_cost_path("fetch", "store").unwrap().unwrap();
        assert_eq!(path, vec!["fetch".to_string(), "cache".to_string(), "store".to_string()]);
    }

    #[test]
    fn shortest_cost_path_returns_none_when_unreachable() {
        let spec = "a 1 p1\nb 1 p2\n";
        let graph = DependencyGraph::from_spec(spec).unwrap();
        assert!(graph.shortest_cost_path("a", "b").unwrap().is_none());
    }
}
