//! Step declarations and the validated step graph built from them.

use crate::error::WorkflowError;
use crate::id::ActionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Declaration of one step and its successors.
///
/// Serializes to the nested shape `{ "action", "noCompensation", "next" }`,
/// where `next` is absent, a single step, or a list of steps.
///
/// # Examples
///
/// ```
/// use musubi_core::StepDefinition;
///
/// let steps = StepDefinition::new("findRegion")
///     .no_compensation()
///     .then(StepDefinition::new("createCart").then(
///         StepDefinition::new("generateLineItems").no_compensation(),
///     ));
///
/// assert_eq!(steps.action.as_str(), "findRegion");
/// assert!(steps.no_compensation);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StepDefinition {
    /// The action this step runs.
    pub action: ActionId,
    /// Skip rollback for this step even when later steps fail.
    #[serde(default)]
    pub no_compensation: bool,
    /// Steps that start once this one completes.
    #[serde(default, skip_serializing_if = "Next::is_none")]
    pub next: Next,
}

impl StepDefinition {
    /// Declares a compensable step with no successors.
    pub fn new(action: impl Into<ActionId>) -> Self {
        Self {
            action: action.into(),
            no_compensation: false,
            next: Next::None,
        }
    }

    /// Marks the step as not compensable.
    pub fn no_compensation(mut self) -> Self {
        self.no_compensation = true;
        self
    }

    /// Chains a single successor.
    pub fn then(mut self, step: StepDefinition) -> Self {
        self.next = Next::One(Box::new(step));
        self
    }

    /// Fans out to several successors.
    pub fn branch(mut self, steps: impl IntoIterator<Item = StepDefinition>) -> Self {
        self.next = Next::Many(steps.into_iter().collect());
        self
    }
}

/// Successors of a step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Next {
    /// No successor.
    #[default]
    None,
    /// A single successor.
    One(Box<StepDefinition>),
    /// An ordered fan-out.
    Many(Vec<StepDefinition>),
}

impl Next {
    /// Returns `true` when there is no successor.
    pub fn is_none(&self) -> bool {
        match self {
            Next::None => true,
            Next::One(_) => false,
            Next::Many(steps) => steps.is_empty(),
        }
    }

    /// Returns the successors in declaration order.
    pub fn steps(&self) -> &[StepDefinition] {
        match self {
            Next::None => &[],
            Next::One(step) => std::slice::from_ref(step.as_ref()),
            Next::Many(steps) => steps,
        }
    }
}

// The root may itself be a step, or only carry `next`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RootDefinition {
    #[serde(default)]
    action: Option<ActionId>,
    #[serde(default)]
    no_compensation: bool,
    #[serde(default)]
    next: Next,
}

/// A step within a [`StepGraph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepNode {
    action: ActionId,
    compensable: bool,
    parent: Option<ActionId>,
    children: Vec<ActionId>,
}

impl StepNode {
    /// Returns the action name.
    pub fn action(&self) -> &ActionId {
        &self.action
    }

    /// Returns `false` when the step was declared with `noCompensation`.
    pub fn is_compensable(&self) -> bool {
        self.compensable
    }

    /// Returns the step this one follows, or `None` for a root.
    pub fn parent(&self) -> Option<&ActionId> {
        self.parent.as_ref()
    }

    /// Returns the direct successors.
    pub fn children(&self) -> &[ActionId] {
        &self.children
    }
}

/// Validated, acyclic step graph stored as an arena addressed by [`ActionId`].
///
/// Nodes are kept in execution order: depth-first pre-order following
/// declaration order, so every step comes after all of its ancestors.
///
/// # Examples
///
/// ```
/// use musubi_core::{StepDefinition, StepGraph};
///
/// let graph = StepGraph::new([
///     StepDefinition::new("findRegion").then(StepDefinition::new("createCart")),
///     StepDefinition::new("setContext"),
/// ])?;
///
/// let order: Vec<&str> = graph.execution_order().map(|a| a.as_str()).collect();
/// assert_eq!(order, vec!["findRegion", "createCart", "setContext"]);
/// assert!(graph.precedes("findRegion", "createCart"));
/// assert!(!graph.precedes("setContext", "createCart"));
/// # Ok::<(), musubi_core::WorkflowError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepGraph {
    nodes: Vec<StepNode>,
    index: HashMap<ActionId, usize>,
    roots: Vec<ActionId>,
}

impl StepGraph {
    /// Builds a graph from its root steps.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Configuration`] if there are no steps
    /// - [`WorkflowError::DuplicateAction`] if an action is declared twice
    pub fn new(roots: impl IntoIterator<Item = StepDefinition>) -> Result<Self, WorkflowError> {
        let roots: Vec<StepDefinition> = roots.into_iter().collect();
        if roots.is_empty() {
            return Err(WorkflowError::Configuration(
                "step graph must contain at least one step".to_string(),
            ));
        }

        let mut graph = StepGraph {
            nodes: Vec::new(),
            index: HashMap::new(),
            roots: roots.iter().map(|s| s.action.clone()).collect(),
        };
        for root in &roots {
            graph.insert(root, None)?;
        }
        Ok(graph)
    }

    /// Builds a graph from a JSON declaration.
    ///
    /// The root is either `{ "next": ... }` or a step in its own right,
    /// `{ "action": ..., "noCompensation": ..., "next": ... }`.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Configuration`] for malformed JSON, including unknown
    /// keys, or a root that sets `noCompensation` without an `action`.
    pub fn from_json(definition: Value) -> Result<Self, WorkflowError> {
        let root: RootDefinition = serde_json::from_value(definition)
            .map_err(|e| WorkflowError::Configuration(format!("invalid step graph: {}", e)))?;
        match root.action {
            Some(action) => Self::new([StepDefinition {
                action,
                no_compensation: root.no_compensation,
                next: root.next,
            }]),
            None if root.no_compensation => Err(WorkflowError::Configuration(
                "invalid step graph: root sets noCompensation without an action".to_string(),
            )),
            None => Self::new(root.next.steps().iter().cloned()),
        }
    }

    fn insert(&mut self, step: &StepDefinition, parent: Option<usize>) -> Result<(), WorkflowError> {
        if self.index.contains_key(&step.action) {
            return Err(WorkflowError::DuplicateAction(step.action.clone()));
        }

        let position = self.nodes.len();
        let parent = parent.map(|p| self.nodes[p].action.clone());
        self.index.insert(step.action.clone(), position);
        self.nodes.push(StepNode {
            action: step.action.clone(),
            compensable: !step.no_compensation,
            parent,
            children: step.next.steps().iter().map(|s| s.action.clone()).collect(),
        });

        for child in step.next.steps() {
            self.insert(child, Some(position))?;
        }
        Ok(())
    }

    /// Returns the node for an action.
    pub fn node(&self, action: &str) -> Option<&StepNode> {
        self.index.get(action).map(|&i| &self.nodes[i])
    }

    /// Returns `true` if the graph declares the action.
    pub fn contains(&self, action: &str) -> bool {
        self.index.contains_key(action)
    }

    /// Returns the root steps in declaration order.
    pub fn roots(&self) -> &[ActionId] {
        &self.roots
    }

    /// Returns all nodes in execution order.
    pub fn nodes(&self) -> &[StepNode] {
        &self.nodes
    }

    /// Returns the actions in execution order.
    pub fn execution_order(&self) -> impl Iterator<Item = &ActionId> {
        self.nodes.iter().map(|n| &n.action)
    }

    /// Returns the last step in execution order.
    pub fn terminal(&self) -> Option<&ActionId> {
        self.nodes.last().map(|n| &n.action)
    }

    /// Returns the number of steps.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no steps.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the strict ancestors of an action, nearest first.
    pub fn ancestors(&self, action: &str) -> Vec<&ActionId> {
        let mut ancestors = Vec::new();
        let mut current = self.node(action).and_then(|n| n.parent.as_ref());
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.node(parent.as_str()).and_then(|n| n.parent.as_ref());
        }
        ancestors
    }

    /// Returns `true` if `earlier` is a strict ancestor of `later`, so it is
    /// guaranteed to complete first.
    pub fn precedes(&self, earlier: &str, later: &str) -> bool {
        self.ancestors(later).iter().any(|a| a.as_str() == earlier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cart_graph() -> StepGraph {
        StepGraph::new([StepDefinition::new("findRegion")
            .no_compensation()
            .then(StepDefinition::new("createCart").branch([
                StepDefinition::new("generateLineItems").no_compensation(),
                StepDefinition::new("attachLineItems"),
            ]))])
        .expect("valid graph")
    }

    #[test]
    fn test_execution_order_follows_declaration() {
        let graph = cart_graph();
        let order: Vec<&str> = graph.execution_order().map(ActionId::as_str).collect();
        assert_eq!(
            order,
            vec!["findRegion", "createCart", "generateLineItems", "attachLineItems"]
        );
        assert_eq!(graph.terminal().map(ActionId::as_str), Some("attachLineItems"));
    }

    #[test]
    fn test_node_links() {
        let graph = cart_graph();
        let create = graph.node("createCart").expect("exists");
        assert!(create.is_compensable());
        assert_eq!(create.parent().map(ActionId::as_str), Some("findRegion"));
        assert_eq!(create.children().len(), 2);

        let find = graph.node("findRegion").expect("exists");
        assert!(!find.is_compensable());
        assert_eq!(find.parent(), None);
    }

    #[test]
    fn test_ancestors() {
        let graph = cart_graph();
        let ancestors: Vec<&str> = graph
            .ancestors("attachLineItems")
            .into_iter()
            .map(ActionId::as_str)
            .collect();
        assert_eq!(ancestors, vec!["createCart", "findRegion"]);

        assert!(graph.precedes("findRegion", "attachLineItems"));
        // Siblings carry no ordering guarantee.
        assert!(!graph.precedes("generateLineItems", "attachLineItems"));
        assert!(!graph.precedes("createCart", "createCart"));
    }

    #[test]
    fn test_duplicate_action_rejected() {
        let result = StepGraph::new([
            StepDefinition::new("findRegion").then(StepDefinition::new("createCart")),
            StepDefinition::new("createCart"),
        ]);
        assert!(matches!(
            result,
            Err(WorkflowError::DuplicateAction(action)) if action == "createCart"
        ));
    }

    #[test]
    fn test_empty_graph_rejected() {
        let result = StepGraph::new(Vec::new());
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
    }

    #[test]
    fn test_from_json() {
        let graph = StepGraph::from_json(json!({
            "next": [
                { "action": "setContext", "noCompensation": true },
                {
                    "action": "findRegion",
                    "noCompensation": true,
                    "next": {
                        "action": "createCart",
                        "next": { "action": "generateLineItems", "noCompensation": true }
                    }
                }
            ]
        }))
        .expect("valid graph");

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.roots().len(), 2);
        assert!(graph.node("createCart").is_some_and(StepNode::is_compensable));
        assert!(graph.precedes("findRegion", "generateLineItems"));
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        let result = StepGraph::from_json(json!({ "next": [{ "noCompensation": true }] }));
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
    }

    #[test]
    fn test_from_json_root_step() {
        let graph = StepGraph::from_json(json!({
            "action": "findRegion",
            "noCompensation": true,
            "next": { "action": "createCart" }
        }))
        .expect("valid graph");

        let order: Vec<&str> = graph.execution_order().map(ActionId::as_str).collect();
        assert_eq!(order, vec!["findRegion", "createCart"]);
        assert!(graph.node("findRegion").is_some_and(|n| !n.is_compensable()));
        assert!(graph.precedes("findRegion", "createCart"));
    }

    #[test]
    fn test_from_json_rejects_unknown_keys() {
        let typo = StepGraph::from_json(json!({
            "next": { "action": "createCart", "noCompensaton": true }
        }));
        assert!(matches!(typo, Err(WorkflowError::Configuration(_))));

        let root_typo = StepGraph::from_json(json!({
            "actoin": "findRegion",
            "next": { "action": "createCart" }
        }));
        assert!(matches!(root_typo, Err(WorkflowError::Configuration(_))));

        let orphan_flag = StepGraph::from_json(json!({
            "noCompensation": true,
            "next": { "action": "createCart" }
        }));
        assert!(matches!(orphan_flag, Err(WorkflowError::Configuration(_))));
    }

    #[test]
    fn test_definition_round_trip_shape() {
        let step = StepDefinition::new("createCart").then(StepDefinition::new("attachLineItems"));
        let value = serde_json::to_value(&step).expect("serialize");
        assert_eq!(
            value,
            json!({
                "action": "createCart",
                "noCompensation": false,
                "next": { "action": "attachLineItems", "noCompensation": false }
            })
        );
    }
}
