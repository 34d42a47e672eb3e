//! A workflow's step graph joined with its handler bindings, validated once.

use crate::alias::InputSpec;
use crate::error::WorkflowError;
use crate::handler::HandlerBinding;
use crate::id::{ActionId, WorkflowId};
use crate::step::{StepGraph, StepNode};
use std::collections::HashMap;

/// A step node paired with its handler binding.
#[derive(Debug, Clone)]
pub struct BoundStep {
    node: StepNode,
    binding: HandlerBinding,
}

impl BoundStep {
    /// Returns the action name.
    pub fn action(&self) -> &ActionId {
        self.node.action()
    }

    /// Returns the graph node.
    pub fn node(&self) -> &StepNode {
        &self.node
    }

    /// Returns the handler binding.
    pub fn binding(&self) -> &HandlerBinding {
        &self.binding
    }

    /// Returns `true` when a failure later in the workflow rolls this step back:
    /// the step is not marked `noCompensation` and it has a compensate handler.
    pub fn is_compensable(&self) -> bool {
        self.node.is_compensable() && self.binding.is_compensable()
    }
}

/// A registered workflow: its graph and bindings, checked for wiring defects.
///
/// Construction rejects every defect that would otherwise surface during an
/// execution, so a definition that exists can always be run.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    id: WorkflowId,
    graph: StepGraph,
    steps: Vec<BoundStep>,
    index: HashMap<ActionId, usize>,
}

impl WorkflowDefinition {
    /// Joins a graph with its bindings.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Configuration`] if an action is bound twice
    /// - [`WorkflowError::UnknownAction`] if a binding names an action the graph lacks
    /// - [`WorkflowError::MissingHandler`] if a graph action has no binding
    /// - [`WorkflowError::DuplicateAlias`] if an input spec repeats an alias
    /// - [`WorkflowError::UnresolvedReference`] if a step reads from a step
    ///   that does not precede it
    pub fn new<A>(
        id: impl Into<WorkflowId>,
        graph: StepGraph,
        bindings: impl IntoIterator<Item = (A, HandlerBinding)>,
    ) -> Result<Self, WorkflowError>
    where
        A: Into<ActionId>,
    {
        let mut by_action: HashMap<ActionId, HandlerBinding> = HashMap::new();
        for (action, binding) in bindings {
            let action = action.into();
            if !graph.contains(action.as_str()) {
                return Err(WorkflowError::UnknownAction(action));
            }
            if by_action.contains_key(&action) {
                return Err(WorkflowError::Configuration(format!(
                    "action '{}' is bound more than once",
                    action
                )));
            }
            by_action.insert(action, binding);
        }

        let mut steps = Vec::with_capacity(graph.len());
        let mut index = HashMap::with_capacity(graph.len());
        for node in graph.nodes() {
            let binding = by_action
                .remove(node.action())
                .ok_or_else(|| WorkflowError::MissingHandler(node.action().clone()))?;

            check_spec(&graph, node.action(), binding.input(), false)?;
            if binding.has_compensation_input() {
                check_spec(&graph, node.action(), binding.compensation_input(), true)?;
            }

            index.insert(node.action().clone(), steps.len());
            steps.push(BoundStep {
                node: node.clone(),
                binding,
            });
        }

        Ok(Self {
            id: id.into(),
            graph,
            steps,
            index,
        })
    }

    /// Returns the workflow id.
    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    /// Returns the step graph.
    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    /// Returns the bound steps in execution order.
    pub fn steps(&self) -> &[BoundStep] {
        &self.steps
    }

    /// Returns the bound step for an action.
    pub fn step(&self, action: &str) -> Option<&BoundStep> {
        self.index.get(action).map(|&i| &self.steps[i])
    }

    /// Returns the step whose output is the workflow's result by default:
    /// the last one in execution order.
    pub fn terminal(&self) -> Option<&ActionId> {
        self.steps.last().map(BoundStep::action)
    }
}

fn check_spec(
    graph: &StepGraph,
    action: &ActionId,
    spec: &InputSpec,
    allow_self: bool,
) -> Result<(), WorkflowError> {
    if let Some(alias) = spec.duplicate_alias() {
        return Err(WorkflowError::DuplicateAlias {
            action: action.clone(),
            alias: alias.to_string(),
        });
    }

    for alias_ref in spec.refs() {
        let Some(from) = alias_ref.source().action() else {
            continue;
        };
        let reachable = (allow_self && from == action) || graph.precedes(from.as_str(), action.as_str());
        if !reachable {
            return Err(WorkflowError::UnresolvedReference {
                action: action.clone(),
                from: from.clone(),
                alias: alias_ref.alias().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasRef;
    use crate::error::HandlerError;
    use crate::handler::{compensate_fn, invoke_fn};
    use crate::step::StepDefinition;
    use serde_json::Value;

    fn noop() -> HandlerBinding {
        HandlerBinding::new(invoke_fn(|_input: Value| async move {
            Ok::<_, HandlerError>(Value::Null)
        }))
    }

    fn chain() -> StepGraph {
        StepGraph::new([
            StepDefinition::new("setContext").no_compensation(),
            StepDefinition::new("findRegion")
                .no_compensation()
                .then(StepDefinition::new("createCart")),
        ])
        .expect("valid graph")
    }

    #[test]
    fn test_valid_definition() {
        let definition = WorkflowDefinition::new(
            "create-cart",
            chain(),
            [
                ("setContext", noop().with_input([AliasRef::input("context")])),
                ("findRegion", noop().with_input([AliasRef::input("region")])),
                (
                    "createCart",
                    noop()
                        .with_input([AliasRef::action("findRegion", "region")])
                        .with_compensation(compensate_fn(|_input: Value| async move {
                            Ok::<_, HandlerError>(())
                        }))
                        .with_compensation_input([AliasRef::action("createCart", "cart")]),
                ),
            ],
        )
        .expect("valid definition");

        assert_eq!(definition.steps().len(), 3);
        assert_eq!(definition.terminal().map(ActionId::as_str), Some("createCart"));
        assert!(definition.step("createCart").is_some_and(BoundStep::is_compensable));
        assert!(!definition.step("findRegion").is_some_and(BoundStep::is_compensable));
    }

    #[test]
    fn test_reference_to_non_ancestor_rejected() {
        let result = WorkflowDefinition::new(
            "create-cart",
            chain(),
            [
                ("setContext", noop()),
                ("findRegion", noop()),
                (
                    "createCart",
                    noop().with_input([AliasRef::action("setContext", "context")]),
                ),
            ],
        );
        assert!(matches!(
            result,
            Err(WorkflowError::UnresolvedReference { action, from, alias })
                if action == "createCart" && from == "setContext" && alias == "context"
        ));
    }

    #[test]
    fn test_invoke_cannot_read_own_output() {
        let result = WorkflowDefinition::new(
            "create-cart",
            chain(),
            [
                ("setContext", noop()),
                ("findRegion", noop()),
                ("createCart", noop().with_input([AliasRef::action("createCart", "cart")])),
            ],
        );
        assert!(matches!(result, Err(WorkflowError::UnresolvedReference { .. })));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let result = WorkflowDefinition::new(
            "create-cart",
            chain(),
            [
                ("setContext", noop()),
                ("findRegion", noop()),
                (
                    "createCart",
                    noop().with_input([
                        AliasRef::input("region"),
                        AliasRef::action("findRegion", "region"),
                    ]),
                ),
            ],
        );
        assert!(matches!(
            result,
            Err(WorkflowError::DuplicateAlias { alias, .. }) if alias == "region"
        ));
    }

    #[test]
    fn test_missing_and_unknown_handlers() {
        let result = WorkflowDefinition::new(
            "create-cart",
            chain(),
            [("setContext", noop()), ("findRegion", noop())],
        );
        assert!(matches!(
            result,
            Err(WorkflowError::MissingHandler(action)) if action == "createCart"
        ));

        let result = WorkflowDefinition::new(
            "create-cart",
            chain(),
            [
                ("setContext", noop()),
                ("findRegion", noop()),
                ("createCart", noop()),
                ("removeCart", noop()),
            ],
        );
        assert!(matches!(
            result,
            Err(WorkflowError::UnknownAction(action)) if action == "removeCart"
        ));
    }

    #[test]
    fn test_double_binding_rejected() {
        let result = WorkflowDefinition::new(
            "create-cart",
            chain(),
            [
                ("setContext", noop()),
                ("setContext", noop()),
                ("findRegion", noop()),
                ("createCart", noop()),
            ],
        );
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
    }
}
