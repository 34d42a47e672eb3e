//! Alias references and the resolver that builds handler inputs from them.

use crate::context::ExecutionContext;
use crate::error::ResolveError;
use crate::id::ActionId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Reserved source name for the workflow's original input payload.
pub const INPUT_SOURCE: &str = "$input";

/// Where an alias reads its value from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Source {
    /// The payload passed to the workflow.
    Input,
    /// The recorded output of a step.
    Action(ActionId),
}

impl Source {
    /// Returns the referenced step, or `None` for the workflow input.
    pub fn action(&self) -> Option<&ActionId> {
        match self {
            Source::Input => None,
            Source::Action(action) => Some(action),
        }
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        if s == INPUT_SOURCE {
            Source::Input
        } else {
            Source::Action(ActionId::from(s))
        }
    }
}

impl From<Source> for String {
    fn from(source: Source) -> Self {
        match source {
            Source::Input => INPUT_SOURCE.to_string(),
            Source::Action(action) => action.as_str().to_string(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Input => write!(f, "{}", INPUT_SOURCE),
            Source::Action(action) => write!(f, "{}", action),
        }
    }
}

/// A pointer to the workflow input or to a completed step's output, bound to an alias.
///
/// # Examples
///
/// ```
/// use musubi_core::AliasRef;
///
/// // The whole workflow input, exposed to the handler as `cart`.
/// let cart = AliasRef::input("cart");
///
/// // The `id` field of the `findRegion` output, exposed as `region_id`.
/// let region = AliasRef::action("findRegion", "region_id").field("id");
/// assert_eq!(region.alias(), "region_id");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRef {
    from: Source,
    alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl AliasRef {
    /// References the workflow input.
    pub fn input(alias: impl Into<String>) -> Self {
        Self {
            from: Source::Input,
            alias: alias.into(),
            field: None,
        }
    }

    /// References the output of a step.
    pub fn action(from: impl Into<ActionId>, alias: impl Into<String>) -> Self {
        Self {
            from: Source::Action(from.into()),
            alias: alias.into(),
            field: None,
        }
    }

    /// Narrows the reference to one member of the source object.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Returns the source of the reference.
    pub fn source(&self) -> &Source {
        &self.from
    }

    /// Returns the alias name.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Resolves the reference against a running execution.
    pub fn resolve(&self, ctx: &ExecutionContext) -> Result<Value, ResolveError> {
        let value = match &self.from {
            Source::Input => ctx.input(),
            Source::Action(action) => ctx.output(action.as_str()).ok_or_else(|| ResolveError {
                from: action.clone(),
                alias: self.alias.clone(),
            })?,
        };
        Ok(match &self.field {
            // Missing members read as null.
            Some(field) => value.get(field).cloned().unwrap_or(Value::Null),
            None => value.clone(),
        })
    }
}

/// Ordered list of alias references describing one handler's input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputSpec(Vec<AliasRef>);

impl InputSpec {
    /// Creates an input spec from its references.
    pub fn new(refs: impl IntoIterator<Item = AliasRef>) -> Self {
        Self(refs.into_iter().collect())
    }

    /// Returns the references in declaration order.
    pub fn refs(&self) -> &[AliasRef] {
        &self.0
    }

    /// Returns `true` if the spec has no references.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the first alias name bound more than once, if any.
    pub fn duplicate_alias(&self) -> Option<&str> {
        self.0.iter().enumerate().find_map(|(i, r)| {
            self.0[..i]
                .iter()
                .any(|earlier| earlier.alias == r.alias)
                .then_some(r.alias.as_str())
        })
    }

    /// Builds the handler input: an object keyed by alias name.
    ///
    /// Pure and synchronous; resolving the same spec twice within one
    /// execution yields the same value.
    pub fn resolve(&self, ctx: &ExecutionContext) -> Result<Value, ResolveError> {
        let mut object = Map::with_capacity(self.0.len());
        for alias_ref in &self.0 {
            object.insert(alias_ref.alias.clone(), alias_ref.resolve(ctx)?);
        }
        Ok(Value::Object(object))
    }
}

impl FromIterator<AliasRef> for InputSpec {
    fn from_iter<I: IntoIterator<Item = AliasRef>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<const N: usize> From<[AliasRef; N]> for InputSpec {
    fn from(refs: [AliasRef; N]) -> Self {
        Self::new(refs)
    }
}

impl From<Vec<AliasRef>> for InputSpec {
    fn from(refs: Vec<AliasRef>) -> Self {
        Self(refs)
    }
}
