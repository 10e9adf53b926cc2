//! Per-conversion process context.
//!
//! The context carries caller-supplied variables, referenced from filter
//! predicate values via `${var}`, and the configuration directives that
//! restrict which constructs the planner may emit.

use std::collections::{HashMap, HashSet};

use crate::error::{PlanError, Result};

/// Configuration directives.
///
/// A directive never degrades output silently: when it prohibits a construct
/// the expression requires, the conversion fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    /// The base query must be the primary table.
    EnforcePrimaryTable,
    /// Prohibits the synthetic UNION base query.
    DisableUnion,
    /// Prohibits CONTAINS matches.
    DisableContains,
    /// Prohibits `<` / `>` matches.
    DisableLessThanGreaterThan,
    /// Prohibits reference matches.
    DisableReferenceMatching,
}

/// Variables and directives of one conversion.
#[derive(Debug, Clone, Default)]
pub struct ProcessContext {
    variables: HashMap<String, String>,
    directives: HashSet<Directive>,
}

impl ProcessContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Activates a directive.
    #[must_use]
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives.insert(directive);
        self
    }

    /// Whether `directive` is active.
    #[must_use]
    pub fn has_directive(&self, directive: Directive) -> bool {
        self.directives.contains(&directive)
    }

    /// Returns a variable's value.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Resolves every `${var}` in a filter predicate value.
    ///
    /// Two variables are reserved: `${argName}` yields the full name of the
    /// attribute the filter is emitted for, `${argName.local}` its trailing
    /// segment after the first dot (the full name when there is no dot).
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::UnresolvedVariable`] for an unknown variable and
    /// [`PlanError::Conversion`] for malformed placeholder syntax.
    pub fn resolve_filter_value(&self, raw: &str, attribute: &str) -> Result<String> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(PlanError::Conversion {
                    code: "ERR_FILTER_VALUE",
                    detail: format!("unclosed '${{' in filter value '{raw}'"),
                });
            };
            let name = after[..end].trim();
            if name.is_empty() {
                return Err(PlanError::Conversion {
                    code: "ERR_FILTER_VALUE",
                    detail: format!("empty placeholder in filter value '{raw}'"),
                });
            }
            let value = match name {
                "argName" => attribute,
                "argName.local" => attribute
                    .split_once('.')
                    .map_or(attribute, |(_, local)| local),
                _ => self
                    .variable(name)
                    .ok_or_else(|| PlanError::UnresolvedVariable {
                        name: name.to_string(),
                    })?,
            };
            out.push_str(value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}
