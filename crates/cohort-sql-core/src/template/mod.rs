//! Template linker.
//!
//! The planner emits SQL fragments with named `${id}` placeholders in
//! whatever order conversion visits the expression. The linker decouples that
//! creation order from positioning: it rewrites the fragment into a single
//! SQL string with positional `?`s and returns the parameters ordered by
//! appearance.

use std::collections::HashMap;

use crate::error::TemplateError;
use crate::param::QueryParameter;

/// A linked SQL template: the sole end-user object of a conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTemplateWithParameters {
    sql: String,
    parameters: Vec<QueryParameter>,
    positions: Vec<usize>,
}

impl QueryTemplateWithParameters {
    /// Returns the SQL string with positional `?` placeholders.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the parameters, one per `?`, in left-to-right order.
    #[must_use]
    pub fn parameters(&self) -> &[QueryParameter] {
        &self.parameters
    }

    /// Returns the byte offset of each `?` in [`Self::sql`].
    #[must_use]
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }
}

/// Rewrites `fragment`, replacing every `${id}` with `?`.
///
/// Candidates are keyed by id; multiple occurrences of one id are permitted
/// and two candidate parameters may share an id iff they are value-equal.
///
/// # Errors
///
/// * [`TemplateError::Unclosed`] — a `${` without a matching `}`;
/// * [`TemplateError::Empty`] — a placeholder with a blank id;
/// * [`TemplateError::Unknown`] — an id no candidate covers;
/// * [`TemplateError::Duplicate`] — two distinct candidates share an id.
pub fn link(
    fragment: &str,
    candidates: &[QueryParameter],
) -> Result<QueryTemplateWithParameters, TemplateError> {
    let mut by_id: HashMap<&str, &QueryParameter> = HashMap::new();
    for parameter in candidates {
        if let Some(existing) = by_id.insert(parameter.id(), parameter) {
            if existing != parameter {
                return Err(TemplateError::Duplicate {
                    id: parameter.id().to_string(),
                });
            }
        }
    }

    let mut sql = String::with_capacity(fragment.len());
    let mut parameters = Vec::new();
    let mut positions = Vec::new();
    let mut rest = fragment;
    let mut consumed = 0usize;

    while let Some(start) = rest.find("${") {
        sql.push_str(&rest[..start]);
        let offset = consumed + start;
        let after = &rest[start + 2..];
        let close = match after.find(['}', '$', '{']) {
            Some(i) if after.as_bytes()[i] == b'}' => i,
            _ => return Err(TemplateError::Unclosed { offset }),
        };
        let id = after[..close].trim();
        if id.is_empty() {
            return Err(TemplateError::Empty { offset });
        }
        let parameter = by_id.get(id).ok_or_else(|| TemplateError::Unknown {
            id: id.to_string(),
        })?;
        positions.push(sql.len());
        sql.push('?');
        parameters.push((*parameter).clone());
        consumed = offset + 2 + close + 1;
        rest = &after[close + 1..];
    }
    sql.push_str(rest);

    Ok(QueryTemplateWithParameters {
        sql,
        parameters,
        positions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::MatchOperator;
    use crate::types::column::{BaseSqlKind, SqlKind};
    use crate::types::transfer::TransferValue;

    fn param(id: &str, value: &str) -> QueryParameter {
        QueryParameter::new(
            id,
            SqlKind::builtin(BaseSqlKind::Varchar),
            TransferValue::Str(value.to_string()),
            MatchOperator::Equals,
        )
        .unwrap()
    }

    #[test]
    fn test_substitution_in_appearance_order() {
        let a = param("a", "1");
        let b = param("b", "2");
        // Candidates deliberately in the opposite order of appearance.
        let template = link("X = ${b} AND Y = ${a}", &[a, b]).unwrap();
        assert_eq!(template.sql(), "X = ? AND Y = ?");
        assert_eq!(template.parameters()[0].id(), "b");
        assert_eq!(template.parameters()[1].id(), "a");
        assert_eq!(template.positions(), &[4, 14]);
    }

    #[test]
    fn test_repeated_occurrences_of_one_id() {
        let a = param("a", "1");
        let template = link("${a} OR ${a}", &[a]).unwrap();
        assert_eq!(template.sql(), "? OR ?");
        assert_eq!(template.parameters().len(), 2);
    }

    #[test]
    fn test_whitespace_around_id_is_trimmed() {
        let a = param("a", "1");
        let template = link("COL = ${ a }", &[a]).unwrap();
        assert_eq!(template.sql(), "COL = ?");
    }

    #[test]
    fn test_unclosed_placeholder() {
        assert_eq!(
            link("COL = ${a", &[param("a", "1")]),
            Err(TemplateError::Unclosed { offset: 6 })
        );
        // A nested '${' never closes the first placeholder.
        assert!(matches!(
            link("COL = ${a${b}", &[param("a", "1"), param("b", "2")]),
            Err(TemplateError::Unclosed { .. })
        ));
    }

    #[test]
    fn test_empty_placeholder() {
        assert_eq!(
            link("COL = ${}", &[]),
            Err(TemplateError::Empty { offset: 6 })
        );
        assert!(matches!(
            link("COL = ${   }", &[]),
            Err(TemplateError::Empty { .. })
        ));
    }

    #[test]
    fn test_unknown_id() {
        assert_eq!(
            link("COL = ${missing}", &[param("a", "1")]),
            Err(TemplateError::Unknown {
                id: String::from("missing")
            })
        );
    }

    #[test]
    fn test_duplicate_ids_must_be_value_equal() {
        let first = param("a", "1");
        let equal = param("a", "1");
        let different = param("a", "2");

        assert!(link("${a}", &[first.clone(), equal]).is_ok());
        assert_eq!(
            link("${a}", &[first, different]),
            Err(TemplateError::Duplicate {
                id: String::from("a")
            })
        );
    }

    #[test]
    fn test_fragment_without_placeholders() {
        let template = link("SELECT 1", &[]).unwrap();
        assert_eq!(template.sql(), "SELECT 1");
        assert!(template.parameters().is_empty());
        assert!(template.positions().is_empty());
    }
}
