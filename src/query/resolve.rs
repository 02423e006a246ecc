//! Query resolution.
//!
//! Compiles an [`Expression`] tree into a single query string. Resolution
//! is a pure, deterministic function of the tree - no hidden caching; the
//! find cursor owns its own memoization.
//!
//! # Query syntax emitted
//!
//! ```text
//! @field:{value}            - tag exact match (escaped)
//! @field:{a|b}              - tag membership
//! @field:[min max]          - numeric range, ( prefix for exclusive bounds
//! @field_fts:"phrase"       - full-text phrase
//! @field_fts:fragment       - full-text fragment (LIKE)
//! left right                - AND (implicit)
//! left | right              - OR
//! -clause  /  -(tree)       - NOT
//! (nested)                  - grouping, only around recursed sub-results
//! ```

use tracing::warn;

use crate::model::{FieldDescriptor, FieldKind};

use super::escape::escape;
use super::expr::{CompareOp, Comparison, Expression, QueryValue};
use super::QueryError;

/// Index field classes the engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexClass {
    Text,
    Tag,
    Numeric,
}

/// Resolve a field's index class for a given operator.
///
/// Priority order: primary keys are tags; full-text match requires a
/// full-text field and resolves text; containers fold to tags; numeric
/// scalars resolve numeric; everything else is a tag.
pub fn field_class(field: &FieldDescriptor, op: CompareOp) -> Result<IndexClass, QueryError> {
    if field.primary_key {
        return Ok(IndexClass::Tag);
    }
    if op == CompareOp::Like {
        if !field.full_text {
            return Err(QueryError::NotFullText {
                field: field.name.clone(),
            });
        }
        return Ok(IndexClass::Text);
    }
    match &field.kind {
        FieldKind::List(_) | FieldKind::Map(_) => Ok(IndexClass::Tag),
        kind if kind.is_numeric() => Ok(IndexClass::Numeric),
        _ => Ok(IndexClass::Tag),
    }
}

/// Compile an expression tree into a query string.
pub fn resolve(expression: &Expression) -> Result<String, QueryError> {
    resolve_node(expression)
}

fn resolve_node(expression: &Expression) -> Result<String, QueryError> {
    match expression {
        Expression::All => Ok("*".to_string()),
        Expression::Compare(cmp) => resolve_comparison(cmp),
        Expression::And(left, right) => {
            let left = resolve_operand(left)?;
            let right = resolve_operand(right)?;
            Ok(join_clauses(&left, &right, " "))
        }
        Expression::Or(left, right) => {
            let left = resolve_operand(left)?;
            let right = resolve_operand(right)?;
            Ok(join_clauses(&left, &right, " | "))
        }
        Expression::Not(inner) => match inner.as_ref() {
            Expression::All => Err(QueryError::NegatedAll),
            // Double negation cancels by unwrapping, not by simplification.
            Expression::Not(unwrapped) => resolve_node(unwrapped),
            _ => {
                let resolved = resolve_node(inner)?;
                if resolved.is_empty() {
                    Ok(resolved)
                } else {
                    Ok(format!("-({resolved})"))
                }
            }
        },
    }
}

/// Resolve a sub-expression in operand position: recursion results get
/// parenthesized, negations get a minus prefix, leaves stay bare.
fn resolve_operand(expression: &Expression) -> Result<String, QueryError> {
    match expression {
        Expression::And(..) | Expression::Or(..) => {
            let resolved = resolve_node(expression)?;
            if resolved.is_empty() {
                Ok(resolved)
            } else {
                Ok(format!("({resolved})"))
            }
        }
        Expression::Not(inner) => match inner.as_ref() {
            Expression::All => Err(QueryError::NegatedAll),
            Expression::Not(unwrapped) => resolve_operand(unwrapped),
            _ => {
                let resolved = resolve_operand(inner)?;
                if resolved.is_empty() {
                    Ok(resolved)
                } else {
                    Ok(format!("-{resolved}"))
                }
            }
        },
        other => resolve_node(other),
    }
}

/// Concatenate two resolved clauses, dropping empty sides (a degraded tag
/// clause resolves to nothing and must not leave a dangling operator).
fn join_clauses(left: &str, right: &str, separator: &str) -> String {
    match (left.is_empty(), right.is_empty()) {
        (true, true) => String::new(),
        (true, false) => right.to_string(),
        (false, true) => left.to_string(),
        (false, false) => format!("{left}{separator}{right}"),
    }
}

fn resolve_comparison(cmp: &Comparison) -> Result<String, QueryError> {
    let field = cmp.field.descriptor();
    if !field.indexed {
        return Err(QueryError::NotIndexed {
            model: cmp.field.model().to_string(),
            field: field.name.clone(),
        });
    }

    let class = field_class(field, cmp.op)?;
    let name = cmp.field.joined_name();
    match class {
        IndexClass::Text => resolve_text(&name, field, cmp),
        IndexClass::Numeric => resolve_numeric(&name, field, cmp),
        IndexClass::Tag => resolve_tag(&name, field, cmp),
    }
}

fn resolve_text(
    name: &str,
    field: &FieldDescriptor,
    cmp: &Comparison,
) -> Result<String, QueryError> {
    let QueryValue::Str(ref value) = cmp.value else {
        return Err(QueryError::ValueType {
            field: field.name.clone(),
            expected: "string",
        });
    };
    match cmp.op {
        CompareOp::Eq => Ok(format!("@{name}_fts:\"{}\"", value.replace('"', "\\\""))),
        CompareOp::Ne => Ok(format!("-@{name}_fts:\"{}\"", value.replace('"', "\\\""))),
        CompareOp::Like => {
            // Raw fragment: the caller controls wildcards; multi-token
            // fragments group so every token must match.
            if value.contains(char::is_whitespace) {
                Ok(format!("@{name}_fts:({value})"))
            } else {
                Ok(format!("@{name}_fts:{value}"))
            }
        }
        op => Err(QueryError::UnsupportedOperator {
            field: field.name.clone(),
            op,
            class: IndexClass::Text,
        }),
    }
}

fn numeric_literal(field: &FieldDescriptor, value: &QueryValue) -> Result<String, QueryError> {
    match value {
        QueryValue::Int(n) => Ok(n.to_string()),
        QueryValue::Float(n) => Ok(format!("{n}")),
        _ => Err(QueryError::ValueType {
            field: field.name.clone(),
            expected: "numeric",
        }),
    }
}

fn resolve_numeric(
    name: &str,
    field: &FieldDescriptor,
    cmp: &Comparison,
) -> Result<String, QueryError> {
    match cmp.op {
        CompareOp::Eq => {
            let v = numeric_literal(field, &cmp.value)?;
            Ok(format!("@{name}:[{v} {v}]"))
        }
        CompareOp::Ne => {
            let v = numeric_literal(field, &cmp.value)?;
            Ok(format!("-@{name}:[{v} {v}]"))
        }
        CompareOp::Lt => {
            let v = numeric_literal(field, &cmp.value)?;
            Ok(format!("@{name}:[-inf ({v}]"))
        }
        CompareOp::Le => {
            let v = numeric_literal(field, &cmp.value)?;
            Ok(format!("@{name}:[-inf {v}]"))
        }
        CompareOp::Gt => {
            let v = numeric_literal(field, &cmp.value)?;
            Ok(format!("@{name}:[({v} +inf]"))
        }
        CompareOp::Ge => {
            let v = numeric_literal(field, &cmp.value)?;
            Ok(format!("@{name}:[{v} +inf]"))
        }
        CompareOp::In | CompareOp::NotIn => {
            let QueryValue::List(ref values) = cmp.value else {
                return Err(QueryError::ValueType {
                    field: field.name.clone(),
                    expected: "non-empty list",
                });
            };
            if values.is_empty() {
                return Err(QueryError::ValueType {
                    field: field.name.clone(),
                    expected: "non-empty list",
                });
            }
            let clauses = values
                .iter()
                .map(|v| numeric_literal(field, v).map(|n| format!("@{name}:[{n} {n}]")))
                .collect::<Result<Vec<_>, _>>()?;
            let union = if clauses.len() == 1 {
                clauses.into_iter().next().unwrap_or_default()
            } else {
                format!("({})", clauses.join("|"))
            };
            if cmp.op == CompareOp::NotIn {
                Ok(format!("-{union}"))
            } else {
                Ok(union)
            }
        }
        op => Err(QueryError::UnsupportedOperator {
            field: field.name.clone(),
            op,
            class: IndexClass::Numeric,
        }),
    }
}

fn tag_literal(field: &FieldDescriptor, value: &QueryValue) -> Result<String, QueryError> {
    match value {
        QueryValue::Str(s) => Ok(s.clone()),
        QueryValue::Int(n) => Ok(n.to_string()),
        QueryValue::Float(n) => Ok(format!("{n}")),
        QueryValue::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        QueryValue::List(_) => Err(QueryError::ValueType {
            field: field.name.clone(),
            expected: "scalar",
        }),
    }
}

fn resolve_tag(
    name: &str,
    field: &FieldDescriptor,
    cmp: &Comparison,
) -> Result<String, QueryError> {
    let separator = field.tag_separator;
    match cmp.op {
        CompareOp::Eq => {
            let value = tag_literal(field, &cmp.value)?;
            if value == separator.to_string() {
                // A value of exactly the separator cannot form a valid tag
                // clause; degrade to matching nothing extra rather than
                // emitting broken syntax.
                warn!(
                    field = %field.name,
                    separator = %separator,
                    "Tag value equals the separator character; clause dropped"
                );
                return Ok(String::new());
            }
            if value.contains(separator) {
                let union = value
                    .split(separator)
                    .filter(|part| !part.is_empty())
                    .map(escape)
                    .collect::<Vec<_>>()
                    .join("|");
                return Ok(format!("@{name}:{{{union}}}"));
            }
            Ok(format!("@{name}:{{{}}}", escape(&value)))
        }
        CompareOp::Ne => {
            let value = tag_literal(field, &cmp.value)?;
            Ok(format!("-@{name}:{{{}}}", escape(&value)))
        }
        CompareOp::In | CompareOp::NotIn => {
            let QueryValue::List(ref values) = cmp.value else {
                return Err(QueryError::ValueType {
                    field: field.name.clone(),
                    expected: "non-empty list",
                });
            };
            if values.is_empty() {
                return Err(QueryError::ValueType {
                    field: field.name.clone(),
                    expected: "non-empty list",
                });
            }
            let union = values
                .iter()
                .map(|v| tag_literal(field, v).map(|s| escape(&s)))
                .collect::<Result<Vec<_>, _>>()?
                .join("|");
            if cmp.op == CompareOp::NotIn {
                Ok(format!("-@{name}:{{{union}}}"))
            } else {
                Ok(format!("@{name}:{{{union}}}"))
            }
        }
        op => Err(QueryError::UnsupportedOperator {
            field: field.name.clone(),
            op,
            class: IndexClass::Tag,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldKind, FieldSpec, ModelBuilder, ModelDescriptor, StorageKind};
    use crate::query::expr::FieldRef;
    use std::sync::Arc;

    fn person() -> Arc<ModelDescriptor> {
        let address = ModelBuilder::new("Address")
            .embedded()
            .field(FieldSpec::string("city").indexed())
            .build()
            .unwrap();
        ModelBuilder::new("Person")
            .storage(StorageKind::Json)
            .field(FieldSpec::string("id").primary_key())
            .field(FieldSpec::string("first_name").indexed())
            .field(FieldSpec::string("bio").full_text())
            .field(FieldSpec::string("notes"))
            .field(FieldSpec::integer("age").indexed().sortable())
            .field(FieldSpec::float("price").indexed())
            .field(FieldSpec::boolean("active").indexed())
            .field(FieldSpec::list("skills", FieldKind::String).indexed())
            .field(FieldSpec::nested("address", address))
            .build()
            .unwrap()
    }

    fn field(name: &str) -> FieldRef {
        FieldRef::of(&person(), name).unwrap()
    }

    #[test]
    fn test_all_resolves_to_star() {
        assert_eq!(resolve(&Expression::All).unwrap(), "*");
    }

    #[test]
    fn test_negated_all_fails() {
        let err = resolve(&!Expression::All).unwrap_err();
        assert!(matches!(err, QueryError::NegatedAll));
        // Also in operand position.
        let err = resolve(&(field("age").gt(1) & !Expression::All)).unwrap_err();
        assert!(matches!(err, QueryError::NegatedAll));
    }

    #[test]
    fn test_tag_equality_is_escaped() {
        let expr = field("first_name").eq("Andrew the Michael");
        assert_eq!(
            resolve(&expr).unwrap(),
            "@first_name:{Andrew\\ the\\ Michael}"
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let expr = (field("first_name").eq("a") | field("age").ge(3)) & !field("active").eq(true);
        let first = resolve(&expr).unwrap();
        let second = resolve(&expr).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unindexed_field_fails_for_every_operator() {
        let notes = field("notes");
        let cases = vec![
            notes.eq("x"),
            notes.ne("x"),
            notes.lt(1),
            notes.le(1),
            notes.gt(1),
            notes.ge(1),
            notes.is_in(vec!["x"]),
            notes.not_in(vec!["x"]),
            notes.matches("x"),
        ];
        for expr in cases {
            let err = resolve(&expr).unwrap_err();
            assert!(matches!(err, QueryError::NotIndexed { .. }), "{expr:?}");
        }
    }

    #[test]
    fn test_numeric_operators() {
        assert_eq!(resolve(&field("age").eq(34)).unwrap(), "@age:[34 34]");
        assert_eq!(resolve(&field("age").ne(34)).unwrap(), "-@age:[34 34]");
        assert_eq!(resolve(&field("age").lt(34)).unwrap(), "@age:[-inf (34]");
        assert_eq!(resolve(&field("age").le(34)).unwrap(), "@age:[-inf 34]");
        assert_eq!(resolve(&field("age").gt(34)).unwrap(), "@age:[(34 +inf]");
        assert_eq!(resolve(&field("age").ge(34)).unwrap(), "@age:[34 +inf]");
    }

    #[test]
    fn test_numeric_membership_unions_ranges() {
        let expr = field("price").is_in(vec![10.0, 30.0]);
        assert_eq!(
            resolve(&expr).unwrap(),
            "(@price:[10 10]|@price:[30 30])"
        );
        let expr = field("price").not_in(vec![10.0, 30.0]);
        assert_eq!(
            resolve(&expr).unwrap(),
            "-(@price:[10 10]|@price:[30 30])"
        );
        let expr = field("price").is_in(vec![10.0]);
        assert_eq!(resolve(&expr).unwrap(), "@price:[10 10]");
    }

    #[test]
    fn test_tag_membership() {
        let expr = field("skills").is_in(vec!["rust", "redis db"]);
        assert_eq!(resolve(&expr).unwrap(), "@skills:{rust|redis\\ db}");
        let expr = field("skills").not_in(vec!["rust"]);
        assert_eq!(resolve(&expr).unwrap(), "-@skills:{rust}");
    }

    #[test]
    fn test_empty_membership_list_fails() {
        let expr = field("skills").is_in(Vec::<String>::new());
        assert!(matches!(
            resolve(&expr).unwrap_err(),
            QueryError::ValueType { .. }
        ));
    }

    #[test]
    fn test_tag_value_containing_separator_splits() {
        let expr = field("skills").eq("rust|redis");
        let resolved = resolve(&expr).unwrap();
        assert_eq!(resolved, "@skills:{rust|redis}");

        // Round-trip: splitting the clause content on the separator
        // reconstructs the escaped inputs.
        let inner = resolved
            .strip_prefix("@skills:{")
            .and_then(|s| s.strip_suffix('}'))
            .unwrap();
        let parts: Vec<&str> = inner.split('|').collect();
        assert_eq!(parts, vec!["rust", "redis"]);
    }

    #[test]
    fn test_tag_value_equal_to_separator_degrades() {
        let expr = field("skills").eq("|");
        assert_eq!(resolve(&expr).unwrap(), "");
        // Combined under AND, the empty clause disappears entirely.
        let expr = field("skills").eq("|") & field("age").ge(1);
        assert_eq!(resolve(&expr).unwrap(), "@age:[1 +inf]");
    }

    #[test]
    fn test_boolean_tags() {
        assert_eq!(resolve(&field("active").eq(true)).unwrap(), "@active:{1}");
        assert_eq!(resolve(&field("active").eq(false)).unwrap(), "@active:{0}");
    }

    #[test]
    fn test_primary_key_resolves_as_tag() {
        let expr = field("id").eq("01HXYZ");
        assert_eq!(resolve(&expr).unwrap(), "@id:{01HXYZ}");
    }

    #[test]
    fn test_full_text_match() {
        assert_eq!(resolve(&field("bio").matches("rust")).unwrap(), "@bio_fts:rust");
        assert_eq!(
            resolve(&field("bio").matches("loves rust")).unwrap(),
            "@bio_fts:(loves rust)"
        );
    }

    #[test]
    fn test_full_text_match_requires_full_text_field() {
        let err = resolve(&field("first_name").matches("x")).unwrap_err();
        assert!(matches!(err, QueryError::NotFullText { .. }));
    }

    #[test]
    fn test_range_on_tag_field_is_unsupported() {
        let err = resolve(&field("first_name").gt(1)).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedOperator { .. }));
    }

    #[test]
    fn test_and_concatenates_with_space() {
        let expr = field("first_name").eq("Alice") & field("age").ge(18);
        assert_eq!(
            resolve(&expr).unwrap(),
            "@first_name:{Alice} @age:[18 +inf]"
        );
    }

    #[test]
    fn test_or_concatenates_with_pipe() {
        let expr = field("first_name").eq("Alice") | field("first_name").eq("Bob");
        assert_eq!(
            resolve(&expr).unwrap(),
            "@first_name:{Alice} | @first_name:{Bob}"
        );
    }

    #[test]
    fn test_nested_subtrees_are_parenthesized() {
        let expr = (field("first_name").eq("Alice") | field("first_name").eq("Bob"))
            & field("age").ge(18);
        assert_eq!(
            resolve(&expr).unwrap(),
            "(@first_name:{Alice} | @first_name:{Bob}) @age:[18 +inf]"
        );
    }

    #[test]
    fn test_negated_operand_gets_minus_prefix() {
        let expr = field("age").ge(18) & !field("first_name").eq("Alice");
        assert_eq!(
            resolve(&expr).unwrap(),
            "@age:[18 +inf] -@first_name:{Alice}"
        );
    }

    #[test]
    fn test_top_level_negation_wraps_in_parens() {
        let expr = !(field("first_name").eq("Alice") & field("age").ge(18));
        assert_eq!(
            resolve(&expr).unwrap(),
            "-(@first_name:{Alice} @age:[18 +inf])"
        );
    }

    #[test]
    fn test_double_negation_cancels() {
        let base = field("first_name").eq("Alice") & field("age").ge(18);
        let doubled = !!base.clone();
        assert_eq!(resolve(&doubled).unwrap(), resolve(&base).unwrap());
    }

    #[test]
    fn test_nested_field_path_prefixes_name() {
        let city = FieldRef::of(&person(), "address")
            .unwrap()
            .child("city")
            .unwrap();
        assert_eq!(resolve(&city.eq("Leeds")).unwrap(), "@address_city:{Leeds}");
    }

    #[test]
    fn test_implicit_and_reduction_matches_explicit() {
        let a = field("first_name").eq("Alice");
        let b = field("age").ge(18);
        let reduced = Expression::and_all([a.clone(), b.clone()]);
        assert_eq!(resolve(&reduced).unwrap(), resolve(&(a & b)).unwrap());
    }
}
