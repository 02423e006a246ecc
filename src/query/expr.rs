// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Expression algebra.
//!
//! Comparisons are built from a [`FieldRef`] proxy obtained off a model
//! descriptor, and compose into an immutable [`Expression`] tree:
//!
//! ```
//! use redsqrl_om::model::{FieldSpec, ModelBuilder};
//! use redsqrl_om::query::FieldRef;
//!
//! let person = ModelBuilder::new("Person")
//!     .field(FieldSpec::string("id").primary_key())
//!     .field(FieldSpec::string("name").indexed())
//!     .field(FieldSpec::integer("age").indexed().sortable())
//!     .build()
//!     .unwrap();
//!
//! let name = FieldRef::of(&person, "name").unwrap();
//! let age = FieldRef::of(&person, "age").unwrap();
//! let expr = name.eq("Alice") & (age.ge(18) | age.eq(0));
//! ```
//!
//! Every combinator returns a new node; operands are never mutated.
//! `&`, `|` and `!` mirror the comparison operators of the mapper's
//! dynamic-language ancestry, but the representation stays an explicit
//! enum so resolution is a plain match.

use std::ops;
use std::sync::Arc;

use crate::model::{FieldDescriptor, FieldKind, ModelDescriptor};

use super::QueryError;

/// Comparison operators a field supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    /// Tokenized full-text match.
    Like,
}

/// A literal comparison value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<QueryValue>),
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        QueryValue::Str(v.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(v: String) -> Self {
        QueryValue::Str(v)
    }
}

impl From<i64> for QueryValue {
    fn from(v: i64) -> Self {
        QueryValue::Int(v)
    }
}

impl From<i32> for QueryValue {
    fn from(v: i32) -> Self {
        QueryValue::Int(i64::from(v))
    }
}

impl From<f64> for QueryValue {
    fn from(v: f64) -> Self {
        QueryValue::Float(v)
    }
}

impl From<bool> for QueryValue {
    fn from(v: bool) -> Self {
        QueryValue::Bool(v)
    }
}

impl<T: Into<QueryValue>> From<Vec<T>> for QueryValue {
    fn from(v: Vec<T>) -> Self {
        QueryValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// One traversal hop through an embedded model.
#[derive(Debug, Clone)]
pub struct PathHop {
    /// Name of the traversed field on its owning model.
    pub field: String,
    /// Owning model's name.
    pub model: String,
    /// Whether the hop passed through a list of embedded models.
    pub through_list: bool,
}

/// A reference to a (possibly nested) model field, carrying the traversal
/// path and the final field's metadata. Obtained via [`FieldRef::of`] and
/// extended with [`FieldRef::child`]; comparisons on it produce
/// [`Expression`] nodes.
#[derive(Debug, Clone)]
pub struct FieldRef {
    hops: Vec<PathHop>,
    model: String,
    descriptor: FieldDescriptor,
}

impl FieldRef {
    /// Look up a top-level field on a model.
    pub fn of(model: &ModelDescriptor, name: &str) -> Result<Self, QueryError> {
        let descriptor = model.field(name)?.clone();
        Ok(Self {
            hops: Vec::new(),
            model: model.name().to_string(),
            descriptor,
        })
    }

    /// Traverse into a field of the embedded model (or of the element type
    /// of a list of embedded models), extending the path by one hop.
    pub fn child(&self, name: &str) -> Result<Self, QueryError> {
        let (inner, through_list) = match &self.descriptor.kind {
            FieldKind::Nested(inner) => (inner.clone(), false),
            FieldKind::List(element) => match element.as_ref() {
                FieldKind::Nested(inner) => (inner.clone(), true),
                _ => {
                    return Err(QueryError::NotTraversable {
                        field: self.descriptor.name.clone(),
                    })
                }
            },
            _ => {
                return Err(QueryError::NotTraversable {
                    field: self.descriptor.name.clone(),
                })
            }
        };
        let child = Self::child_of(&inner, name)?;
        let mut hops = self.hops.clone();
        hops.push(PathHop {
            field: self.descriptor.name.clone(),
            model: self.model.clone(),
            through_list,
        });
        Ok(Self {
            hops,
            model: inner.name().to_string(),
            descriptor: child,
        })
    }

    fn child_of(model: &Arc<ModelDescriptor>, name: &str) -> Result<FieldDescriptor, QueryError> {
        Ok(model.field(name)?.clone())
    }

    /// The final field's metadata.
    #[must_use]
    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    /// Owning model of the final field.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn hops(&self) -> &[PathHop] {
        &self.hops
    }

    /// Index field name: traversal prefixes joined to the field name with
    /// underscores (`address_city`).
    #[must_use]
    pub fn joined_name(&self) -> String {
        let mut parts: Vec<&str> = self.hops.iter().map(|h| h.field.as_str()).collect();
        parts.push(&self.descriptor.name);
        parts.join("_")
    }

    fn compare(&self, op: CompareOp, value: impl Into<QueryValue>) -> Expression {
        Expression::Compare(Comparison {
            field: self.clone(),
            op,
            value: value.into(),
        })
    }

    #[must_use]
    pub fn eq(&self, value: impl Into<QueryValue>) -> Expression {
        self.compare(CompareOp::Eq, value)
    }

    #[must_use]
    pub fn ne(&self, value: impl Into<QueryValue>) -> Expression {
        self.compare(CompareOp::Ne, value)
    }

    #[must_use]
    pub fn lt(&self, value: impl Into<QueryValue>) -> Expression {
        self.compare(CompareOp::Lt, value)
    }

    #[must_use]
    pub fn le(&self, value: impl Into<QueryValue>) -> Expression {
        self.compare(CompareOp::Le, value)
    }

    #[must_use]
    pub fn gt(&self, value: impl Into<QueryValue>) -> Expression {
        self.compare(CompareOp::Gt, value)
    }

    #[must_use]
    pub fn ge(&self, value: impl Into<QueryValue>) -> Expression {
        self.compare(CompareOp::Ge, value)
    }

    /// Set membership.
    #[must_use]
    pub fn is_in<T: Into<QueryValue>>(&self, values: Vec<T>) -> Expression {
        self.compare(CompareOp::In, QueryValue::from(values))
    }

    #[must_use]
    pub fn not_in<T: Into<QueryValue>>(&self, values: Vec<T>) -> Expression {
        self.compare(CompareOp::NotIn, QueryValue::from(values))
    }

    /// Tokenized full-text match; the field must be full-text indexed.
    #[must_use]
    pub fn matches(&self, fragment: &str) -> Expression {
        self.compare(CompareOp::Like, fragment)
    }
}

/// A single field comparison.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub field: FieldRef,
    pub op: CompareOp,
    pub value: QueryValue,
}

/// The query predicate tree.
#[derive(Debug, Clone)]
pub enum Expression {
    /// Match everything. Negating it is a resolution error.
    All,
    Compare(Comparison),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    #[must_use]
    pub fn and(self, other: Expression) -> Expression {
        Expression::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Expression) -> Expression {
        Expression::Or(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn negate(self) -> Expression {
        Expression::Not(Box::new(self))
    }

    /// Left-to-right implicit-AND reduction of a sequence of expressions.
    /// An empty sequence matches everything.
    #[must_use]
    pub fn and_all<I: IntoIterator<Item = Expression>>(expressions: I) -> Expression {
        let mut iter = expressions.into_iter();
        let Some(first) = iter.next() else {
            return Expression::All;
        };
        iter.fold(first, Expression::and)
    }
}

impl ops::BitAnd for Expression {
    type Output = Expression;

    fn bitand(self, rhs: Expression) -> Expression {
        self.and(rhs)
    }
}

impl ops::BitOr for Expression {
    type Output = Expression;

    fn bitor(self, rhs: Expression) -> Expression {
        self.or(rhs)
    }
}

impl ops::Not for Expression {
    type Output = Expression;

    fn not(self) -> Expression {
        self.negate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldSpec, ModelBuilder, StorageKind};

    fn person() -> Arc<ModelDescriptor> {
        let address = ModelBuilder::new("Address")
            .embedded()
            .field(FieldSpec::string("city").indexed())
            .build()
            .unwrap();
        ModelBuilder::new("Person")
            .storage(StorageKind::Json)
            .field(FieldSpec::string("id").primary_key())
            .field(FieldSpec::string("name").indexed())
            .field(FieldSpec::integer("age").indexed().sortable())
            .field(FieldSpec::nested("address", address))
            .build()
            .unwrap()
    }

    #[test]
    fn test_comparison_construction() {
        let person = person();
        let expr = FieldRef::of(&person, "age").unwrap().gt(34);
        match expr {
            Expression::Compare(cmp) => {
                assert_eq!(cmp.op, CompareOp::Gt);
                assert_eq!(cmp.value, QueryValue::Int(34));
                assert_eq!(cmp.field.joined_name(), "age");
            }
            other => panic!("expected Compare, got {other:?}"),
        }
    }

    #[test]
    fn test_operator_overloads() {
        let person = person();
        let name = FieldRef::of(&person, "name").unwrap();
        let age = FieldRef::of(&person, "age").unwrap();

        let expr = name.eq("Alice") & age.ge(18);
        assert!(matches!(expr, Expression::And(..)));

        let expr = name.eq("Alice") | age.ge(18);
        assert!(matches!(expr, Expression::Or(..)));

        let expr = !name.eq("Alice");
        assert!(matches!(expr, Expression::Not(..)));
    }

    #[test]
    fn test_combining_does_not_mutate_operands() {
        let person = person();
        let name = FieldRef::of(&person, "name").unwrap();
        let left = name.eq("Alice");
        let right = name.eq("Bob");
        let _combined = left.clone().and(right.clone());
        // Original nodes still usable and unchanged in shape.
        assert!(matches!(left, Expression::Compare(_)));
        assert!(matches!(right, Expression::Compare(_)));
    }

    #[test]
    fn test_nested_traversal_extends_path() {
        let person = person();
        let city = FieldRef::of(&person, "address")
            .unwrap()
            .child("city")
            .unwrap();
        assert_eq!(city.joined_name(), "address_city");
        assert_eq!(city.model(), "Address");
        assert_eq!(city.hops().len(), 1);
        assert_eq!(city.hops()[0].model, "Person");
        assert!(!city.hops()[0].through_list);
    }

    #[test]
    fn test_traversal_into_scalar_fails() {
        let person = person();
        let err = FieldRef::of(&person, "name").unwrap().child("x").unwrap_err();
        assert!(matches!(err, QueryError::NotTraversable { .. }));
    }

    #[test]
    fn test_unknown_field_fails() {
        let person = person();
        assert!(FieldRef::of(&person, "ghost").is_err());
    }

    #[test]
    fn test_and_all_reduces_left_to_right() {
        let person = person();
        let name = FieldRef::of(&person, "name").unwrap();
        let a = name.eq("a");
        let b = name.eq("b");
        let c = name.eq("c");
        let expr = Expression::and_all([a, b, c]);
        // ((a AND b) AND c)
        match expr {
            Expression::And(left, right) => {
                assert!(matches!(*left, Expression::And(..)));
                assert!(matches!(*right, Expression::Compare(_)));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_and_all_empty_matches_everything() {
        assert!(matches!(Expression::and_all([]), Expression::All));
    }
}
