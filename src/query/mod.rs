//! Typed query expressions and their compilation to the search engine.
//!
//! Callers build an [`Expression`] tree from field comparisons, combine
//! trees with `&`/`|`/`!`, and hand the result to a [`FindQuery`] cursor,
//! which compiles it to a single query string via [`resolve`] and executes
//! paginated searches.

pub mod escape;
pub mod expr;
pub mod find;
pub mod resolve;

pub use escape::escape;
pub use expr::{CompareOp, Comparison, Expression, FieldRef, QueryValue};
pub use find::FindQuery;
pub use resolve::{field_class, resolve, IndexClass};

use thiserror::Error;

use crate::model::SchemaError;
use crate::storage::StorageError;

/// Query-time failures: syntax/support errors raised while resolving an
/// expression, plus the runtime conditions a cursor can surface.
#[derive(Error, Debug, Clone)]
pub enum QueryError {
    #[error("Field '{field}' on model '{model}' is not indexed for querying")]
    NotIndexed { model: String, field: String },
    #[error("Full-text match on field '{field}' requires full-text indexing")]
    NotFullText { field: String },
    #[error("Operator {op:?} is not supported on {class:?}-indexed field '{field}'")]
    UnsupportedOperator {
        field: String,
        op: CompareOp,
        class: IndexClass,
    },
    #[error("Field '{field}' expected a {expected} comparison value")]
    ValueType { field: String, expected: &'static str },
    #[error("Cannot negate the match-everything expression")]
    NegatedAll,
    #[error("Cannot traverse into non-embedded field '{field}'")]
    NotTraversable { field: String },
    #[error("Field '{field}' is not sortable")]
    NotSortable { field: String },
    #[error("No matching record found")]
    NotFound,
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
