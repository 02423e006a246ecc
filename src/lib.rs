//! # redsqrl-om
//!
//! A typed object mapper and migration engine for Redis Stack.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Model Layer                            │
//! │  • ModelDescriptor built once, validated eagerly           │
//! │  • Explicit ModelRegistry (injected, never global)         │
//! │  • Hash / JSON record codec                                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Query Layer                            │
//! │  • Expression algebra (&, |, ! over typed comparisons)     │
//! │  • Pure resolver → FT.SEARCH query string                  │
//! │  • FindQuery cursor: pagination, sort, update, delete      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Migration Layer                          │
//! │  • SchemaMigrator: hash-diffed CREATE/DROP reconciliation  │
//! │  • DataMigrator: dependency-ordered units, resumable       │
//! │    batch transforms with checkpoints                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Storage Layer                           │
//! │  • OmStore trait: keys, hashes, JSON, FT.*, scans, sets    │
//! │  • RedisStore (ConnectionManager + retry) / InMemoryStore  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::{Arc, OnceLock};
//! use serde::{Deserialize, Serialize};
//! use redsqrl_om::{
//!     FieldRef, FieldSpec, Model, ModelBuilder, ModelDescriptor, OmConfig, OmEngine,
//! };
//!
//! #[derive(Serialize, Deserialize)]
//! struct Person {
//!     #[serde(default)]
//!     id: String,
//!     first_name: String,
//!     age: i64,
//! }
//!
//! impl Model for Person {
//!     fn descriptor() -> Arc<ModelDescriptor> {
//!         static DESCRIPTOR: OnceLock<Arc<ModelDescriptor>> = OnceLock::new();
//!         DESCRIPTOR
//!             .get_or_init(|| {
//!                 ModelBuilder::new("Person")
//!                     .field(FieldSpec::string("id").primary_key())
//!                     .field(FieldSpec::string("first_name").indexed())
//!                     .field(FieldSpec::integer("age").indexed().sortable())
//!                     .build()
//!                     .expect("valid model")
//!             })
//!             .clone()
//!     }
//!
//!     fn primary_key(&self) -> &str {
//!         &self.id
//!     }
//!
//!     fn set_primary_key(&mut self, pk: String) {
//!         self.id = pk;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = OmEngine::connect(OmConfig::from_env()).await?;
//!     engine.register_model::<Person>();
//!     engine.schema_migrator().run().await?;
//!
//!     let mut person = Person {
//!         id: String::new(),
//!         first_name: "Ada".into(),
//!         age: 38,
//!     };
//!     engine.save(&mut person).await?;
//!
//!     let age = FieldRef::of(&Person::descriptor(), "age")?;
//!     let adults = engine
//!         .find::<Person>()
//!         .filter(age.ge(18))
//!         .sort_by(&["age"])?
//!         .all()
//!         .await?;
//!     println!("{} adults", adults.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`model`]: descriptors, registry, record codec
//! - [`query`]: expression algebra, resolver, find cursor
//! - [`schema`]: index generation and schema migration
//! - [`migrate`]: data migration units, ordering, checkpoints
//! - [`storage`]: store trait and backends
//! - [`engine`]: the [`OmEngine`] orchestrator

pub mod config;
pub mod engine;
pub mod metrics;
pub mod migrate;
pub mod model;
pub mod query;
pub mod schema;
pub mod storage;

pub use config::OmConfig;
pub use engine::OmEngine;
pub use migrate::{
    Checkpoint, ConversionPolicy, DataMigrator, FieldTransform, IsoDateToEpochMs,
    MigrationContext, MigrationError, MigrationUnit, RecordTransformMigration, RollbackOutcome,
};
pub use model::{
    FieldDescriptor, FieldKind, FieldSpec, Model, ModelBuilder, ModelDescriptor, ModelRegistry,
    SchemaError, StorageKind,
};
pub use query::{escape, resolve, CompareOp, Expression, FieldRef, FindQuery, QueryError};
pub use schema::{IndexMigration, IndexSchema, MigrationAction, SchemaMigrator};
pub use storage::{InMemoryStore, KeyKind, OmStore, RedisStore, StorageError};
