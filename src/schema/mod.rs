//! Index schema generation and migration.

pub mod generator;
pub mod migrator;

pub use generator::{generate, IndexSchema};
pub use migrator::{IndexMigration, MigrationAction, SchemaMigrator};
