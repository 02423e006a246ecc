//! Migration Integration Tests
//!
//! Schema and data migration lifecycles against a real Redis Stack
//! server, via testcontainers.
//!
//! # Running Tests
//! ```bash
//! # Requires Docker
//! cargo test --test migrations -- --ignored
//! ```

use std::sync::Arc;

use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

use redsqrl_om::{
    storage::OmStore, DataMigrator, FieldSpec, IsoDateToEpochMs, MigrationAction, ModelBuilder,
    ModelDescriptor, ModelRegistry, RecordTransformMigration, RedisStore, SchemaMigrator,
};

fn redis_stack_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis/redis-stack-server", "7.2.0-v9")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

async fn store_for(container: &Container<'_, GenericImage>) -> Arc<RedisStore> {
    let port = container.get_host_port_ipv4(6379);
    let store = RedisStore::connect(&format!("redis://127.0.0.1:{port}"))
        .await
        .expect("connect to redis");
    Arc::new(store)
}

fn person_v1() -> Arc<ModelDescriptor> {
    ModelBuilder::new("Person")
        .field(FieldSpec::string("id").primary_key())
        .field(FieldSpec::string("x").indexed())
        .build()
        .expect("valid model")
}

fn person_v2() -> Arc<ModelDescriptor> {
    ModelBuilder::new("Person")
        .field(FieldSpec::string("id").primary_key())
        .field(FieldSpec::string("x").indexed())
        .field(FieldSpec::string("y").indexed())
        .build()
        .expect("valid model")
}

fn registry_with(model: Arc<ModelDescriptor>) -> Arc<ModelRegistry> {
    let registry = Arc::new(ModelRegistry::new());
    registry.register(model);
    registry
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_two_step_schema_lifecycle() {
    let docker = Cli::default();
    let container = redis_stack_container(&docker);
    let store = store_for(&container).await;

    // Step one: fresh model, expect exactly one CREATE.
    let migrator = SchemaMigrator::new(store.clone(), registry_with(person_v1()));
    let ops = migrator.detect().await.expect("detect");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].action, MigrationAction::Create);
    migrator.apply(&ops).await.expect("apply");

    let hash_v1 = store
        .get("person:index:hash")
        .await
        .expect("read hash")
        .expect("hash stored");

    // Converged: nothing further to do.
    assert!(migrator.detect().await.expect("detect").is_empty());

    // Step two: the model grows a field - exactly one DROP then CREATE.
    let migrator = SchemaMigrator::new(store.clone(), registry_with(person_v2()));
    let ops = migrator.detect().await.expect("detect");
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0].action, MigrationAction::Drop);
    assert_eq!(ops[1].action, MigrationAction::Create);
    migrator.apply(&ops).await.expect("apply");

    let hash_v2 = store
        .get("person:index:hash")
        .await
        .expect("read hash")
        .expect("hash stored");
    assert_ne!(hash_v1, hash_v2);
    assert!(migrator.detect().await.expect("detect").is_empty());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_create_is_idempotent_under_races() {
    let docker = Cli::default();
    let container = redis_stack_container(&docker);
    let store = store_for(&container).await;

    // Two migrators detect the same pending CREATE and both apply it; the
    // second apply lands on an existing index and is a no-op.
    let first = SchemaMigrator::new(store.clone(), registry_with(person_v1()));
    let second = SchemaMigrator::new(store.clone(), registry_with(person_v1()));
    let ops_a = first.detect().await.expect("detect");
    let ops_b = second.detect().await.expect("detect");
    assert_eq!(ops_a.len(), 1);
    assert_eq!(ops_b.len(), 1);

    first.apply(&ops_a).await.expect("first apply");
    second.apply(&ops_b).await.expect("second apply tolerated");
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_record_transform_applies_once() {
    let docker = Cli::default();
    let container = redis_stack_container(&docker);
    let store = store_for(&container).await;

    let model = ModelBuilder::new("Person")
        .field(FieldSpec::string("id").primary_key())
        .field(FieldSpec::datetime("signup").indexed())
        .build()
        .expect("valid model");

    for (id, signup) in [("1", "2026-01-01T00:00:00Z"), ("2", "2026-01-02T00:00:00Z")] {
        store
            .hash_set(
                &format!("person:{id}"),
                &[
                    ("id".to_string(), id.to_string()),
                    ("signup".to_string(), signup.to_string()),
                ],
            )
            .await
            .expect("seed record");
    }

    let registry = registry_with(model.clone());
    let mut migrator = DataMigrator::new(store.clone(), registry);
    migrator.register(Arc::new(
        RecordTransformMigration::new(
            "20260101_signup_to_epoch",
            "convert signup timestamps to epoch millis",
            model,
            Arc::new(IsoDateToEpochMs),
        )
        .field("signup"),
    ));

    assert_eq!(migrator.run_migrations(false).await.expect("run"), 1);

    let record = store.hash_get_all("person:1").await.expect("read record");
    assert_eq!(
        record.get("signup").map(String::as_str),
        Some("1767225600000")
    );

    // Applied state persists: a second run applies nothing.
    assert_eq!(migrator.run_migrations(false).await.expect("rerun"), 0);
    let status = migrator.status().await.expect("status");
    assert_eq!(status.applied, vec!["20260101_signup_to_epoch"]);
    assert!(status.pending.is_empty());
}
