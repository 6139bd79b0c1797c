use config::{Config, VectorStoreSettings, load_from_file, load_from_vars, merge_settings};
use std::collections::HashSet;
use std::ffi::OsString;
use std::sync::Arc;
use tempfile::TempDir;
use testing::{MockEmbedder, sample_documents};
use vector_stores::{StoreError, VectorStore, VectorStoreFactory, wrap_with_instrumentation};

fn settings_for(dir: &TempDir) -> VectorStoreSettings {
    let path = dir.path().join("settings.yaml");
    std::fs::write(
        &path,
        format!(
            "vector_store:\n  type: lancedb\n  db_uri: {}\n  collection_name: entities\n",
            dir.path().join("db").display()
        )
    )
    .unwrap();

    let from_file = load_from_file(&path).unwrap();
    let from_env = load_from_vars([(
        OsString::from("VECTOR_STORE_VECTOR_SIZE"),
        OsString::from(MockEmbedder::DIMENSION.to_string())
    )])
    .unwrap();

    merge_settings(Config::default(), Some(from_file), from_env, None).vector_store
}

#[tokio::test]
async fn test_store_from_layered_settings() {
    let dir = TempDir::new().unwrap();
    let settings = settings_for(&dir);
    assert_eq!(settings.store_type, "lancedb");

    let store = VectorStoreFactory::new().from_settings(&settings).unwrap();
    store.load_documents(sample_documents(), true).await.unwrap();

    assert!(dir.path().join("db").join("entities.json").exists());

    let embedder = MockEmbedder::new();
    let results = store
        .similarity_search_by_text("python", &embedder, 2, None)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].document.id, "doc-python");
    assert!(results[0].score >= results[1].score);
}

#[tokio::test]
async fn test_configured_vector_size_is_enforced() {
    let dir = TempDir::new().unwrap();
    let store = VectorStoreFactory::new()
        .from_settings(&settings_for(&dir))
        .unwrap();

    let err = store
        .load_documents(
            vec![vector_stores::StoreDocument::new("bad").with_vector(vec![1.0, 0.0])],
            true
        )
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        StoreError::SchemaMismatch {
            expected: 4,
            actual: 2
        }
    ));
}

#[tokio::test]
async fn test_collection_survives_reconstruction() {
    let dir = TempDir::new().unwrap();
    let settings = settings_for(&dir);
    let factory = VectorStoreFactory::new();

    let writer = factory.from_settings(&settings).unwrap();
    writer.load_documents(sample_documents(), true).await.unwrap();
    let removed = writer
        .delete(&["doc-python".to_string(), "unknown".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let reader = factory.from_settings(&settings).unwrap();
    assert!(reader.search_by_id("doc-python").await.unwrap().is_none());
    let rust = reader.search_by_id("doc-rust").await.unwrap().unwrap();
    assert_eq!(rust.attributes.get("topic"), Some(&serde_json::json!("rust")));

    let filter = reader.filter_by_id(&HashSet::from(["doc-rust-db".to_string()]));
    let query = MockEmbedder::embedding_for("rust");
    let results = reader
        .similarity_search_by_vector(&query, 10, Some(&filter))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.id, "doc-rust-db");
}

#[tokio::test]
async fn test_instrumented_store_behaves_like_inner() {
    let dir = TempDir::new().unwrap();
    let inner = VectorStoreFactory::new()
        .from_settings(&settings_for(&dir))
        .unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(wrap_with_instrumentation(inner));

    store.load_documents(sample_documents(), true).await.unwrap();
    let health = store.health_check().await.unwrap();
    assert!(health.healthy);
    assert_eq!(store.store_name(), "lancedb");
    assert!(store.search_by_id("doc-database").await.unwrap().is_some());
}
