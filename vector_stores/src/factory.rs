use super::azure_ai_search::AzureAiSearchStore;
use super::lancedb::LanceDbStore;
use super::milvus::MilvusStore;
use super::{StoreConfig, StoreError, VectorStore};
use config::{Validate, VectorStoreSettings};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// Builds a store from a configuration bundle.
pub type StoreConstructor =
    Arc<dyn Fn(&StoreConfig) -> Result<Arc<dyn VectorStore>, StoreError> + Send + Sync>;

/// Store identifiers resolved without consulting the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VectorStoreType {
    #[serde(rename = "lancedb")]
    LanceDb,
    #[serde(rename = "azure_ai_search")]
    AzureAiSearch,
    #[serde(rename = "milvus")]
    Milvus
}

impl VectorStoreType {
    pub const ALL: [VectorStoreType; 3] = [
        VectorStoreType::LanceDb,
        VectorStoreType::AzureAiSearch,
        VectorStoreType::Milvus
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VectorStoreType::LanceDb => "lancedb",
            VectorStoreType::AzureAiSearch => "azure_ai_search",
            VectorStoreType::Milvus => "milvus"
        }
    }

    /// Exact, case-sensitive match against the built-in names.
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == identifier)
    }

    fn construct(self, config: &StoreConfig) -> Result<Arc<dyn VectorStore>, StoreError> {
        match self {
            VectorStoreType::LanceDb => Ok(Arc::new(LanceDbStore::from_config(config)?)),
            VectorStoreType::AzureAiSearch => {
                Ok(Arc::new(AzureAiSearchStore::from_config(config)?))
            }
            VectorStoreType::Milvus => Ok(Arc::new(MilvusStore::from_config(config)?))
        }
    }
}

impl AsRef<str> for VectorStoreType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for VectorStoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VectorStoreType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_identifier(s).ok_or_else(|| StoreError::unknown_backend(s))
    }
}

static GLOBAL_FACTORY: LazyLock<VectorStoreFactory> = LazyLock::new(VectorStoreFactory::new);

/// Maps store identifiers to constructors.
///
/// Resolution order in [`VectorStoreFactory::get_store`]:
/// 1. built-in identifiers ([`VectorStoreType`]), which registration cannot
///    shadow;
/// 2. constructors added through [`VectorStoreFactory::register`];
/// 3. otherwise [`StoreError::UnknownBackendType`].
///
/// Prefer owning a factory at the composition root. [`VectorStoreFactory::global`]
/// is a process-wide instance for plugins that register themselves at
/// startup; it starts empty and is never cleared.
#[derive(Default)]
pub struct VectorStoreFactory {
    constructors: RwLock<HashMap<String, StoreConstructor>>
}

impl VectorStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static VectorStoreFactory {
        &GLOBAL_FACTORY
    }

    /// Inserts or replaces the constructor for `store_type`.
    pub fn register(&self, store_type: impl Into<String>, constructor: StoreConstructor) {
        let store_type = store_type.into();
        if VectorStoreType::from_identifier(&store_type).is_some() {
            tracing::warn!(
                store_type = %store_type,
                "Registered constructor is shadowed by the built-in store of the same name"
            );
        }

        let replaced = self
            .constructors
            .write()
            .insert(store_type.clone(), constructor)
            .is_some();
        tracing::debug!(store_type = %store_type, replaced, "Registered vector store constructor");
    }

    pub fn register_fn<F>(&self, store_type: impl Into<String>, constructor: F)
    where
        F: Fn(&StoreConfig) -> Result<Arc<dyn VectorStore>, StoreError> + Send + Sync + 'static
    {
        self.register(store_type, Arc::new(constructor));
    }

    pub fn unregister(&self, store_type: &str) -> bool {
        self.constructors.write().remove(store_type).is_some()
    }

    pub fn is_registered(&self, store_type: &str) -> bool {
        self.constructors.read().contains_key(store_type)
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Resolves `store_type` and constructs the store with `config`.
    ///
    /// Constructor failures are returned as-is.
    pub fn get_store(
        &self,
        store_type: impl AsRef<str>,
        config: &StoreConfig
    ) -> Result<Arc<dyn VectorStore>, StoreError> {
        let store_type = store_type.as_ref();

        if let Some(builtin) = VectorStoreType::from_identifier(store_type) {
            tracing::debug!(store_type, "Constructing built-in vector store");
            return builtin.construct(config);
        }

        let constructor = self.constructors.read().get(store_type).cloned();
        match constructor {
            Some(constructor) => {
                tracing::debug!(store_type, "Constructing registered vector store");
                constructor(config)
            }
            None => Err(StoreError::unknown_backend(store_type))
        }
    }

    /// Validates `settings` and constructs the store they describe.
    pub fn from_settings(
        &self,
        settings: &VectorStoreSettings
    ) -> Result<Arc<dyn VectorStore>, StoreError> {
        settings
            .validate()
            .map_err(|e| StoreError::Configuration(e.to_string()))?;
        let config = StoreConfig::from(settings.options.clone());
        self.get_store(&settings.store_type, &config)
    }
}

impl std::fmt::Debug for VectorStoreFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreFactory")
            .field("registered_types", &self.registered_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HealthStatus, QueryFilter, SearchResult, StoreDocument};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TaggedStore {
        tag: String
    }

    #[async_trait]
    impl VectorStore for TaggedStore {
        fn store_name(&self) -> &'static str {
            "tagged"
        }

        async fn load_documents(
            &self,
            _documents: Vec<StoreDocument>,
            _overwrite: bool
        ) -> Result<(), StoreError> {
            Ok(())
        }

        async fn similarity_search_by_vector(
            &self,
            _query: &[f32],
            _k: usize,
            _filter: Option<&QueryFilter>
        ) -> Result<Vec<SearchResult>, StoreError> {
            Ok(Vec::new())
        }

        fn filter_by_id(&self, _include_ids: &HashSet<String>) -> QueryFilter {
            QueryFilter::Expression(self.tag.clone())
        }

        async fn search_by_id(&self, _id: &str) -> Result<Option<StoreDocument>, StoreError> {
            Ok(None)
        }

        async fn delete(&self, _ids: &[String]) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn health_check(&self) -> Result<HealthStatus, StoreError> {
            Ok(HealthStatus::healthy("tagged"))
        }
    }

    fn tagged(tag: &str) -> StoreConstructor {
        let tag = tag.to_string();
        Arc::new(
            move |_config: &StoreConfig| -> Result<Arc<dyn VectorStore>, StoreError> {
                Ok(Arc::new(TaggedStore { tag: tag.clone() }))
            }
        )
    }

    fn tag_of(store: &Arc<dyn VectorStore>) -> QueryFilter {
        store.filter_by_id(&HashSet::new())
    }

    #[test]
    fn test_store_type_parsing_is_exact() {
        assert_eq!(
            "lancedb".parse::<VectorStoreType>().unwrap(),
            VectorStoreType::LanceDb
        );
        assert_eq!(
            "azure_ai_search".parse::<VectorStoreType>().unwrap(),
            VectorStoreType::AzureAiSearch
        );
        assert_eq!(
            "milvus".parse::<VectorStoreType>().unwrap(),
            VectorStoreType::Milvus
        );

        assert!("LanceDB".parse::<VectorStoreType>().is_err());
        assert!("azure-ai-search".parse::<VectorStoreType>().is_err());
        assert!("".parse::<VectorStoreType>().is_err());
    }

    #[test]
    fn test_store_type_display_round_trips_serde() {
        for store_type in VectorStoreType::ALL {
            let json = serde_json::to_string(&store_type).unwrap();
            assert_eq!(json, format!("\"{}\"", store_type));
        }
    }

    #[test]
    fn test_builtins_resolve_without_registration() {
        let factory = VectorStoreFactory::new();
        let config = StoreConfig::new().with("url", "http://localhost:9999");

        for store_type in VectorStoreType::ALL {
            let store = factory.get_store(store_type, &config).unwrap();
            assert_eq!(store.store_name(), store_type.as_str());
        }
    }

    #[test]
    fn test_unknown_type_names_identifier() {
        let factory = VectorStoreFactory::new();
        let err = factory
            .get_store("nonexistent", &StoreConfig::new())
            .err()
            .unwrap();

        assert!(matches!(
            &err,
            StoreError::UnknownBackendType { store_type } if store_type == "nonexistent"
        ));
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn test_registered_constructor_invoked_once_with_config() {
        let factory = VectorStoreFactory::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen_dim = Arc::new(AtomicUsize::new(0));

        let (calls_in, seen_in) = (calls.clone(), seen_dim.clone());
        factory.register_fn("memory", move |config: &StoreConfig| {
            calls_in.fetch_add(1, Ordering::SeqCst);
            seen_in.store(config.get_usize("dim").unwrap_or(0), Ordering::SeqCst);
            Ok(Arc::new(TaggedStore {
                tag: "memory".into()
            }) as Arc<dyn VectorStore>)
        });

        let store = factory
            .get_store("memory", &StoreConfig::new().with("dim", 128))
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen_dim.load(Ordering::SeqCst), 128);
        assert_eq!(tag_of(&store), QueryFilter::Expression("memory".into()));
    }

    #[test]
    fn test_reregistration_replaces_constructor() {
        let factory = VectorStoreFactory::new();
        factory.register("custom", tagged("first"));
        factory.register("custom", tagged("second"));

        let store = factory.get_store("custom", &StoreConfig::new()).unwrap();
        assert_eq!(tag_of(&store), QueryFilter::Expression("second".into()));
        assert_eq!(factory.registered_types(), vec!["custom".to_string()]);
    }

    #[test]
    fn test_builtin_cannot_be_shadowed() {
        let factory = VectorStoreFactory::new();
        factory.register("lancedb", tagged("impostor"));

        let store = factory.get_store("lancedb", &StoreConfig::new()).unwrap();
        assert_eq!(store.store_name(), "lancedb");
    }

    #[test]
    fn test_constructor_error_propagates_unchanged() {
        let factory = VectorStoreFactory::new();
        factory.register_fn("broken", |_config: &StoreConfig| {
            Err(StoreError::BackendUnavailable("refused".into()))
        });

        let err = factory.get_store("broken", &StoreConfig::new()).err().unwrap();
        assert!(matches!(err, StoreError::BackendUnavailable(msg) if msg == "refused"));
    }

    #[test]
    fn test_unregister() {
        let factory = VectorStoreFactory::new();
        factory.register("custom", tagged("x"));
        assert!(factory.is_registered("custom"));

        assert!(factory.unregister("custom"));
        assert!(!factory.unregister("custom"));
        assert!(factory.get_store("custom", &StoreConfig::new()).is_err());
    }

    #[test]
    fn test_identifier_match_is_case_sensitive() {
        let factory = VectorStoreFactory::new();
        factory.register("Custom", tagged("upper"));

        assert!(factory.get_store("Custom", &StoreConfig::new()).is_ok());
        assert!(matches!(
            factory.get_store("custom", &StoreConfig::new()),
            Err(StoreError::UnknownBackendType { .. })
        ));
    }

    #[test]
    fn test_from_settings() {
        let factory = VectorStoreFactory::new();
        factory.register("custom", tagged("settings"));

        let settings = VectorStoreSettings::new("custom").with_option("dim", 3);
        let store = factory.from_settings(&settings).unwrap();
        assert_eq!(tag_of(&store), QueryFilter::Expression("settings".into()));

        let invalid = VectorStoreSettings::new("");
        assert!(matches!(
            factory.from_settings(&invalid),
            Err(StoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_lists_registered_types() {
        let factory = VectorStoreFactory::new();
        factory.register("b", tagged("b"));
        factory.register("a", tagged("a"));
        assert!(format!("{:?}", factory).contains("[\"a\", \"b\"]"));
    }
}
