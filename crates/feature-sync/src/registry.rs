//! Feature Name Registry

use crate::error::RegistryError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use storage::FeatureStore;
use tracing::{debug, info};

/// Maps feature names to stable integer ids.
///
/// Ids are assigned once and never change. Registration assumes a single
/// writer; two processes registering the same new name concurrently may
/// both attempt the insert.
pub struct FeatureRegistry<S: FeatureStore + ?Sized> {
    store: Arc<S>,
}

impl<S: FeatureStore + ?Sized> FeatureRegistry<S> {
    /// Create a registry over a feature store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve every name to its id, registering unknown names in the order
    /// they first appear.
    pub async fn resolve(&self, names: &[String]) -> Result<HashMap<String, i64>, RegistryError> {
        let catalog = self.store.feature_catalog().await?;
        let known: HashSet<&str> = catalog.iter().map(|f| f.feature_name.as_str()).collect();

        let mut seen = HashSet::new();
        let new_names: Vec<String> = names
            .iter()
            .filter(|name| !known.contains(name.as_str()) && seen.insert(name.as_str()))
            .cloned()
            .collect();

        let catalog = if new_names.is_empty() {
            catalog
        } else {
            info!("Registering {} new features", new_names.len());
            self.store.insert_features(&new_names).await?;
            self.store.feature_catalog().await?
        };
        debug!("Feature catalog holds {} entries", catalog.len());

        let ids: HashMap<String, i64> = catalog
            .into_iter()
            .map(|f| (f.feature_name, f.feature_id))
            .collect();

        let mut resolved = HashMap::with_capacity(names.len());
        for name in names {
            let id = ids
                .get(name)
                .copied()
                .ok_or_else(|| RegistryError::Unresolved(name.clone()))?;
            resolved.insert(name.clone(), id);
        }
        Ok(resolved)
    }
}
