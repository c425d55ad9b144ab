/// Hot-reload funnel registry using ArcSwap
///
/// Lock-free, atomic updates to the in-memory map of compiled funnels.
/// Each update swaps the entire registry pointer, so live sessions keep
/// their `Arc` to the compiled graph they started on while new sessions
/// pick up the reloaded version.

use crate::funnel::graph::{CompiledFunnel, SharedFunnel};
use crate::funnel::storage::FunnelStorage;
use crate::funnel::types::FunnelDefinition;
use anyhow::Result;
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

/// Lock-free registry of compiled funnels
#[derive(Debug)]
pub struct FunnelRegistry {
    /// Atomic pointer to the funnel map (funnel_id -> compiled funnel)
    funnels: ArcSwap<HashMap<String, SharedFunnel>>,
    /// Persistent storage backing reload operations
    storage: FunnelStorage,
}

impl FunnelRegistry {
    pub fn new(storage: FunnelStorage) -> Self {
        Self {
            funnels: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
        }
    }

    /// Populate the registry from storage at startup
    ///
    /// Definitions that no longer compile (e.g. saved under an older,
    /// looser validation) are skipped with an error log rather than
    /// blocking startup.
    pub async fn init_from_storage(&self) -> Result<()> {
        let stored = self.storage.load_all_funnels().await?;
        let mut compiled = HashMap::new();

        for (id, definition) in stored {
            match CompiledFunnel::compile(definition) {
                Ok(funnel) => {
                    compiled.insert(id, Arc::new(funnel));
                }
                Err(e) => {
                    tracing::error!("❌ Skipping stored funnel '{}': {}", id, e);
                }
            }
        }

        self.funnels.store(Arc::new(compiled));
        tracing::info!(
            "📊 Initialized funnel registry with {} funnels",
            self.funnels.load().len()
        );
        Ok(())
    }

    /// Hot-reload a single funnel from storage
    ///
    /// Atomic pointer swap; concurrent sessions are not blocked. Returns
    /// the compile warnings for the API to surface to the author.
    pub async fn reload_funnel(&self, funnel_id: &str) -> Result<Vec<String>> {
        let definition = self
            .storage
            .get_funnel(funnel_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Funnel not found: {}", funnel_id))?;

        let compiled = CompiledFunnel::compile(definition)?;
        let warnings = compiled.warnings.clone();

        let current = self.funnels.load();
        let mut next = (**current).clone();
        next.insert(funnel_id.to_string(), Arc::new(compiled));
        self.funnels.store(Arc::new(next));

        tracing::info!("🔥 Hot-reloaded funnel: {}", funnel_id);
        Ok(warnings)
    }

    /// Compile a definition without persisting it (save-time validation)
    pub fn validate(definition: FunnelDefinition) -> Result<Vec<String>, crate::error::GraphError> {
        CompiledFunnel::compile(definition).map(|compiled| compiled.warnings)
    }

    /// Get a compiled funnel by ID (lock-free read, cheap Arc clone)
    pub fn get_funnel(&self, funnel_id: &str) -> Option<SharedFunnel> {
        self.funnels.load().get(funnel_id).cloned()
    }

    /// List all registered funnel IDs
    pub fn list_funnel_ids(&self) -> Vec<String> {
        self.funnels.load().keys().cloned().collect()
    }

    /// Remove a funnel from the registry
    ///
    /// Sessions already running on it keep their `Arc` and finish
    /// normally; new sessions can no longer start.
    pub fn remove_funnel(&self, funnel_id: &str) {
        let current = self.funnels.load();
        let mut next = (**current).clone();
        if next.remove(funnel_id).is_some() {
            self.funnels.store(Arc::new(next));
            tracing::info!("🗑️ Removed funnel from registry: {}", funnel_id);
        }
    }
}
