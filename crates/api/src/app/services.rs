//! Infrastructure wiring: picks the store backend and builds the audit service.
//!
//! - In-memory (default): catalog seeded from `CATALOG_SEED_PATH`, sessions
//!   and records kept in process.
//! - Postgres (`USE_PERSISTENT_STORES=true`): one pool serves the catalog
//!   and the audit tables; the schema is applied at startup.

use std::sync::Arc;

use anyhow::Context;

use shelfaudit_infra::config::{AppConfig, StoreBackend};
use shelfaudit_infra::service::AuditService;
use shelfaudit_infra::store::{
    AuditStore, InMemoryAuditStore, InMemoryInventoryIndex, InventoryIndex, PostgresAuditStore,
};
use shelfaudit_inventory::InventoryRecord;

pub type DynInventoryIndex = Arc<dyn InventoryIndex>;
pub type DynAuditStore = Arc<dyn AuditStore>;

/// Shared application state handed to every handler.
pub struct AppServices {
    pub audit: AuditService<DynInventoryIndex, DynAuditStore>,
}

impl AppServices {
    pub fn new(index: DynInventoryIndex, store: DynAuditStore, session_list_limit: usize) -> Self {
        Self {
            audit: AuditService::new(index, store).with_session_list_limit(session_list_limit),
        }
    }

    /// In-memory wiring over a fixed catalog (dev/test).
    pub fn in_memory(catalog: Vec<InventoryRecord>, session_list_limit: usize) -> Self {
        let index: DynInventoryIndex = Arc::new(InMemoryInventoryIndex::with_records(catalog));
        let store: DynAuditStore = Arc::new(InMemoryAuditStore::new());
        Self::new(index, store, session_list_limit)
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    match &config.store {
        StoreBackend::InMemory => {
            let catalog = config.load_catalog_seed()?;
            tracing::info!(
                backend = "in_memory",
                catalog_items = catalog.len(),
                "audit services ready"
            );
            Ok(AppServices::in_memory(catalog, config.session_list_limit))
        }
        StoreBackend::Postgres { database_url } => {
            let pg = PostgresAuditStore::connect(database_url)
                .await
                .context("failed to connect to postgres")?;
            pg.migrate().await.context("failed to apply audit schema")?;

            if config.catalog_seed_path.is_some() {
                tracing::warn!("CATALOG_SEED_PATH is ignored with persistent stores");
            }
            tracing::info!(backend = "postgres", "audit services ready");

            let pg = Arc::new(pg);
            let index: DynInventoryIndex = pg.clone();
            let store: DynAuditStore = pg;
            Ok(AppServices::new(index, store, config.session_list_limit))
        }
    }
}
