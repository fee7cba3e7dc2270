//! Table bindings and upstream sources

use std::collections::HashMap;
use std::sync::Arc;

use super::Syncer;
use crate::store::Store;

/// Table name to adapter bindings, in registration order
#[derive(Default)]
pub struct Registry {
    syncers: HashMap<String, Arc<dyn Syncer>>,
    order: Vec<String>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `table` to `syncer`.
    ///
    /// Rebinding replaces the adapter but keeps the table's original position.
    pub fn bind(&mut self, table: impl Into<String>, syncer: Arc<dyn Syncer>) {
        let table = table.into();
        if self.syncers.insert(table.clone(), syncer).is_none() {
            self.order.push(table);
        } else {
            tracing::warn!("Replacing syncer already registered for {}", table);
        }
    }

    /// Adapter bound to `table`
    pub fn lookup(&self, table: &str) -> Option<Arc<dyn Syncer>> {
        self.syncers.get(table).cloned()
    }

    /// Table names in registration order
    pub fn tables(&self) -> &[String] {
        &self.order
    }

    /// Bindings in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Syncer>)> {
        self.order
            .iter()
            .filter_map(|table| self.syncers.get(table).map(|s| (table.as_str(), s)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// One upstream instance paired with the local store receiving its rows
#[derive(Clone)]
pub struct SourceDescriptor {
    /// Base URL of the peer; empty for a comparison-only source
    pub url: String,
    /// Local copy of the peer's tables
    pub store: Arc<Store>,
    /// Name used in logs and listings
    pub label: String,
}

impl SourceDescriptor {
    /// Passive sources are kept for offline comparison and never polled
    pub fn is_passive(&self) -> bool {
        self.url.trim().is_empty()
    }
}

/// Upstream instances in polling order
#[derive(Default, Clone)]
pub struct SourceSet {
    sources: Vec<SourceDescriptor>,
}

impl SourceSet {
    /// Create an empty source list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source
    pub fn add(&mut self, url: impl Into<String>, store: Arc<Store>, label: impl Into<String>) {
        self.sources.push(SourceDescriptor {
            url: url.into(),
            store,
            label: label.into(),
        });
    }

    /// All sources, passive ones included
    pub fn iter(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter()
    }

    /// Sources that are polled during a sweep
    pub fn active(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter().filter(|s| !s.is_passive())
    }

    /// Labels of every source in registration order
    pub fn labels(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.label.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::sync::{Page, Records};

    struct Named(&'static str);

    #[async_trait::async_trait]
    impl Syncer for Named {
        async fn last_entry(&self, _store: &Store) -> Result<String> {
            Ok(self.0.to_string())
        }

        async fn collect(&self, _url: &str) -> Result<Page> {
            Ok(Page::up_to_date())
        }

        async fn retrieve(&self, _cursor: &str, _skip: u64, _take: u64) -> Result<Page> {
            Ok(Page::up_to_date())
        }

        async fn append(&self, _store: &Store, _records: &Records) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_rebind_keeps_first_position() {
        let mut registry = Registry::new();
        registry.bind("mempool", Arc::new(Named("v1")));
        registry.bind("vsp_tick", Arc::new(Named("ticks")));
        registry.bind("mempool", Arc::new(Named("v2")));

        assert_eq!(registry.tables(), &["mempool".to_string(), "vsp_tick".to_string()]);
        assert_eq!(registry.len(), 2);

        let store = Store::open_in_memory("local").unwrap();
        let bound = registry.lookup("mempool").unwrap();
        assert_eq!(bound.last_entry(&store).await.unwrap(), "v2");
        assert!(registry.lookup("blocks").is_none());
    }

    #[test]
    fn test_passive_sources_are_not_active() {
        let store = Arc::new(Store::open_in_memory("shared").unwrap());
        let mut sources = SourceSet::new();
        sources.add("http://eu.example.com:7777", Arc::clone(&store), "eu");
        sources.add("", Arc::clone(&store), "archive");
        sources.add("http://us.example.com:7777", store, "us");

        assert_eq!(sources.len(), 3);
        assert_eq!(sources.labels(), vec!["eu", "archive", "us"]);
        let active: Vec<_> = sources.active().map(|s| s.label.as_str()).collect();
        assert_eq!(active, vec!["eu", "us"]);
    }
}
