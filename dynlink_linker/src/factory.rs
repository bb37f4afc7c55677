//! Dynamic linker factory.
//!
//! Assembles the linker chain and policy of a [`DynamicLinker`]:
//!
//! ```text
//! ┌─────────────┐   ┌─────────────────────────┐   ┌──────────────────┐
//! │ prioritized │ → │ discovered / restricted │ → │ fallback (beans) │
//! └─────────────┘   └─────────────────────────┘   └──────────────────┘
//! ```

use crate::beans::BeansLinker;
use crate::chain::LinkerChain;
use crate::config::LinkerConfig;
use crate::conversion::TypeConverterFactory;
use crate::dynamic_linker::{DynamicLinker, PrelinkTransformer};
use crate::error::LinkResult;
use crate::linker::LinkerRef;
use crate::registry::{DiscoveryError, LinkerRegistry};
use crate::services::{InternalObjectsFilter, LinkerServices};
use crate::stats::LinkerStats;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builder for [`DynamicLinker`]s.
#[derive(Default)]
pub struct DynamicLinkerFactory {
    prioritized: Vec<LinkerRef>,
    fallback: Option<Vec<LinkerRef>>,
    registry: Option<Arc<LinkerRegistry>>,
    discovery_scope: Option<String>,
    restricted: Option<Vec<LinkerRef>>,
    config: LinkerConfig,
    prelink: Option<PrelinkTransformer>,
    internal_objects_filter: Option<InternalObjectsFilter>,
    discovery_errors: Mutex<Vec<DiscoveryError>>,
}

impl DynamicLinkerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Linker tried before every other.
    pub fn prioritized_linker(mut self, linker: LinkerRef) -> Self {
        self.prioritized.push(linker);
        self
    }

    pub fn prioritized_linkers(mut self, linkers: impl IntoIterator<Item = LinkerRef>) -> Self {
        self.prioritized.extend(linkers);
        self
    }

    /// Replace the default bean fallback. An empty list means no fallback.
    pub fn fallback_linkers(mut self, linkers: impl IntoIterator<Item = LinkerRef>) -> Self {
        self.fallback = Some(linkers.into_iter().collect());
        self
    }

    /// Registration list consulted for discoverable linkers.
    pub fn registry(mut self, registry: Arc<LinkerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn discovery_scope(mut self, scope: impl Into<String>) -> Self {
        self.discovery_scope = Some(scope.into());
        self
    }

    /// Use exactly these linkers in place of discovery.
    pub fn restricted_linkers(mut self, linkers: impl IntoIterator<Item = LinkerRef>) -> Self {
        self.restricted = Some(linkers.into_iter().collect());
        self
    }

    pub fn unstable_relink_threshold(mut self, threshold: Option<u32>) -> Self {
        self.config.unstable_relink_threshold = threshold;
        self
    }

    pub fn max_chain_length(mut self, length: usize) -> Self {
        self.config.max_chain_length = length;
        self
    }

    pub fn prelink_transformer(mut self, transformer: PrelinkTransformer) -> Self {
        self.prelink = Some(transformer);
        self
    }

    pub fn internal_objects_filter(mut self, filter: InternalObjectsFilter) -> Self {
        self.internal_objects_filter = Some(filter);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: LinkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Errors recorded by the last [`create_linker`](Self::create_linker).
    pub fn discovery_errors(&self) -> Vec<DiscoveryError> {
        self.discovery_errors.lock().clone()
    }

    /// Build a linker. The registration list is resolved now and never again
    /// for the returned linker.
    pub fn create_linker(&self) -> LinkResult<DynamicLinker> {
        self.config.validate()?;

        let discovered = match (&self.restricted, &self.registry) {
            (Some(restricted), _) => restricted.clone(),
            (None, Some(registry)) => {
                let (linkers, errors) = registry.discover(self.discovery_scope.as_deref());
                for error in &errors {
                    warn!(exporter = %error.exporter, error = %error.error, "linker discovery failed");
                }
                *self.discovery_errors.lock() = errors;
                linkers
            }
            (None, None) => Vec::new(),
        };
        let fallback = match &self.fallback {
            Some(linkers) => linkers.clone(),
            None => vec![Arc::new(BeansLinker::default()) as LinkerRef],
        };

        let mut kept: FxHashMap<String, LinkerRef> = FxHashMap::default();
        let mut linkers: Vec<LinkerRef> = Vec::new();
        for linker in self.prioritized.iter().chain(&discovered).chain(&fallback) {
            match kept.get(linker.name()) {
                Some(first) if Arc::ptr_eq(first, linker) => {}
                Some(_) => warn!(linker = linker.name(), "dropping distinct linker with duplicate name"),
                None => {
                    kept.insert(linker.name().to_string(), linker.clone());
                    linkers.push(linker.clone());
                }
            }
        }

        let chain = LinkerChain::new(linkers);
        debug!(linkers = ?chain.names(), "assembled linker chain");

        let stats = Arc::new(LinkerStats::new());
        let converters = TypeConverterFactory::new(chain.conversion_linkers(), stats.clone());
        let services = LinkerServices::new(chain, converters, self.internal_objects_filter.clone());
        Ok(DynamicLinker::new(
            services,
            self.prelink.clone(),
            self.config.clone(),
            stats,
        ))
    }
}
