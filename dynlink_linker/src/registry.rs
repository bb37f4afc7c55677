//! Linker registration.
//!
//! Hosts make linkers discoverable by registering [`LinkerExporter`]s. An
//! exporter may be tagged with a discovery scope; a factory only sees
//! unscoped exporters and those tagged with its own scope. The registration
//! list is resolved once per linker creation.

use crate::error::{LinkError, LinkResult};
use crate::linker::LinkerRef;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Source of discoverable linkers.
pub trait LinkerExporter: Send + Sync {
    fn name(&self) -> &str;

    /// Discovery scope this exporter is visible in. `None` is visible
    /// everywhere.
    fn scope(&self) -> Option<&str> {
        None
    }

    /// Produce the exported linkers. A failure is recorded by the factory
    /// and does not stop discovery.
    fn linkers(&self) -> LinkResult<Vec<LinkerRef>>;
}

/// An exporter whose linkers failed to load.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryError {
    pub exporter: String,
    pub error: LinkError,
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "linker exporter {} failed: {}", self.exporter, self.error)
    }
}

/// Exporter over a fixed linker list.
pub struct StaticExporter {
    name: String,
    scope: Option<String>,
    linkers: Vec<LinkerRef>,
}

impl StaticExporter {
    pub fn new(name: impl Into<String>, linkers: Vec<LinkerRef>) -> Self {
        Self {
            name: name.into(),
            scope: None,
            linkers,
        }
    }

    /// Restrict visibility to one discovery scope.
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

impl LinkerExporter for StaticExporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    fn linkers(&self) -> LinkResult<Vec<LinkerRef>> {
        Ok(self.linkers.clone())
    }
}

/// Registration list of linker exporters.
#[derive(Default)]
pub struct LinkerRegistry {
    exporters: RwLock<Vec<Arc<dyn LinkerExporter>>>,
}

impl LinkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, exporter: Arc<dyn LinkerExporter>) {
        self.exporters.write().push(exporter);
    }

    pub fn len(&self) -> usize {
        self.exporters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.exporters.read().is_empty()
    }

    /// Collect the linkers visible in `scope`, in registration order, with
    /// the failures of exporters that could not produce theirs.
    pub fn discover(&self, scope: Option<&str>) -> (Vec<LinkerRef>, Vec<DiscoveryError>) {
        let mut linkers = Vec::new();
        let mut errors = Vec::new();
        for exporter in self.exporters.read().iter() {
            let visible = match exporter.scope() {
                None => true,
                Some(own) => scope == Some(own),
            };
            if !visible {
                continue;
            }
            match exporter.linkers() {
                Ok(found) => linkers.extend(found),
                Err(error) => errors.push(DiscoveryError {
                    exporter: exporter.name().to_string(),
                    error,
                }),
            }
        }
        (linkers, errors)
    }
}

impl fmt::Debug for LinkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .exporters
            .read()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        f.debug_struct("LinkerRegistry").field("exporters", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beans::BeansLinker;

    struct Broken;

    impl LinkerExporter for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn linkers(&self) -> LinkResult<Vec<LinkerRef>> {
            Err(LinkError::LinkerFailure {
                linker: "broken".into(),
                message: "missing dependency".into(),
            })
        }
    }

    #[test]
    fn test_scoped_discovery() {
        let registry = LinkerRegistry::new();
        registry.register(Arc::new(StaticExporter::new(
            "global",
            vec![Arc::new(BeansLinker::default()) as LinkerRef],
        )));
        registry.register(Arc::new(
            StaticExporter::new("scoped", vec![Arc::new(BeansLinker::default()) as LinkerRef]).in_scope("engine-a"),
        ));
        registry.register(Arc::new(Broken));
        assert_eq!(registry.len(), 3);

        let (linkers, errors) = registry.discover(None);
        assert_eq!(linkers.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].exporter, "broken");

        let (linkers, _) = registry.discover(Some("engine-a"));
        assert_eq!(linkers.len(), 2);
        let (linkers, _) = registry.discover(Some("engine-b"));
        assert_eq!(linkers.len(), 1);
    }
}
