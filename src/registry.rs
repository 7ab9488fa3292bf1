//! Resource registry: record kind ⇄ resource type ⇄ descriptor.
//!
//! The registry is initialized lazily. The first lookup (or an explicit
//! [`initialize`](ResourceRegistry::initialize)) scans the configured
//! [`ResourceSource`] and merges the result with descriptors registered by
//! hand, which take precedence. Lookups hand out clones so callers never
//! share a descriptor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use indexmap::IndexMap;

use crate::descriptor::{ResourceDefinition, ResourceDescriptor};
use crate::error::DocumentError;
use crate::loader::{json_files_in, load_json};
use crate::record::{Record, RecordKind};
use crate::type_maker::TypeMaker;

/// Discovers descriptors when the registry initializes.
pub trait ResourceSource: Send + Sync {
    fn discover(&self) -> Vec<ResourceDescriptor>;
}

impl<F> ResourceSource for F
where
    F: Fn() -> Vec<ResourceDescriptor> + Send + Sync,
{
    fn discover(&self) -> Vec<ResourceDescriptor> {
        self()
    }
}

impl ResourceSource for Vec<ResourceDefinition> {
    fn discover(&self) -> Vec<ResourceDescriptor> {
        self.iter().cloned().map(ResourceDescriptor::from).collect()
    }
}

/// Scans a directory of `*.json` resource definitions.
///
/// Each file holds one definition object or an array of them. Unreadable
/// files are skipped with a warning.
#[derive(Debug, Clone)]
pub struct DefinitionDir {
    path: PathBuf,
}

impl DefinitionDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every definition in the directory.
    pub fn read(&self) -> Result<Vec<ResourceDefinition>, DocumentError> {
        let mut definitions = Vec::new();
        for file in json_files_in(&self.path)? {
            match read_definitions(&file) {
                Ok(mut found) => definitions.append(&mut found),
                Err(e) => tracing::warn!(file = %file.display(), error = %e, "skipping definition file"),
            }
        }
        Ok(definitions)
    }
}

fn read_definitions(file: &Path) -> Result<Vec<ResourceDefinition>, DocumentError> {
    let value = load_json(file)?;
    let parsed = if value.is_array() {
        serde_json::from_value(value)
    } else {
        serde_json::from_value(value).map(|def| vec![def])
    };
    parsed.map_err(|source| DocumentError::InvalidJson { source })
}

impl ResourceSource for DefinitionDir {
    fn discover(&self) -> Vec<ResourceDescriptor> {
        match self.read() {
            Ok(definitions) => definitions.into_iter().map(ResourceDescriptor::from).collect(),
            Err(e) => {
                tracing::warn!(dir = %self.path.display(), error = %e, "resource scan failed");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Default)]
struct RegistryIndex {
    by_type: IndexMap<String, ResourceDescriptor>,
    by_kind: HashMap<String, String>,
}

impl RegistryIndex {
    fn insert(&mut self, resource_type: String, descriptor: ResourceDescriptor) {
        self.by_type.insert(resource_type, descriptor);
        self.rebuild_kinds();
    }

    fn rebuild_kinds(&mut self) {
        self.by_kind = self
            .by_type
            .iter()
            .map(|(t, d)| (d.kind().path().to_string(), t.clone()))
            .collect();
    }
}

/// Lazily initialized lookup of resource descriptors.
pub struct ResourceRegistry {
    type_maker: TypeMaker,
    source: Option<Box<dyn ResourceSource>>,
    manual: IndexMap<String, ResourceDescriptor>,
    index: OnceLock<RegistryIndex>,
}

impl ResourceRegistry {
    pub fn new(type_maker: TypeMaker) -> Self {
        Self {
            type_maker,
            source: None,
            manual: IndexMap::new(),
            index: OnceLock::new(),
        }
    }

    /// Scan `source` on initialization.
    pub fn with_source(mut self, source: impl ResourceSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self.index = OnceLock::new();
        self
    }

    pub fn type_maker(&self) -> &TypeMaker {
        &self.type_maker
    }

    /// Type string for a descriptor: its override, else derived from its kind.
    pub fn type_for_descriptor(&self, descriptor: &ResourceDescriptor) -> String {
        match descriptor.type_override() {
            Some(t) => t.to_string(),
            None => self.type_maker.make_for_kind(descriptor.kind(), None),
        }
    }

    /// Type string for a kind: the registered descriptor's type, else derived.
    pub fn type_for_kind(&self, kind: &RecordKind) -> String {
        let index = self.index();
        kind.lineage()
            .find_map(|path| index.by_kind.get(path).cloned())
            .unwrap_or_else(|| self.type_maker.make_for_kind(kind, None))
    }

    /// Register (or overwrite) the descriptor for its type.
    pub fn register(&mut self, descriptor: ResourceDescriptor) {
        let resource_type = self.type_for_descriptor(&descriptor);
        tracing::debug!(%resource_type, kind = %descriptor.kind(), "registering resource");
        match self.index.get_mut() {
            Some(index) => index.insert(resource_type, descriptor),
            None => {
                self.manual.insert(resource_type, descriptor);
            }
        }
    }

    /// Build the index once; later calls are no-ops.
    pub fn initialize(&self) {
        self.index();
    }

    fn index(&self) -> &RegistryIndex {
        self.index.get_or_init(|| {
            let mut index = RegistryIndex::default();
            if let Some(source) = &self.source {
                for descriptor in source.discover() {
                    let resource_type = self.type_for_descriptor(&descriptor);
                    index.by_type.insert(resource_type, descriptor);
                }
            }
            for (resource_type, descriptor) in &self.manual {
                index
                    .by_type
                    .insert(resource_type.clone(), descriptor.clone());
            }
            index.rebuild_kinds();
            tracing::debug!(resources = index.by_type.len(), "resource registry initialized");
            index
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.index.get().is_some()
    }

    /// Registered types, in registration order.
    pub fn types(&self) -> Vec<String> {
        self.index().by_type.keys().cloned().collect()
    }

    /// Descriptor clone for a resource type.
    pub fn get_by_type(&self, resource_type: &str) -> Option<ResourceDescriptor> {
        self.index().by_type.get(resource_type).cloned()
    }

    /// Descriptor clone for a record kind, honoring declared ancestors.
    pub fn get_by_kind(&self, kind: &RecordKind) -> Option<ResourceDescriptor> {
        let index = self.index();
        kind.lineage().find_map(|path| {
            index
                .by_kind
                .get(path)
                .and_then(|t| index.by_type.get(t))
                .cloned()
        })
    }

    /// Descriptor clone for a live record.
    pub fn get_by_record(&self, record: &dyn Record) -> Option<ResourceDescriptor> {
        self.get_by_kind(record.kind())
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("type_maker", &self.type_maker)
            .field("manual", &self.manual.keys().collect::<Vec<_>>())
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
