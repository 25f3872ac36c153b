//! Stream descriptors, import modes and the destination catalog.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifies a target stream by optional namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// The namespace (schema, dataset, ...), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// The stream name.
    pub name: String,
}

impl StreamDescriptor {
    /// Creates a descriptor without a namespace.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A path to a (possibly nested) field of a record payload.
pub type FieldPath = Vec<String>;

/// How records of a stream are written at the destination.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ImportMode {
    /// Records are appended as-is.
    #[default]
    Append,
    /// The destination table is replaced by the sync.
    Overwrite,
    /// Last-write-wins merge by primary key.
    Dedupe {
        /// Primary key fields, each a path into the payload.
        primary_key: Vec<FieldPath>,
        /// Cursor field used to order duplicates.
        #[serde(default)]
        cursor: FieldPath,
    },
}

impl ImportMode {
    /// Creates a dedupe mode over the given top-level primary key fields.
    #[must_use]
    pub fn dedupe<I, S>(primary_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Dedupe {
            primary_key: primary_key.into_iter().map(|f| vec![f.into()]).collect(),
            cursor: Vec::new(),
        }
    }

    /// Returns true for dedupe mode.
    #[must_use]
    pub fn is_dedupe(&self) -> bool {
        matches!(self, Self::Dedupe { .. })
    }

    /// Returns the primary key, or an empty slice for non-dedupe modes.
    #[must_use]
    pub fn primary_key(&self) -> &[FieldPath] {
        match self {
            Self::Dedupe { primary_key, .. } => primary_key,
            Self::Append | Self::Overwrite => &[],
        }
    }
}

/// A stream as configured for the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationStream {
    /// The stream identity.
    pub descriptor: StreamDescriptor,
    /// How records are written.
    #[serde(default)]
    pub import_mode: ImportMode,
}

impl DestinationStream {
    /// Creates an append-mode stream.
    #[must_use]
    pub fn new(descriptor: StreamDescriptor) -> Self {
        Self {
            descriptor,
            import_mode: ImportMode::Append,
        }
    }

    /// Sets the import mode.
    #[must_use]
    pub fn with_import_mode(mut self, import_mode: ImportMode) -> Self {
        self.import_mode = import_mode;
        self
    }

    /// Checks that dedupe streams declare a primary key of non-empty paths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.import_mode.is_dedupe() {
            return Ok(());
        }
        let primary_key = self.import_mode.primary_key();
        if primary_key.is_empty() {
            return Err(ConfigError::dedupe_without_primary_key(&self.descriptor));
        }
        if primary_key.iter().any(Vec::is_empty) {
            return Err(ConfigError::empty_primary_key_path(&self.descriptor));
        }
        Ok(())
    }
}

/// The set of streams a sync writes to.
#[derive(Debug, Clone, Default)]
pub struct DestinationCatalog {
    streams: HashMap<StreamDescriptor, DestinationStream>,
}

impl DestinationCatalog {
    /// Creates a catalog from a list of streams.
    #[must_use]
    pub fn new(streams: impl IntoIterator<Item = DestinationStream>) -> Self {
        Self {
            streams: streams
                .into_iter()
                .map(|s| (s.descriptor.clone(), s))
                .collect(),
        }
    }

    /// Looks up a stream.
    #[must_use]
    pub fn get(&self, descriptor: &StreamDescriptor) -> Option<&DestinationStream> {
        self.streams.get(descriptor)
    }

    /// Iterates the streams in no particular order.
    pub fn streams(&self) -> impl Iterator<Item = &DestinationStream> {
        self.streams.values()
    }

    /// Returns the number of streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Returns true if the catalog has no streams.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Validates every stream.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.streams.values().try_for_each(DestinationStream::validate)
    }
}
