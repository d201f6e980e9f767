use pipecore::{Connector, ConnectorDescriptor, FlowError};
use std::collections::HashMap;
use std::sync::Arc;

/// Constructor producing a fresh, unconfigured connector instance
pub type ConnectorConstructor = Arc<dyn Fn() -> Box<dyn Connector> + Send + Sync>;

/// Registry of available connector kinds.
///
/// Built once at startup and shared read-only with the engine.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    constructors: HashMap<String, ConnectorConstructor>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register a constructor under `kind`, replacing any previous one
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Connector> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.constructors.contains_key(&kind) {
            tracing::warn!("Replacing connector kind: {}", kind);
        } else {
            tracing::info!("Registering connector kind: {}", kind);
        }
        self.constructors.insert(kind, Arc::new(constructor));
    }

    /// Create a new connector instance of the given kind
    pub fn create(&self, kind: &str) -> Result<Box<dyn Connector>, FlowError> {
        self.constructors
            .get(kind)
            .map(|constructor| constructor())
            .ok_or_else(|| FlowError::UnknownConnectorKind(kind.to_string()))
    }

    pub fn get(&self, kind: &str) -> Option<ConnectorConstructor> {
        self.constructors.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered kinds in sorted order
    pub fn list_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.constructors.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Descriptors of every registered kind, sorted by kind
    pub fn catalog(&self) -> Vec<ConnectorDescriptor> {
        self.list_kinds()
            .iter()
            .filter_map(|kind| self.constructors.get(kind))
            .map(|constructor| constructor().descriptor())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("kinds", &self.list_kinds())
            .finish()
    }
}
