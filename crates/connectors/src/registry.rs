use super::{BoxedConnector, Connector};
use std::sync::Arc;

/// Registry holds the installed connectors, in registration order.
/// It's constructed once at process start and passed by reference into
/// discovery and the orchestrator; there is no ambient global state.
#[derive(Default)]
pub struct Registry(Vec<BoxedConnector>);

impl Registry {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Register a connector, validating its definition. Registering a
    /// second connector with the same name replaces the first; the later
    /// registration wins everywhere, matching the discovery tie-break.
    pub fn register<C: Connector>(mut self, connector: C) -> anyhow::Result<Self> {
        connector.config().validate()?;

        let connector: BoxedConnector = Arc::new(connector);
        let name = connector.config().name.clone();

        if let Some(existing) = self
            .0
            .iter_mut()
            .find(|entry| entry.config().name == name)
        {
            tracing::warn!(%name, "connector is registered twice; the later registration wins");
            *existing = connector;
        } else {
            self.0.push(connector);
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&BoxedConnector> {
        self.0.iter().find(|entry| entry.config().name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoxedConnector> {
        self.0.iter()
    }

    /// Connector names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|entry| entry.config().name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
