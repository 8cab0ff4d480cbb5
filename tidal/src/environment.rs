use crate::{
    driver::{DriverSpec, Engine, Registry},
    Connection, Result,
};
use std::sync::Arc;

/// An opened engine, from which connections are created.
///
/// Environments are `Send + Sync`; connections created from one environment
/// to the same database see each other's committed data.
pub struct Environment {
    engine: Arc<dyn Engine>,
    spec: DriverSpec,
}

impl Environment {
    /// Opens the engine named by `spec`, e.g. `"memory:default"`.
    pub fn new(registry: &Registry, spec: &str) -> Result<Self> {
        let spec = DriverSpec::parse(spec)?;
        let engine = registry.open(&spec)?;
        Ok(Self { engine, spec })
    }

    /// A connection that is not yet connected.
    pub fn new_connection(&self) -> Connection {
        Connection::new(self.engine.clone())
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn spec(&self) -> &DriverSpec {
        &self.spec
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}
