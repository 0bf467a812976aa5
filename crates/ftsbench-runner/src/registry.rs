use std::collections::BTreeMap;

use ftsbench_core::{Driver, DriverFactory, DriverOptions, Error, Result};

/// Engine name to driver factory.
#[derive(Clone, Default)]
pub struct Registry {
    factories: BTreeMap<String, DriverFactory>,
}

impl Registry {
    /// Every backend this workspace ships.
    pub fn with_builtin() -> Self {
        let mut registry = Self::default();
        registry
            .register(ftsbench_tantivy::ENGINE, ftsbench_tantivy::build)
            .register(ftsbench_sqlite::ENGINE, ftsbench_sqlite::build)
            .register(ftsbench_http::meilisearch::ENGINE, ftsbench_http::meilisearch::build)
            .register(ftsbench_http::opensearch::ENGINE, ftsbench_http::opensearch::build)
            .register(ftsbench_http::typesense::ENGINE, ftsbench_http::typesense::build);
        registry
    }

    /// Adds or replaces a factory.
    pub fn register(&mut self, name: impl Into<String>, factory: DriverFactory) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn factory(&self, name: &str) -> Result<DriverFactory> {
        self.factories.get(name).copied().ok_or_else(|| {
            Error::Configuration(format!(
                "Invalid/missing FTS engine [{}] (did you specify APP_ENGINE?), known engines: {}",
                name,
                self.names().join(", ")
            ))
        })
    }

    /// Resolves `name` and runs its factory.
    pub async fn build(&self, name: &str, options: DriverOptions) -> Result<Box<dyn Driver>> {
        let factory = self.factory(name)?;
        tracing::debug!(engine = name, reset = options.reset, batch_size = options.batch_size, "initializing driver");
        let driver = factory(options).await?;
        tracing::info!(engine = name, "finished initializing driver");
        Ok(driver)
    }
}
