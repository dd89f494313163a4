//! Destination name to loader factory mapping.

use super::{FileLoader, HfHubClient, HubLoader, Loader, PostgresLoader};
use crate::config::Destination;
use crate::error::{ConfigError, FinEtlError, LoadingError};
use std::collections::BTreeMap;
use std::fmt;

/// Builds a loader from a destination. Fails on a destination of the wrong kind.
pub type LoaderFactory =
    Box<dyn Fn(&Destination) -> Result<Box<dyn Loader>, FinEtlError> + Send + Sync>;

/// Resolves destination names to loader factories.
pub struct LoaderRegistry {
    factories: BTreeMap<String, LoaderFactory>,
}

impl LoaderRegistry {
    /// Empty registry; nothing resolves until registered.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// `csv`, `parquet`, `huggingface` and `postgresql`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register_loader("csv", |dest| match dest {
            Destination::Csv { path } => Ok(Box::new(FileLoader::csv(path)) as Box<dyn Loader>),
            other => Err(mismatch("csv", other)),
        });
        registry.register_loader("parquet", |dest| match dest {
            Destination::Parquet { path } => {
                Ok(Box::new(FileLoader::parquet(path)) as Box<dyn Loader>)
            }
            other => Err(mismatch("parquet", other)),
        });
        registry.register_loader("huggingface", |dest| match dest {
            Destination::Hub(target) => {
                let client = HfHubClient::from_env().map_err(|source| LoadingError::Upload {
                    repo_id: target.repo_id.clone(),
                    source,
                })?;
                Ok(Box::new(HubLoader::new(target.clone(), client)) as Box<dyn Loader>)
            }
            other => Err(mismatch("huggingface", other)),
        });
        registry.register_loader("postgresql", |dest| match dest {
            Destination::Postgres(target) => {
                Ok(Box::new(PostgresLoader::new(target.clone())) as Box<dyn Loader>)
            }
            other => Err(mismatch("postgresql", other)),
        });
        registry
    }

    /// Make `name` resolvable, replacing any factory already registered under it.
    pub fn register_loader<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Destination) -> Result<Box<dyn Loader>, FinEtlError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn get_loader(&self, name: &str) -> Result<&LoaderFactory, ConfigError> {
        self.factories
            .get(name)
            .ok_or_else(|| ConfigError::UnsupportedDestination {
                name: name.to_string(),
                supported: self.names().join(", "),
            })
    }

    /// Build the loader for a destination through the factory registered under its name.
    pub fn create(&self, destination: &Destination) -> Result<Box<dyn Loader>, FinEtlError> {
        let factory = self.get_loader(destination.name())?;
        factory(destination)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("destinations", &self.names())
            .finish()
    }
}

fn mismatch(factory: &str, destination: &Destination) -> FinEtlError {
    ConfigError::Invalid(vec![format!(
        "loading.destination: '{}' destination cannot build a {factory} loader",
        destination.name()
    )])
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HubTarget, IfExists, PostgresTarget};
    use crate::model::ExtractedData;
    use std::path::PathBuf;

    struct NullLoader;

    impl Loader for NullLoader {
        fn destination(&self) -> &str {
            "null"
        }

        fn load(&self, _data: &ExtractedData) -> Result<(), LoadingError> {
            Ok(())
        }
    }

    fn csv() -> Destination {
        Destination::Csv {
            path: PathBuf::from("./output"),
        }
    }

    #[test]
    fn defaults_resolve_every_destination() {
        let registry = LoaderRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec!["csv", "huggingface", "parquet", "postgresql"]
        );

        let destinations = [
            csv(),
            Destination::Parquet {
                path: PathBuf::from("out"),
            },
            Destination::Hub(HubTarget {
                repo_id: "acme/prices".into(),
                private: false,
            }),
            Destination::Postgres(PostgresTarget {
                host: "localhost".into(),
                port: 5432,
                database: "markets".into(),
                schema: "public".into(),
                user: "etl".into(),
                password: "secret".into(),
                if_exists: IfExists::Append,
            }),
        ];
        for dest in &destinations {
            let loader = registry.create(dest).unwrap();
            assert_eq!(loader.destination(), dest.name());
        }
    }

    #[test]
    fn unknown_name_lists_supported() {
        let registry = LoaderRegistry::with_defaults();
        let err = registry.get_loader("s3").err().unwrap();
        assert_eq!(
            err.to_string(),
            "unsupported destination type: s3. Supported: csv, huggingface, parquet, postgresql"
        );
    }

    #[test]
    fn registered_name_resolves_immediately() {
        let mut registry = LoaderRegistry::empty();
        assert!(registry.get_loader("null").is_err());

        registry.register_loader("null", |_| Ok(Box::new(NullLoader) as Box<dyn Loader>));
        let factory = registry.get_loader("null").unwrap();
        assert_eq!(factory(&csv()).unwrap().destination(), "null");
    }

    #[test]
    fn registering_overrides_a_default() {
        let mut registry = LoaderRegistry::with_defaults();
        registry.register_loader("csv", |_| Ok(Box::new(NullLoader) as Box<dyn Loader>));
        assert_eq!(registry.create(&csv()).unwrap().destination(), "null");
    }

    #[test]
    fn factory_rejects_other_destination_kind() {
        let registry = LoaderRegistry::with_defaults();
        let factory = registry.get_loader("parquet").unwrap();
        assert!(matches!(
            factory(&csv()),
            Err(FinEtlError::Config(ConfigError::Invalid(_)))
        ));
    }
}
