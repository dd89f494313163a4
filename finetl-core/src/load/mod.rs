//! Loading: persist extracted tables to a destination.
//!
//! Every loader shares one contract: empty data is a successful no-op that
//! touches nothing, and present tables are written one at a time, OHLCV
//! first, with the first failure aborting the rest.

pub mod files;
pub mod hub;
pub mod postgres;
pub mod registry;

pub use files::{FileFormat, FileLoader};
pub use hub::{HfHubClient, HubApi, HubError, HubLoader};
pub use postgres::PostgresLoader;
pub use registry::{LoaderFactory, LoaderRegistry};

use crate::error::LoadingError;
use crate::model::ExtractedData;

/// Persists an [`ExtractedData`] to one destination.
pub trait Loader {
    /// Destination name, as used in configuration.
    fn destination(&self) -> &str;

    fn load(&self, data: &ExtractedData) -> Result<(), LoadingError>;
}

impl<L: Loader + ?Sized> Loader for Box<L> {
    fn destination(&self) -> &str {
        (**self).destination()
    }

    fn load(&self, data: &ExtractedData) -> Result<(), LoadingError> {
        (**self).load(data)
    }
}
