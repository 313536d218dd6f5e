//! Client-[`Side`] session configuration.

use crate::{config::Config, id::Id};

use super::{Algorithms, Side};

/// A _client_-side session configuration.
#[derive(Clone)]
pub struct Client {
    /// Identification string for this client session.
    pub id: Id,

    /// Ambient configuration.
    pub config: Config,

    /// The algorithms enabled for this client session.
    pub algorithms: Algorithms,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            id: Id::v2(
                concat!(env!("CARGO_PKG_NAME"), "_", env!("CARGO_PKG_VERSION"), "-client"),
                None,
            ),
            config: Config::default(),
            algorithms: Algorithms::default(),
        }
    }
}

impl Side for Client {
    fn id(&self) -> &Id {
        &self.id
    }

    fn config(&self) -> &Config {
        &self.config
    }

    fn algorithms(&self) -> &Algorithms {
        &self.algorithms
    }

    fn is_client(&self) -> bool {
        true
    }
}
