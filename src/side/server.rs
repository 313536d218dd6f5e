//! Server-[`Side`] session configuration.

use ssh_key::PrivateKey;

use crate::{config::Config, id::Id};

use super::{Algorithms, Side};

/// A _server_-side session configuration.
#[derive(Clone)]
pub struct Server {
    /// Identification string for this server session.
    pub id: Id,

    /// Ambient configuration.
    pub config: Config,

    /// The algorithms enabled for this server session.
    ///
    /// `algorithms.host_keys` is ignored in favor of the algorithm names
    /// derived from `keys`.
    pub algorithms: Algorithms,

    /// Host keys this server signs key-exchanges with, tried in order
    /// against the negotiated host-key algorithm.
    pub keys: Vec<PrivateKey>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            id: Id::v2(
                concat!(env!("CARGO_PKG_NAME"), "_", env!("CARGO_PKG_VERSION"), "-server"),
                None,
            ),
            config: Config::default(),
            algorithms: Algorithms::default(),
            keys: Vec::new(),
        }
    }
}

impl Server {
    /// Host-key algorithm names derived from the configured `keys`, in the
    /// order they were added.
    pub fn host_key_algorithm_names(&self) -> Vec<String> {
        self.keys
            .iter()
            .map(|key| key.algorithm().to_string())
            .collect()
    }
}

impl Side for Server {
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
        false
    }

    fn host_keys(&self) -> &[PrivateKey] {
        &self.keys
    }

    fn host_key_algorithm_names(&self) -> Vec<String> {
        self.host_key_algorithm_names()
    }
}
