//! Per-slot algorithm negotiation over a pair of `SSH_MSG_KEXINIT` messages.
//!
//! Unlike algorithm selection against a closed, compiled-in enum, this
//! session core negotiates down to a bare *name*: the winning string is
//! handed to the [`crate::factory::FactoryManager`] to resolve an actual
//! capability. Negotiation itself never needs to know what a cipher does.

use ssh_packet::{arch::NameList, trans::KexInit};

use crate::error::{Error, Result};

/// The result of negotiating all ten [`KexInit`] slots between a client and
/// a server proposal.
#[derive(Debug, Clone)]
pub struct Negotiated {
    /// Winning key-exchange algorithm name.
    pub kex: String,
    /// Winning server host-key algorithm name.
    pub host_key: String,
    /// Winning client-to-server cipher name.
    pub cipher_c2s: String,
    /// Winning server-to-client cipher name.
    pub cipher_s2c: String,
    /// Winning client-to-server MAC name.
    pub mac_c2s: String,
    /// Winning server-to-client MAC name.
    pub mac_s2c: String,
    /// Winning client-to-server compression name.
    pub compress_c2s: String,
    /// Winning server-to-client compression name.
    pub compress_s2c: String,
    /// Winning client-to-server language tag, empty if none was agreed
    /// (languages are the one slot where disagreement is tolerated).
    pub language_c2s: String,
    /// Winning server-to-client language tag, empty if none was agreed.
    pub language_s2c: String,
}

/// Pick the client's most-preferred entry in `client` that also appears in
/// `server`, per RFC 4253 §7.1: the algorithm negotiation is a function of
/// the *client's* preference order, not the server's.
fn pick_first_common(slot: &'static str, client: &NameList, server: &NameList) -> Result<String> {
    client
        .preferred_in(server)
        .map(ToString::to_string)
        .ok_or(Error::NoCommonAlgorithm(slot))
}

/// Same rule, but a missing agreement is tolerated and reported as an empty
/// string rather than an error — used only for the language slots.
fn pick_first_common_tolerant(client: &NameList, server: &NameList) -> String {
    client
        .preferred_in(server)
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// Negotiate all ten slots between a client's and a server's `KexInit`.
pub fn negotiate(client: &KexInit, server: &KexInit) -> Result<Negotiated> {
    Ok(Negotiated {
        kex: pick_first_common("kex-algorithms", &client.kex_algorithms, &server.kex_algorithms)?,
        host_key: pick_first_common(
            "server-host-key",
            &client.server_host_key_algorithms,
            &server.server_host_key_algorithms,
        )?,
        cipher_c2s: pick_first_common(
            "encryption client-to-server",
            &client.encryption_algorithms_client_to_server,
            &server.encryption_algorithms_client_to_server,
        )?,
        cipher_s2c: pick_first_common(
            "encryption server-to-client",
            &client.encryption_algorithms_server_to_client,
            &server.encryption_algorithms_server_to_client,
        )?,
        mac_c2s: pick_first_common(
            "mac client-to-server",
            &client.mac_algorithms_client_to_server,
            &server.mac_algorithms_client_to_server,
        )?,
        mac_s2c: pick_first_common(
            "mac server-to-client",
            &client.mac_algorithms_server_to_client,
            &server.mac_algorithms_server_to_client,
        )?,
        compress_c2s: pick_first_common(
            "compression client-to-server",
            &client.compression_algorithms_client_to_server,
            &server.compression_algorithms_client_to_server,
        )?,
        compress_s2c: pick_first_common(
            "compression server-to-client",
            &client.compression_algorithms_server_to_client,
            &server.compression_algorithms_server_to_client,
        )?,
        language_c2s: pick_first_common_tolerant(
            &client.languages_client_to_server,
            &server.languages_client_to_server,
        ),
        language_s2c: pick_first_common_tolerant(
            &client.languages_server_to_client,
            &server.languages_server_to_client,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssh_packet::arch::Bool;

    fn kexinit(names: &[&str]) -> KexInit<'static> {
        let list = NameList::from_iter(names.iter().map(|s| s.to_string()));

        KexInit {
            cookie: [0; 16],
            kex_algorithms: list.clone(),
            server_host_key_algorithms: list.clone(),
            encryption_algorithms_client_to_server: list.clone(),
            encryption_algorithms_server_to_client: list.clone(),
            mac_algorithms_client_to_server: list.clone(),
            mac_algorithms_server_to_client: list.clone(),
            compression_algorithms_client_to_server: list.clone(),
            compression_algorithms_server_to_client: list.clone(),
            languages_client_to_server: NameList::default(),
            languages_server_to_client: NameList::default(),
            first_kex_packet_follows: Bool::from(false),
        }
    }

    #[test]
    fn client_preference_wins_tie_break() {
        let client = kexinit(&["aes128-ctr", "aes256-ctr"]);
        let server = kexinit(&["aes256-ctr", "aes128-ctr"]);

        let negotiated = negotiate(&client, &server).unwrap();
        assert_eq!(negotiated.cipher_c2s, "aes128-ctr");
    }

    #[test]
    fn no_common_algorithm_is_an_error() {
        let client = kexinit(&["aes128-ctr"]);
        let server = kexinit(&["aes256-ctr"]);

        assert!(matches!(
            negotiate(&client, &server),
            Err(Error::NoCommonAlgorithm(_))
        ));
    }

    #[test]
    fn language_disagreement_is_tolerated() {
        let client = kexinit(&["zlib"]);
        let server = kexinit(&["zlib"]);

        let negotiated = negotiate(&client, &server).unwrap();
        assert_eq!(negotiated.language_c2s, "");
    }
}
