//! Authentication plugins.
//!
//! The client advertises [`PLUGIN_LIST`][crate::firebird::consts::PLUGIN_LIST]
//! and starts with the configured plugin. The server may switch to another
//! plugin of the list by answering with a different plugin name.
use std::fmt;

pub mod srp;
pub mod legacy;

use srp::{ProofDigest, SrpClient};

/// Authentication plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
    Srp256,
    Srp,
    Legacy,
}

impl AuthPlugin {
    pub fn from_name(name: &str) -> Option<AuthPlugin> {
        match name {
            "Srp256" => Some(Self::Srp256),
            "Srp" => Some(Self::Srp),
            "Legacy_Auth" => Some(Self::Legacy),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Srp256 => "Srp256",
            Self::Srp => "Srp",
            Self::Legacy => "Legacy_Auth",
        }
    }

    fn digest(self) -> Option<ProofDigest> {
        match self {
            Self::Srp256 => Some(ProofDigest::Sha256),
            Self::Srp => Some(ProofDigest::Sha1),
            Self::Legacy => None,
        }
    }
}

impl fmt::Display for AuthPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Client authentication state across the handshake.
#[derive(Debug)]
pub struct Authenticator {
    user: String,
    password: String,
    plugin: AuthPlugin,
    srp: SrpClient,
    session_key: Option<Vec<u8>>,
}

impl Authenticator {
    pub fn new(user: &str, password: &str, plugin: AuthPlugin) -> Self {
        Self {
            user: user.to_owned(),
            password: password.to_owned(),
            plugin,
            srp: SrpClient::new(),
            session_key: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_client(user: &str, password: &str, plugin: AuthPlugin, srp: SrpClient) -> Self {
        Self { srp, ..Self::new(user, password, plugin) }
    }

    pub fn plugin(&self) -> AuthPlugin {
        self.plugin
    }

    /// Session key derived by srp, used for wire crypt.
    pub fn session_key(&self) -> Option<&[u8]> {
        self.session_key.as_deref()
    }

    /// Initial plugin data sent in the user identification block.
    pub fn initial_data(&self) -> Result<Vec<u8>, AuthError> {
        match self.plugin {
            AuthPlugin::Legacy => legacy::crypt(&self.password),
            AuthPlugin::Srp | AuthPlugin::Srp256 => Ok(self.srp.public_hex().into_bytes()),
        }
    }

    /// Answer a server challenge for `plugin`.
    ///
    /// An empty challenge means the server switched plugin and expects the
    /// initial data of the new one.
    pub fn respond(&mut self, plugin: &str, challenge: &[u8]) -> Result<Vec<u8>, AuthError> {
        let plugin = AuthPlugin::from_name(plugin)
            .ok_or_else(|| AuthError::UnsupportedPlugin(plugin.to_owned()))?;
        self.plugin = plugin;

        let Some(digest) = plugin.digest() else {
            return legacy::crypt(&self.password);
        };
        if challenge.is_empty() {
            return self.initial_data();
        }

        let (salt, server_public) = srp::parse_challenge(challenge)?;
        let out = self.srp.proof(&self.user, &self.password, salt, &server_public, digest);
        self.session_key = Some(out.session_key);
        Ok(hex::encode(out.proof).into_bytes())
    }
}

/// Authentication failure.
pub enum AuthError {
    /// Server refused the connection, `op_reject`.
    Rejected,
    /// Server selected a plugin outside of the client list.
    UnsupportedPlugin(String),
    /// Wire crypt required but no session key or common plugin.
    NoWireCrypt,
    Malformed(&'static str),
}

impl std::error::Error for AuthError { }

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => f.write_str("connection rejected by server"),
            Self::UnsupportedPlugin(name) => write!(f, "unsupported auth plugin: {name:?}"),
            Self::NoWireCrypt => f.write_str("wire crypt negotiation failed"),
            Self::Malformed(what) => write!(f, "malformed {what}"),
        }
    }
}

impl fmt::Debug for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plugin_names() {
        for plugin in [AuthPlugin::Srp256, AuthPlugin::Srp, AuthPlugin::Legacy] {
            assert_eq!(AuthPlugin::from_name(plugin.name()), Some(plugin));
        }
        assert_eq!(AuthPlugin::from_name("Win_Sspi"), None);
    }

    #[test]
    fn switch_to_legacy() {
        let mut auth = Authenticator::new("SYSDBA", "masterkey", AuthPlugin::Srp256);
        let data = auth.respond("Legacy_Auth", b"").unwrap();
        assert_eq!(auth.plugin(), AuthPlugin::Legacy);
        assert_eq!(data, legacy::crypt("masterkey").unwrap());
        assert!(auth.session_key().is_none());
    }

    #[test]
    fn unknown_plugin() {
        let mut auth = Authenticator::new("SYSDBA", "masterkey", AuthPlugin::Srp);
        assert!(matches!(auth.respond("Foo", b""), Err(AuthError::UnsupportedPlugin(_))));
    }
}
