//! Wire crypt plugins.
use bytes::{Buf, Bytes};
use chacha20::{
    ChaCha20, ChaCha20Legacy,
    cipher::{KeyIvInit, StreamCipher},
};
use rc4::{KeyInit, Rc4, consts::U20};
use sha2::{Digest, Sha256};

use crate::firebird::{ProtocolError, consts::keys};

/// Supported plugins, most preferred first.
const PREFERENCE: &[&str] = &["ChaCha64", "ChaCha", "Arc4"];

/// A negotiated wire crypt plugin, with its nonce when the plugin needs one.
#[derive(Debug, PartialEq, Eq)]
pub struct Plugin {
    pub name: &'static str,
    pub nonce: Bytes,
}

impl Plugin {
    /// Pick a plugin from the server key list.
    ///
    /// The list is a sequence of `tag, len, data`, tag 1 carries the space
    /// separated plugin names, tag 3 carries `name\0nonce` for each plugin
    /// that needs extra data.
    pub fn choose(mut key_list: Bytes) -> Result<Option<Plugin>, ProtocolError> {
        let mut known = Vec::new();
        let mut specific = Vec::new();

        while key_list.remaining() >= 2 {
            let tag = key_list.get_u8();
            let len = key_list.get_u8() as usize;
            if key_list.remaining() < len {
                return Err(ProtocolError::malformed("server key list truncated"));
            }
            let data = key_list.split_to(len);
            match tag {
                keys::KNOWN_PLUGINS => known.push(data),
                keys::PLUGIN_SPECIFIC => specific.push(data),
                _ => {}
            }
        }

        let offered = |name: &str| {
            known.iter().any(|list| {
                list.split(|e| *e == b' ').any(|e| e == name.as_bytes())
            })
        };

        let Some(name) = PREFERENCE.iter().copied().find(|e| offered(e)) else {
            return Ok(None);
        };

        let nonce = specific
            .iter()
            .find_map(|data| {
                let at = data.iter().position(|e| *e == 0)?;
                (&data[..at] == name.as_bytes()).then(|| data.slice(at + 1..))
            })
            .unwrap_or_default();

        Ok(Some(Plugin { name, nonce }))
    }
}

enum Keystream {
    ChaCha(ChaCha20),
    ChaCha64(ChaCha20Legacy),
    Arc4(Rc4<U20>),
}

impl Keystream {
    fn new(name: &str, session_key: &[u8], nonce: &[u8]) -> Result<Keystream, ProtocolError> {
        let invalid = |_| ProtocolError::malformed("invalid wire crypt key or nonce length");
        match name {
            "ChaCha" | "ChaCha64" => {
                let key = Sha256::digest(session_key);
                if name == "ChaCha" {
                    let nonce = nonce.get(..12).ok_or(ProtocolError::malformed("ChaCha nonce too short"))?;
                    ChaCha20::new_from_slices(&key, nonce).map(Keystream::ChaCha).map_err(invalid)
                } else {
                    let nonce = nonce.get(..8).ok_or(ProtocolError::malformed("ChaCha64 nonce too short"))?;
                    ChaCha20Legacy::new_from_slices(&key, nonce).map(Keystream::ChaCha64).map_err(invalid)
                }
            },
            "Arc4" => Rc4::new_from_slice(session_key).map(Keystream::Arc4).map_err(invalid),
            _ => Err(ProtocolError::UnknownCipher(name.to_owned())),
        }
    }

    fn apply(&mut self, buf: &mut [u8]) {
        match self {
            Keystream::ChaCha(c) => c.apply_keystream(buf),
            Keystream::ChaCha64(c) => c.apply_keystream(buf),
            Keystream::Arc4(c) => c.apply_keystream(buf),
        }
    }
}

/// Symmetric stream cipher pair, one keystream per direction.
pub struct Cipher {
    name: &'static str,
    encrypt: Keystream,
    decrypt: Keystream,
}

impl Cipher {
    pub fn new(name: &str, session_key: &[u8], nonce: &[u8]) -> Result<Cipher, ProtocolError> {
        let name = PREFERENCE
            .iter()
            .copied()
            .find(|e| *e == name)
            .ok_or_else(|| ProtocolError::UnknownCipher(name.to_owned()))?;
        Ok(Cipher {
            name,
            encrypt: Keystream::new(name, session_key, nonce)?,
            decrypt: Keystream::new(name, session_key, nonce)?,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn encrypt(&mut self, buf: &mut [u8]) {
        self.encrypt.apply(buf);
    }

    pub fn decrypt(&mut self, buf: &mut [u8]) {
        self.decrypt.apply(buf);
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Cipher").field(&self.name).finish()
    }
}
