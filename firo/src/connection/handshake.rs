//! Connect, authenticate and negotiate wire crypt.
//!
//! ```text
//! op_connect ──► op_accept
//!            ──► op_accept_data / op_cond_accept
//!                  [op_cont_auth ◄─► op_cont_auth]*   plugin switch
//!                  [op_cont_auth ──► op_response]     cond accept proof
//!                  [op_crypt     ──► op_response]     encrypted from here
//!            ──► op_reject
//! ```
use bytes::{BufMut, Bytes, BytesMut};

use super::Config;
use crate::{
    Result,
    auth::{AuthError, AuthPlugin, Authenticator},
    channel::{Channel, Cipher, Plugin},
    common::verbose,
    ext::UsizeExt,
    firebird::{
        ProtocolError,
        backend::{self, Accept, AcceptData, BackendProtocol, Response},
        consts::{PFLAG_COMPRESS, PLUGIN_LIST, PTYPE_LAZY_SEND, PTYPE_MASK, cnct},
        frontend, op,
    },
    net::Socket,
};

/// Rounds of plugin switching before giving up.
const MAX_AUTH_ROUNDS: usize = 3;
const SPECIFIC_DATA_CHUNK: usize = 254;

/// Negotiated state of an authenticated channel.
#[derive(Debug, Clone)]
pub struct Session {
    /// Protocol version, flag kept.
    pub protocol: u32,
    pub accept_type: u32,
    /// Plugin data to repeat in the attach parameter block.
    pub auth_data: Option<Vec<u8>>,
    pub plugin: AuthPlugin,
    pub wire_crypt: Option<&'static str>,
}

impl Session {
    pub fn is_lazy(&self) -> bool {
        self.accept_type & PTYPE_MASK == PTYPE_LAZY_SEND
    }
}

/// Drive the handshake on a freshly opened channel.
pub async fn handshake(ch: &mut Channel, config: &Config) -> Result<Session> {
    verbose!("handshake");

    let user = config.user.to_uppercase();
    let auth = Authenticator::new(&user, &config.pass, config.auth_plugin);
    authenticated_session(ch, config, &user, auth).await
}

async fn authenticated_session(
    ch: &mut Channel,
    config: &Config,
    user: &str,
    mut auth: Authenticator,
) -> Result<Session> {
    let user_id = user_identification(config, user, &auth)?;

    ch.send(frontend::Connect {
        database: &config.database,
        user_id: &user_id,
        compress: config.wire_compress,
    });
    ch.flush().await?;

    let opcode = ch.read_opcode().await?;
    let accept = match opcode {
        op::ACCEPT => {
            let accept = Accept::decode(ch).await?;
            return Ok(accepted(ch, accept, None, auth.plugin()));
        },
        op::ACCEPT_DATA | op::COND_ACCEPT => AcceptData::decode(ch).await?,
        op::REJECT => return Err(AuthError::Rejected.into()),
        op::RESPONSE => {
            Response::decode(ch).await?.into_result()?;
            return Err(ProtocolError::unexpected_phase(opcode, "connect").into());
        },
        other => return Err(ProtocolError::unexpected_phase(other, "connect").into()),
    };

    if accept.accept.ptype & PFLAG_COMPRESS != 0 {
        ch.enable_compression();
    }

    let mut auth_data = None;
    if !accept.authenticated {
        auth_data = Some(authenticate(ch, &mut auth, opcode, accept.plugin, accept.data).await?);
    }

    let mut wire_crypt = None;
    if config.wire_crypt {
        if let Some(key) = auth.session_key() {
            wire_crypt = negotiate_crypt(ch, key, accept.keys).await?;
        }
    }

    let mut session = accepted(ch, accept.accept, auth_data, auth.plugin());
    session.wire_crypt = wire_crypt;
    Ok(session)
}

fn accepted(ch: &mut Channel, accept: Accept, auth_data: Option<Vec<u8>>, plugin: AuthPlugin) -> Session {
    if accept.ptype & PFLAG_COMPRESS != 0 && !ch.is_compressed() {
        ch.enable_compression();
    }
    Session {
        protocol: accept.version,
        accept_type: accept.ptype,
        auth_data,
        plugin,
        wire_crypt: None,
    }
}

/// Answer challenges until the server is satisfied, returns the last data
/// sent.
async fn authenticate(
    ch: &mut Channel,
    auth: &mut Authenticator,
    opcode: u32,
    mut plugin: String,
    mut data: Bytes,
) -> Result<Vec<u8>> {
    for _ in 0..MAX_AUTH_ROUNDS {
        let srp = matches!(AuthPlugin::from_name(&plugin), Some(AuthPlugin::Srp | AuthPlugin::Srp256));
        if srp && data.is_empty() {
            // switched plugin, server waits for our public key
            let initial = auth.respond(&plugin, b"")?;
            ch.send(frontend::ContAuth { data: &initial, plugin: &plugin, plugin_list: PLUGIN_LIST, keys: b"" });
            ch.flush().await?;
            let next = ch.recv::<backend::ContAuth>().await?;
            (plugin, data) = (next.plugin, next.data);
            continue;
        }

        let auth_data = auth.respond(&plugin, &data)?;
        verbose!(plugin = auth.plugin().name(), "auth proof");
        if opcode != op::COND_ACCEPT {
            return Ok(auth_data);
        }

        ch.send(frontend::ContAuth { data: &auth_data, plugin: &plugin, plugin_list: PLUGIN_LIST, keys: b"" });
        ch.flush().await?;
        match ch.read_opcode().await? {
            op::RESPONSE => {
                Response::decode(ch).await?.into_result()?;
                return Ok(auth_data);
            },
            op::CONT_AUTH => {
                let next = backend::ContAuth::decode(ch).await?;
                (plugin, data) = (next.plugin, next.data);
            },
            other => return Err(ProtocolError::unexpected_phase(other, "authentication").into()),
        }
    }

    Err(AuthError::UnsupportedPlugin(plugin).into())
}

/// Send `op_crypt` and switch the channel to encrypted mode.
///
/// The acknowledgement is already encrypted.
async fn negotiate_crypt(ch: &mut Channel, session_key: &[u8], keys: Bytes) -> Result<Option<&'static str>> {
    let Some(plugin) = Plugin::choose(keys)? else {
        #[cfg(feature = "log")]
        log::warn!("server offers no supported wire crypt plugin, continue unencrypted");
        return Ok(None);
    };

    let cipher = Cipher::new(plugin.name, session_key, &plugin.nonce)?;
    ch.send(frontend::Crypt { plugin: plugin.name, key_type: "Symmetric" });
    ch.flush().await?;
    ch.install_cipher(cipher);
    verbose!(plugin = plugin.name, "wire crypt");

    ch.recv::<Response>().await?.into_result()?;
    Ok(Some(plugin.name))
}

/// Build the user identification block of `op_connect`.
pub fn user_identification(config: &Config, user: &str, auth: &Authenticator) -> Result<Vec<u8>, AuthError> {
    let mut buf = BytesMut::with_capacity(512);

    put_item(&mut buf, cnct::LOGIN, user.as_bytes());
    put_item(&mut buf, cnct::PLUGIN_NAME, auth.plugin().name().as_bytes());
    put_item(&mut buf, cnct::PLUGIN_LIST, PLUGIN_LIST.as_bytes());

    let specific = auth.initial_data()?;
    for (seq, chunk) in specific.chunks(SPECIFIC_DATA_CHUNK).enumerate() {
        buf.put_u8(cnct::SPECIFIC_DATA);
        buf.put_u8((chunk.len() + 1).to_u8());
        buf.put_u8(seq.to_u8());
        buf.put_slice(chunk);
    }

    put_item(&mut buf, cnct::CLIENT_CRYPT, &[config.wire_crypt as u8, 0, 0, 0]);

    let os_user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    put_item(&mut buf, cnct::USER, os_user.as_bytes());
    put_item(&mut buf, cnct::HOST, Socket::local_hostname().as_bytes());
    put_item(&mut buf, cnct::USER_VERIFICATION, b"");

    Ok(buf.to_vec())
}

/// Items longer than 255 bytes are truncated.
fn put_item(buf: &mut BytesMut, tag: u8, value: &[u8]) {
    let value = &value[..value.len().min(255)];
    buf.put_u8(tag);
    buf.put_u8(value.len().to_u8());
    buf.put_slice(value);
}
