//! Database connection.
//!
//! A [`Connection`] owns one [`Channel`]. The protocol is half duplex, every
//! request is answered in order, so responses of requests whose result is not
//! needed right away can be left unread and drained before the next read.
use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;

use crate::{
    Result,
    channel::Channel,
    common::verbose,
    error::Closed,
    firebird::{
        FrontendProtocol,
        backend::{BackendProtocol, Response},
        consts::{FB_PROTOCOL_MASK, SQL_DIALECT, dpb, info, spb},
        frontend,
        pb::{ParamBlock, ParamReader},
        ProtocolError,
    },
    service::FirebirdVersion,
    statement::Statement,
    transaction::TxState,
    types::Charset,
};

mod config;
mod handshake;

pub use config::{Config, ParseError};
pub use handshake::Session;

/// A single connection to an attached database.
#[derive(Debug)]
pub struct Connection {
    ch: Channel,
    config: Config,
    session: Session,
    db: u32,
    /// Responses of requests sent but not read yet.
    deferred: u32,
    /// Autocommit transaction used when no explicit transaction is given.
    pub(crate) default_tx: TxState,
    cache: Option<LruCache<String, Statement>>,
    closed: bool,
}

impl Connection {
    /// Connect and attach using configuration from environment variable.
    ///
    /// See [`Config::from_env`] for more details.
    pub async fn connect_env() -> Result<Self> {
        Self::connect_with(Config::from_env()).await
    }

    /// Connect and attach with given url.
    ///
    /// See [`Config::parse`] for the url format.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(Config::parse(url)?).await
    }

    /// Connect and attach with given config.
    pub async fn connect_with(config: Config) -> Result<Self> {
        let mut me = Self::open(config).await?;
        let dpb = me.dpb(None);
        me.ch.send(frontend::Attach { database: &me.config.database, dpb: dpb.as_slice() });
        me.db = me.recv_response().await?.handle;
        verbose!(db = me.db, "attached");
        Ok(me)
    }

    /// Create a new database and attach to it.
    ///
    /// `page_size` of zero leaves the server default.
    pub async fn create_database(config: Config, page_size: u32) -> Result<Self> {
        let mut me = Self::open(config).await?;
        let dpb = me.dpb(Some(page_size));
        me.ch.send(frontend::Create { database: &me.config.database, dpb: dpb.as_slice() });
        me.db = me.recv_response().await?.handle;
        verbose!(db = me.db, "created");
        Ok(me)
    }

    /// Connect and attach the service manager instead of a database.
    pub(crate) async fn connect_service(config: Config) -> Result<Self> {
        let mut me = Self::open(config).await?;
        let spb = me.spb();
        me.ch.send(frontend::ServiceAttach { spb: spb.as_slice() });
        me.db = me.recv_response().await?.handle;
        verbose!(svc = me.db, "service attached");
        Ok(me)
    }

    async fn open(config: Config) -> Result<Self> {
        verbose!(host = %config.host, port = config.port, "connect");
        let mut ch = Channel::connect(&config.host, config.port).await?;
        let session = handshake::handshake(&mut ch, &config).await?;
        Ok(Self::from_parts(ch, config, session))
    }

    pub(crate) fn from_parts(ch: Channel, config: Config, session: Session) -> Self {
        let cache = NonZeroUsize::new(config.statement_cache).map(LruCache::new);
        Self {
            ch,
            config,
            session,
            db: 0,
            deferred: 0,
            default_tx: TxState::autocommit(),
            cache,
            closed: false,
        }
    }

    /// Database parameter block of attach and create.
    fn dpb(&self, create: Option<u32>) -> ParamBlock {
        let config = &self.config;
        let mut dpb = ParamBlock::with_version(dpb::VERSION1);
        dpb.short_int(dpb::SQL_DIALECT, SQL_DIALECT as i32);
        dpb.short_str(dpb::LC_CTYPE, config.charset.name());
        dpb.short_str(dpb::USER_NAME, &config.user);
        if let Some(role) = &config.role {
            dpb.short_str(dpb::SQL_ROLE_NAME, role);
        }
        dpb.short_int(dpb::PROCESS_ID, std::process::id() as i32);
        if let Some(name) = process_name() {
            dpb.short_str(dpb::PROCESS_NAME, &name);
        }
        if let Some(data) = &self.session.auth_data {
            dpb.short_str(dpb::SPECIFIC_AUTH_DATA, &hex::encode(data));
        }
        if let Some(tz) = &config.timezone {
            dpb.short_str(dpb::SESSION_TIME_ZONE, tz);
        }
        if let Some(page_size) = create {
            dpb.short_str(dpb::SET_DB_CHARSET, config.charset.name());
            dpb.short_int(dpb::FORCE_WRITE, 1);
            dpb.short_int(dpb::OVERWRITE, 1);
            if page_size > 0 {
                dpb.short_int(dpb::PAGE_SIZE, page_size as i32);
            }
        }
        dpb
    }

    /// Service parameter block of service attach.
    fn spb(&self) -> ParamBlock {
        let config = &self.config;
        let mut spb = ParamBlock::with_version(spb::VERSION);
        spb.tag(spb::CURRENT_VERSION);
        spb.short_str(spb::USER_NAME, &config.user);
        match &self.session.auth_data {
            Some(data) => spb.short_str(spb::SPECIFIC_AUTH_DATA, &hex::encode(data)),
            None => spb.short_str(spb::PASSWORD, &config.pass),
        };
        if let Some(role) = &config.role {
            spb.short_str(spb::SQL_ROLE_NAME, role);
        }
        spb.short_int(spb::DUMMY_PACKET_INTERVAL, DUMMY_PACKET_INTERVAL);
        spb
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Negotiated protocol version, `10` to `17`.
    pub fn protocol_version(&self) -> u32 {
        self.session.protocol & FB_PROTOCOL_MASK
    }

    /// Protocol version as sent on the wire, flag included.
    pub(crate) fn protocol(&self) -> u32 {
        self.session.protocol
    }

    /// Name of the wire crypt plugin in use.
    pub fn wire_crypt(&self) -> Option<&'static str> {
        self.session.wire_crypt
    }

    pub fn is_compressed(&self) -> bool {
        self.ch.is_compressed()
    }

    pub fn charset(&self) -> Charset {
        self.config.charset
    }

    pub(crate) fn db_handle(&self) -> u32 {
        self.db
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ===== Wire =====

    /// Buffer a request, sent with the next read.
    pub(crate) fn send<F: FrontendProtocol>(&mut self, msg: F) {
        self.ch.send(msg);
    }

    /// Flush requests and receive the response to the oldest unread request.
    pub(crate) async fn recv<B: BackendProtocol>(&mut self) -> Result<B> {
        if self.closed {
            return Err(Closed.into());
        }
        self.ch.flush().await?;
        self.drain_deferred().await?;
        self.ch.recv().await
    }

    pub(crate) fn channel(&mut self) -> &mut Channel {
        &mut self.ch
    }

    /// Receive a generic response, its error status returned as error.
    pub(crate) async fn recv_response(&mut self) -> Result<Response> {
        Ok(self.recv::<Response>().await?.into_result()?)
    }

    /// Response of a request whose result is not needed.
    ///
    /// With lazy responses the read is postponed until the next request that
    /// needs an answer, errors of postponed responses are only logged.
    pub(crate) async fn defer_response(&mut self) -> Result<()> {
        if self.session.is_lazy() {
            self.deferred += 1;
            return Ok(());
        }
        self.recv_response().await.map(drop)
    }

    /// Mark a buffered request whose response is never needed, used where
    /// awaiting is impossible.
    pub(crate) fn forget_response(&mut self) {
        self.deferred += 1;
    }

    /// Lazy servers answer some requests late, pipelined requests rely on it.
    pub(crate) fn is_lazy(&self) -> bool {
        self.session.is_lazy()
    }

    async fn drain_deferred(&mut self) -> Result<()> {
        while self.deferred > 0 {
            self.deferred -= 1;
            if let Err(_err) = self.ch.recv::<Response>().await?.into_result() {
                #[cfg(feature = "log")]
                log::warn!("deferred request failed: {_err}");
            }
        }
        Ok(())
    }

    // ===== Statement cache =====

    /// Take a cached statement out of the cache.
    pub(crate) fn take_statement(&mut self, sql: &str) -> Option<Statement> {
        self.cache.as_mut()?.pop(sql)
    }

    /// Return a statement to the cache, statements that do not fit are freed.
    pub(crate) fn release_statement(&mut self, key: Option<String>, stmt: Statement) {
        let evicted = match (key, self.cache.as_mut()) {
            (Some(key), Some(cache)) => cache.push(key, stmt).map(|(_, evicted)| evicted),
            _ => Some(stmt),
        };
        if let Some(stmt) = evicted {
            stmt.release(self);
        }
    }

    // ===== Database =====

    /// Check that the server is still reachable.
    pub async fn ping(&mut self) -> Result<()> {
        self.send(frontend::Ping);
        self.recv_response().await?;
        Ok(())
    }

    /// Raw database info request.
    pub async fn info_database(&mut self, items: &[u8]) -> Result<Bytes> {
        self.send(frontend::InfoDatabase {
            handle: self.db,
            items,
            buffer_length: self.config.buffer_length,
        });
        Ok(self.recv_response().await?.buffer)
    }

    /// Version of the attached server.
    pub async fn server_version(&mut self) -> Result<FirebirdVersion> {
        let buf = self.info_database(&[info::FIREBIRD_VERSION, info::END]).await?;
        let mut r = ParamReader::new(buf);
        if r.next_tag() != Some(info::FIREBIRD_VERSION) {
            return Err(ProtocolError::malformed("missing firebird version item").into());
        }
        let mut item = ParamReader::new(r.get_bytes()?);
        // string count, then 1 byte length prefixed strings
        item.skip(1)?;
        let len = item.get_u8()? as usize;
        let version = item.rest().get(..len).ok_or_else(|| ProtocolError::malformed("firebird version"))?;
        Ok(FirebirdVersion::parse(&String::from_utf8_lossy(version)))
    }

    /// Commit the autocommit transaction, the next statement begins a new one.
    pub async fn commit(&mut self) -> Result<()> {
        let mut tx = std::mem::replace(&mut self.default_tx, TxState::autocommit());
        let res = tx.commit(self).await;
        self.default_tx = tx;
        res
    }

    /// Roll back the autocommit transaction.
    pub async fn rollback(&mut self) -> Result<()> {
        let mut tx = std::mem::replace(&mut self.default_tx, TxState::autocommit());
        let res = tx.rollback(self).await;
        self.default_tx = tx;
        res
    }

    /// Commit pending work and detach, closing the channel.
    ///
    /// Closing an already closed connection does nothing.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let res = self.detach(false).await;
        self.closed = true;
        res
    }

    /// Detach and delete the database.
    pub async fn drop_database(mut self) -> Result<()> {
        let res = self.detach(true).await;
        self.closed = true;
        res
    }

    /// Detach the service manager and close the channel.
    pub(crate) async fn detach_service(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.send(frontend::ServiceDetach { handle: self.db });
        let res = self.recv_response().await.map(|_| ());
        self.closed = true;
        res.and(self.ch.close().await)
    }

    async fn detach(&mut self, drop: bool) -> Result<()> {
        verbose!(drop, "detach");
        self.commit().await?;
        match drop {
            true => self.send(frontend::DropDatabase { handle: self.db }),
            false => self.send(frontend::Detach { handle: self.db }),
        }
        self.recv_response().await?;
        self.ch.close().await
    }
}

/// Seconds between keepalive packets of service connections.
const DUMMY_PACKET_INTERVAL: i32 = 120;

/// Name of the running executable, cut to fit a parameter item.
fn process_name() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    let mut name = exe.file_name()?.to_string_lossy().into_owned();
    while name.len() > 255 {
        name.pop();
    }
    Some(name)
}

#[cfg(test)]
pub(crate) mod test {
    use bytes::{BufMut, BytesMut};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    use super::*;
    use crate::{
        auth::AuthPlugin,
        channel::test::pair,
        ext::BufMutExt,
        firebird::{consts::*, op},
    };

    pub(crate) use handshake::test::ok_response;

    /// Attached connection over an in memory pipe.
    pub(crate) fn mock(protocol: u32, lazy: bool) -> (Connection, DuplexStream) {
        mock_with(protocol, lazy, Config::default())
    }

    pub(crate) fn mock_with(protocol: u32, lazy: bool, config: Config) -> (Connection, DuplexStream) {
        let (ch, peer) = pair();
        let session = Session {
            protocol,
            accept_type: if lazy { PTYPE_LAZY_SEND } else { PTYPE_BATCH_SEND },
            auth_data: None,
            plugin: AuthPlugin::Srp256,
            wire_crypt: None,
        };
        let mut conn = Connection::from_parts(ch, config, session);
        conn.db = 1;
        (conn, peer)
    }

    /// Read whatever the client flushed so far.
    pub(crate) async fn sent(peer: &mut DuplexStream) -> Vec<u8> {
        let mut buf = vec![0u8; 64 * 1024];
        let n = peer.read(&mut buf).await.unwrap();
        buf.truncate(n);
        buf
    }

    fn opcodes(bytes: &[u8]) -> Vec<u32> {
        bytes.chunks(4).map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]])).collect()
    }

    #[tokio::test]
    async fn deferred_responses_are_drained_first() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, true);

        conn.send(frontend::FreeStatement { stmt: 5, mode: DSQL_DROP });
        conn.defer_response().await.unwrap();
        conn.send(frontend::Ping);

        let mut buf = BytesMut::new();
        // failed deferred response does not fail the ping
        buf.put_u32(op::RESPONSE);
        buf.put_u32(0);
        buf.put_u64(0);
        buf.put_xdr_bytes(b"");
        buf.put_u32(arg::GDS);
        buf.put_u32(335544569);
        buf.put_u32(arg::END);
        ok_response(&mut buf, 9, b"");
        peer.write_all(&buf).await.unwrap();

        let res = conn.recv_response().await.unwrap();
        assert_eq!(res.handle, 9);

        let out = sent(&mut peer).await;
        let words = opcodes(&out);
        assert_eq!(words[0], op::FREE_STATEMENT);
        assert_eq!(words[3], op::PING);
    }

    #[tokio::test]
    async fn eager_defer_reads_immediately() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION13, false);
        let mut buf = BytesMut::new();
        ok_response(&mut buf, 0, b"");
        peer.write_all(&buf).await.unwrap();

        conn.send(frontend::FreeStatement { stmt: 5, mode: DSQL_CLOSE });
        conn.defer_response().await.unwrap();
        assert_eq!(conn.deferred, 0);
    }

    #[tokio::test]
    async fn server_version_item() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, false);
        let version = b"LI-V4.0.2.2816 Firebird 4.0";
        let mut item = vec![info::FIREBIRD_VERSION];
        item.extend(((version.len() + 2) as u16).to_le_bytes());
        item.push(1);
        item.push(version.len() as u8);
        item.extend(version);
        item.push(info::END);

        let mut buf = BytesMut::new();
        ok_response(&mut buf, 0, &item);
        peer.write_all(&buf).await.unwrap();

        let v = conn.server_version().await.unwrap();
        assert_eq!(v.major, 4);
        assert_eq!(v.build, 2816);
        assert!(v.at_least(3, 0));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, false);
        let mut buf = BytesMut::new();
        ok_response(&mut buf, 0, b"");
        peer.write_all(&buf).await.unwrap();

        conn.close().await.unwrap();
        assert!(conn.is_closed());
        conn.close().await.unwrap();
        assert!(matches!(conn.ping().await.unwrap_err().kind(), crate::ErrorKind::Closed(_)));
    }

    #[test]
    fn dpb_layout() {
        let (mut conn, _peer) = mock(PROTOCOL_VERSION16, false);
        conn.config = Config::default().user("SYSDBA").role("ADMIN").timezone("UTC");
        conn.session.auth_data = Some(b"ab".to_vec());
        let dpb = conn.dpb(None);
        let dpb = dpb.as_slice();

        assert_eq!(&dpb[..7], &[dpb::VERSION1, dpb::SQL_DIALECT, 4, 3, 0, 0, 0]);
        assert_eq!(&dpb[7..13], &[dpb::LC_CTYPE, 4, b'U', b'T', b'F', b'8']);
        assert_eq!(&dpb[13..21], &[dpb::USER_NAME, 6, b'S', b'Y', b'S', b'D', b'B', b'A']);
        assert_eq!(&dpb[21..23], &[dpb::SQL_ROLE_NAME, 5]);
        assert!(dpb.windows(6).any(|w| w == [dpb::SPECIFIC_AUTH_DATA, 4, b'6', b'1', b'6', b'2']));
        assert_eq!(&dpb[dpb.len() - 5..], &[dpb::SESSION_TIME_ZONE, 3, b'U', b'T', b'C']);
    }
}
