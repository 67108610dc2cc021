//! Service manager and server version.
//!
//! The service manager runs administrative tasks such as backup, restore or
//! statistics on the server. A task is started with a service parameter
//! block, its text output is then read line by line with info requests.
//!
//! ```no_run
//! # async fn test(config: firo::Config) -> firo::Result<()> {
//! use firo::service::Service;
//!
//! let mut svc = Service::attach(config).await?;
//! println!("{}", svc.server_version().await?);
//! svc.close().await?;
//! # Ok(())
//! # }
//! ```
use bytes::Bytes;
use std::{fmt, time::Duration};

use crate::{
    Config, Connection, Result,
    firebird::{ProtocolError, consts::info, frontend, pb::ParamReader},
};

/// Interval between polls of [`Service::wait`].
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Attached service manager.
#[derive(Debug)]
pub struct Service {
    conn: Connection,
}

impl Service {
    /// Connect and attach the service manager of the server in `config`,
    /// the database path is ignored.
    pub async fn attach(config: Config) -> Result<Service> {
        Ok(Service { conn: Connection::connect_service(config).await? })
    }

    /// Service handle.
    pub fn handle(&self) -> u32 {
        self.conn.db_handle()
    }

    /// Start a task described by `spb`, the first byte is the action.
    pub async fn start(&mut self, spb: &[u8]) -> Result<()> {
        let svc = self.conn.db_handle();
        self.conn.send(frontend::ServiceStart { svc, spb });
        self.conn.recv_response().await?;
        Ok(())
    }

    /// Query `items`, the response is checked to start with the first item.
    pub async fn info(&mut self, spb: &[u8], items: &[u8], buffer_length: u32) -> Result<Bytes> {
        let svc = self.conn.db_handle();
        self.conn.send(frontend::ServiceInfo { svc, spb, items, buffer_length });
        let buf = self.conn.recv_response().await?.buffer;
        match (items.first(), buf.first()) {
            (Some(item), Some(tag)) if item != tag => {
                Err(ProtocolError::malformed(format!("service info answered {tag} for item {item}")).into())
            },
            (Some(_), None) => Err(ProtocolError::malformed("empty service info").into()),
            _ => Ok(buf),
        }
    }

    async fn info_item(&mut self, item: u8) -> Result<ParamReader> {
        let buffer_length = self.conn.config().buffer_length;
        let buf = self.info(&[], &[item, info::END], buffer_length).await?;
        let mut r = ParamReader::new(buf);
        r.next_tag();
        Ok(r)
    }

    /// Returns `true` while the started task has not finished.
    pub async fn is_running(&mut self) -> Result<bool> {
        let mut r = self.info_item(info::SVC_RUNNING).await?;
        Ok(r.get_i32()? != 0)
    }

    /// Poll until the started task finished.
    pub async fn wait(&mut self) -> Result<()> {
        while self.is_running().await? {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }

    /// Next line of the task output, [`None`] once the output is exhausted.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        let mut r = self.info_item(info::SVC_LINE).await?;
        let line = r.get_string()?;
        match line.is_empty() {
            true => Ok(None),
            false => Ok(Some(line)),
        }
    }

    /// Collect the task output until it is exhausted.
    pub async fn wait_lines(&mut self) -> Result<Vec<String>> {
        let mut lines = vec![];
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Version reported by the service manager.
    pub async fn server_version(&mut self) -> Result<FirebirdVersion> {
        let mut r = self.info_item(info::SVC_SERVER_VERSION).await?;
        Ok(FirebirdVersion::parse(&r.get_string()?))
    }

    /// Server implementation, such as `Firebird/Linux/AMD/Intel/x64`.
    pub async fn implementation(&mut self) -> Result<String> {
        let mut r = self.info_item(info::SVC_IMPLEMENTATION).await?;
        Ok(r.get_string()?)
    }

    /// Detach the service manager.
    ///
    /// Closing a closed service does nothing.
    pub async fn close(&mut self) -> Result<()> {
        self.conn.detach_service().await
    }
}

/// Firebird server version.
///
/// Parsed from strings like `WI-V3.0.5.33220 Firebird 3.0`: platform `WI`,
/// release kind `V`, then major, minor, patch and build number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirebirdVersion {
    /// Platform code, `WI` for windows or `LI` for linux.
    pub platform: String,
    /// Release kind, `V` for production or `T` for beta.
    pub kind: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
    /// The whole version string.
    pub raw: String,
}

impl FirebirdVersion {
    /// Parse a version string, unrecognized parts stay zero.
    pub fn parse(raw: &str) -> FirebirdVersion {
        let mut me = FirebirdVersion { raw: raw.to_owned(), ..Default::default() };
        let code = raw.split_whitespace().next().unwrap_or_default();
        let Some((platform, rest)) = code.split_once('-') else {
            return me;
        };
        let Some(kind) = rest.chars().next().filter(char::is_ascii_alphabetic) else {
            return me;
        };
        me.platform = platform.to_owned();
        me.kind = kind.to_string();

        // build may carry a suffix like `-dev`
        let numbers = rest[kind.len_utf8()..].split('-').next().unwrap_or_default();
        let mut parts = numbers.split('.').map(|n| n.parse::<u32>().unwrap_or(0));
        me.major = parts.next().unwrap_or(0);
        me.minor = parts.next().unwrap_or(0);
        me.patch = parts.next().unwrap_or(0);
        me.build = parts.next().unwrap_or(0);
        me
    }

    /// Returns `true` if the version is `major.minor` or later.
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl fmt::Display for FirebirdVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.build)
    }
}
