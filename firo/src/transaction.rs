//! The [`Transaction`] type.
use bytes::Bytes;

use crate::{
    Result,
    common::verbose,
    connection::Connection,
    error::Closed,
    firebird::{consts::tpb, frontend},
};

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// Read committed, waits for the newest version of a locked record.
    #[default]
    ReadCommitted,
    /// Read committed, reads the last committed version of a locked record.
    ReadCommittedRecordVersion,
    /// Read committed without write access.
    ReadCommittedReadOnly,
    /// Snapshot of the database at begin, `concurrency`.
    RepeatableRead,
    /// Snapshot with table stability, `consistency`.
    Serializable,
}

impl Isolation {
    /// Transaction parameter block sent with begin.
    pub fn tpb(self) -> &'static [u8] {
        use tpb::*;
        match self {
            Isolation::ReadCommitted => &[VERSION3, WRITE, WAIT, READ_COMMITTED, NO_REC_VERSION],
            Isolation::ReadCommittedRecordVersion => &[VERSION3, WRITE, WAIT, READ_COMMITTED, REC_VERSION],
            Isolation::ReadCommittedReadOnly => &[VERSION3, READ, WAIT, READ_COMMITTED, REC_VERSION],
            Isolation::RepeatableRead => &[VERSION3, WRITE, WAIT, CONCURRENCY],
            Isolation::Serializable => &[VERSION3, WRITE, WAIT, CONSISTENCY],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Begins with the first statement.
    Idle,
    Active(u32),
    /// Committed or rolled back.
    Done,
}

/// Handle bookkeeping shared by [`Transaction`] and the autocommit
/// transaction of a [`Connection`].
///
/// An autocommit transaction returns to idle after commit or rollback, an
/// explicit one is done.
#[derive(Debug)]
pub(crate) struct TxState {
    isolation: Isolation,
    autocommit: bool,
    phase: Phase,
}

impl TxState {
    pub(crate) fn autocommit() -> Self {
        Self { isolation: Isolation::default(), autocommit: true, phase: Phase::Idle }
    }

    fn explicit(isolation: Isolation) -> Self {
        Self { isolation, autocommit: false, phase: Phase::Idle }
    }

    pub(crate) fn is_autocommit(&self) -> bool {
        self.autocommit
    }

    fn active(&self) -> Option<u32> {
        match self.phase {
            Phase::Active(handle) => Some(handle),
            _ => None,
        }
    }

    fn finish(&mut self) {
        self.phase = match self.autocommit {
            true => Phase::Idle,
            false => Phase::Done,
        };
    }

    /// Transaction handle, beginning the transaction when idle.
    pub(crate) async fn handle(&mut self, conn: &mut Connection) -> Result<u32> {
        match self.phase {
            Phase::Active(handle) => Ok(handle),
            Phase::Done => Err(Closed.into()),
            Phase::Idle => {
                conn.send(frontend::Transaction { db: conn.db_handle(), tpb: self.isolation.tpb() });
                let handle = conn.recv_response().await?.handle;
                verbose!(handle, isolation = ?self.isolation, "begin");
                self.phase = Phase::Active(handle);
                Ok(handle)
            },
        }
    }

    pub(crate) async fn commit(&mut self, conn: &mut Connection) -> Result<()> {
        match self.phase {
            Phase::Active(handle) => {
                conn.send(frontend::Commit { handle });
                conn.recv_response().await?;
                verbose!(handle, "commit");
                self.finish();
                Ok(())
            },
            Phase::Idle => {
                self.finish();
                Ok(())
            },
            Phase::Done => Err(Closed.into()),
        }
    }

    pub(crate) async fn rollback(&mut self, conn: &mut Connection) -> Result<()> {
        match self.phase {
            Phase::Active(handle) => {
                conn.send(frontend::Rollback { handle });
                conn.recv_response().await?;
                verbose!(handle, "rollback");
                self.finish();
                Ok(())
            },
            Phase::Idle => {
                self.finish();
                Ok(())
            },
            Phase::Done => Err(Closed.into()),
        }
    }

    /// Commit and keep the handle, an idle transaction has nothing to commit.
    pub(crate) async fn commit_retaining(&mut self, conn: &mut Connection) -> Result<()> {
        match self.phase {
            Phase::Active(handle) => {
                conn.send(frontend::CommitRetaining { handle });
                conn.recv_response().await?;
                Ok(())
            },
            Phase::Idle => Ok(()),
            Phase::Done => Err(Closed.into()),
        }
    }

    pub(crate) async fn rollback_retaining(&mut self, conn: &mut Connection) -> Result<()> {
        match self.phase {
            Phase::Active(handle) => {
                conn.send(frontend::RollbackRetaining { handle });
                conn.recv_response().await?;
                Ok(())
            },
            Phase::Idle => Ok(()),
            Phase::Done => Err(Closed.into()),
        }
    }

    pub(crate) async fn info(&mut self, conn: &mut Connection, items: &[u8]) -> Result<Bytes> {
        let handle = self.handle(conn).await?;
        conn.send(frontend::InfoTransaction {
            handle,
            items,
            buffer_length: conn.config().buffer_length,
        });
        Ok(conn.recv_response().await?.buffer)
    }
}

/// An RAII implementation of transaction scope.
///
/// To begin a transaction, use [`Connection::begin`].
///
/// To commit transaction, use [`Transaction::commit`].
///
/// If not commited, when this structure is dropped, transaction will be rolled
/// back with the next request.
///
/// # Example
///
/// ```no_run
/// # async fn test(mut conn: firo::Connection) -> firo::Result<()> {
/// use firo::Isolation;
///
/// let mut tx = conn.begin(Isolation::Serializable).await?;
///
/// firo::execute("insert into post(name) values('foo')", &mut tx)
///     .execute()
///     .await?;
///
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Transaction<'c> {
    conn: &'c mut Connection,
    state: TxState,
}

impl<'c> Transaction<'c> {
    pub(crate) async fn begin(conn: &'c mut Connection, isolation: Isolation) -> Result<Self> {
        let mut state = TxState::explicit(isolation);
        state.handle(conn).await?;
        Ok(Self { conn, state })
    }

    /// Server handle of the transaction.
    pub fn handle(&self) -> Option<u32> {
        self.state.active()
    }

    pub fn isolation(&self) -> Isolation {
        self.state.isolation
    }

    /// Commit transaction.
    pub async fn commit(mut self) -> Result<()> {
        self.state.commit(self.conn).await
    }

    /// Roll back transaction.
    pub async fn rollback(mut self) -> Result<()> {
        self.state.rollback(self.conn).await
    }

    /// Commit the work done so far, the transaction stays usable.
    pub async fn commit_retaining(&mut self) -> Result<()> {
        self.state.commit_retaining(self.conn).await
    }

    /// Undo the work done so far, the transaction stays usable.
    pub async fn rollback_retaining(&mut self) -> Result<()> {
        self.state.rollback_retaining(self.conn).await
    }

    /// Raw transaction info request.
    pub async fn info(&mut self, items: &[u8]) -> Result<Bytes> {
        self.state.info(self.conn, items).await
    }

    pub(crate) fn parts(&mut self) -> (&mut Connection, &mut TxState) {
        (self.conn, &mut self.state)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.state.active() {
            self.conn.send(frontend::Rollback { handle });
            self.conn.forget_response();
        }
    }
}

impl Connection {
    /// Begin a transaction.
    ///
    /// Statements executed on the [`Connection`] itself run in an autocommit
    /// transaction instead.
    pub async fn begin(&mut self, isolation: Isolation) -> Result<Transaction<'_>> {
        Transaction::begin(self, isolation).await
    }
}
