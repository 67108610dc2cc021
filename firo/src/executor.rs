//! The [`Executor`] trait.
use crate::{
    Result,
    connection::Connection,
    transaction::{Transaction, TxState},
};

/// A type that statements can run on.
///
/// A [`Connection`] runs statements in its autocommit transaction, a
/// [`Transaction`] in itself.
pub trait Executor {
    /// Borrow the connection and transaction.
    fn scope(&mut self) -> Scope<'_>;
}

impl Executor for Connection {
    fn scope(&mut self) -> Scope<'_> {
        Scope { conn: self, tx: None }
    }
}

impl Executor for Transaction<'_> {
    fn scope(&mut self) -> Scope<'_> {
        let (conn, tx) = self.parts();
        Scope { conn, tx: Some(tx) }
    }
}

impl<E: Executor + ?Sized> Executor for &mut E {
    fn scope(&mut self) -> Scope<'_> {
        E::scope(self)
    }
}

/// Connection borrowed by an [`Executor`], with the transaction statements
/// run in.
#[derive(Debug)]
pub struct Scope<'a> {
    pub(crate) conn: &'a mut Connection,
    /// [`None`] for the autocommit transaction of `conn`.
    pub(crate) tx: Option<&'a mut TxState>,
}

/// Run `$body` with `$tx` bound to the scope transaction.
///
/// The autocommit transaction is moved out of the connection for the
/// duration, so the body can borrow both.
macro_rules! with_tx {
    ($scope:ident, $tx:ident => $body:expr) => {
        match $scope.tx.as_deref_mut() {
            Some($tx) => $body,
            None => {
                let mut tx = std::mem::replace(&mut $scope.conn.default_tx, TxState::autocommit());
                let $tx = &mut tx;
                let res = $body;
                $scope.conn.default_tx = tx;
                res
            },
        }
    };
}

impl Scope<'_> {
    /// Transaction handle, beginning the transaction when idle.
    pub(crate) async fn tx_handle(&mut self) -> Result<u32> {
        let scope = self;
        with_tx!(scope, tx => tx.handle(scope.conn).await)
    }

    /// Hook run after a statement completes.
    ///
    /// Work of the autocommit transaction is committed, keeping its handle.
    pub(crate) async fn statement_closed(&mut self) -> Result<()> {
        let scope = self;
        with_tx!(scope, tx => match tx.is_autocommit() {
            true => tx.commit_retaining(scope.conn).await,
            false => Ok(()),
        })
    }
}
