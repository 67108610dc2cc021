//! Blob content transfer.
//!
//! Blob columns are fetched as a [`BlobId`], the content is read with
//! [`read_blob`] in the same transaction. Parameters reaching the inline
//! limit are written with [`write_blob`] before the statement executes.
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    Result,
    common::verbose,
    connection::Connection,
    executor::Executor,
    firebird::{consts::SEGSTR_EOF, frontend, pb::ParamReader},
};

/// Identifier of a blob stored in the database.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlobId(pub u64);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({self})")
    }
}

/// Read the whole content of a blob.
///
/// # Example
///
/// ```no_run
/// # async fn test(mut conn: firo::Connection) -> firo::Result<()> {
/// use firo::{BlobId, blob::read_blob};
///
/// let (id,): (BlobId,) = firo::query("select doc from post", &mut conn)
///     .fetch_one()
///     .await?;
/// let content = read_blob(&mut conn, id).await?;
/// # Ok(())
/// # }
/// ```
pub async fn read_blob<E: Executor>(mut exe: E, id: BlobId) -> Result<Bytes> {
    let mut scope = exe.scope();
    let tr = scope.tx_handle().await?;
    read_segments(scope.conn, tr, id).await
}

/// Store `data` as a new blob, returning its identifier.
pub async fn write_blob<E: Executor>(mut exe: E, data: &[u8]) -> Result<BlobId> {
    let mut scope = exe.scope();
    let tr = scope.tx_handle().await?;
    put_segments(scope.conn, tr, data).await
}

pub(crate) async fn read_segments(conn: &mut Connection, tr: u32, id: BlobId) -> Result<Bytes> {
    verbose!(id = id.0, "read blob");

    conn.send(frontend::OpenBlob { tr, blob_id: id.0 });
    let blob = conn.recv_response().await?.handle;
    let buffer_length = conn.config().segment_size as u32;

    let mut content = BytesMut::new();
    loop {
        conn.send(frontend::GetSegment { blob, buffer_length });
        let res = conn.recv_response().await?;
        // handle carries the segment status
        let status = res.handle;
        let mut r = ParamReader::new(res.buffer);
        while !r.is_end() {
            content.put(r.get_bytes()?);
        }
        if status == SEGSTR_EOF {
            break;
        }
    }

    conn.send(frontend::CloseBlob { handle: blob });
    conn.defer_response().await?;
    Ok(content.freeze())
}

pub(crate) async fn put_segments(conn: &mut Connection, tr: u32, data: &[u8]) -> Result<BlobId> {
    verbose!(len = data.len(), "write blob");

    conn.send(frontend::CreateBlob2 { tr });
    let res = conn.recv_response().await?;
    let (blob, id) = (res.handle, BlobId(res.oid));

    let segment_size = conn.config().segment_size;
    for segment in data.chunks(segment_size) {
        conn.send(frontend::PutSegment { blob, data: segment });
        conn.recv_response().await?;
    }

    conn.send(frontend::CloseBlob { handle: blob });
    conn.recv_response().await?;
    Ok(id)
}
