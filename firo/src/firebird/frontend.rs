//! Client requests.
//!
//! Every request starts with its opcode word followed by a fixed sequence of
//! words and XDR byte blocks.
use bytes::{BufMut, BytesMut};

use super::{consts::*, op};
use crate::{common::verbose, ext::BufMutExt};

/// Write request to `buf`.
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut BytesMut) {
    verbose!("(F) {}", op::name(F::OPCODE));
    buf.put_u32(F::OPCODE);
    msg.encode(buf);
}

/// A type that can be encoded into client request.
pub trait FrontendProtocol {
    /// Request opcode.
    const OPCODE: u32;

    /// Write the request body, without the opcode.
    fn encode(self, buf: &mut BytesMut);
}

/// Candidate protocol versions and their weights, newest weighted highest.
const PROTOCOLS: &[(u32, u32)] = &[
    (PROTOCOL_VERSION10, 2),
    (PROTOCOL_VERSION11, 4),
    (PROTOCOL_VERSION12, 6),
    (PROTOCOL_VERSION13, 8),
    (PROTOCOL_VERSION14, 10),
    (PROTOCOL_VERSION15, 12),
    (PROTOCOL_VERSION16, 14),
    (PROTOCOL_VERSION17, 16),
];

/// Flagged versions travel sign extended to 32 bits.
const fn wire_version(version: u32) -> u32 {
    match version & FB_PROTOCOL_FLAG {
        0 => version,
        _ => 0xFFFF_0000 | version,
    }
}

pub struct Connect<'a> {
    pub database: &'a str,
    pub user_id: &'a [u8],
    pub compress: bool,
}

impl FrontendProtocol for Connect<'_> {
    const OPCODE: u32 = op::CONNECT;

    fn encode(self, buf: &mut BytesMut) {
        let max_type = match self.compress {
            true => PTYPE_LAZY_SEND | PFLAG_COMPRESS,
            false => PTYPE_LAZY_SEND,
        };
        buf.put_u32(op::ATTACH);
        buf.put_u32(CONNECT_VERSION3);
        buf.put_u32(ARCH_GENERIC);
        buf.put_xdr_str(self.database);
        buf.put_u32(PROTOCOLS.len() as u32);
        buf.put_xdr_bytes(self.user_id);
        for &(version, weight) in PROTOCOLS {
            buf.put_u32(wire_version(version));
            buf.put_u32(ARCH_GENERIC);
            buf.put_u32(0);
            buf.put_u32(max_type);
            buf.put_u32(weight);
        }
    }
}

pub struct ContAuth<'a> {
    /// Already hex encoded.
    pub data: &'a [u8],
    pub plugin: &'a str,
    pub plugin_list: &'a str,
    pub keys: &'a [u8],
}

impl FrontendProtocol for ContAuth<'_> {
    const OPCODE: u32 = op::CONT_AUTH;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_xdr_bytes(self.data);
        buf.put_xdr_str(self.plugin);
        buf.put_xdr_str(self.plugin_list);
        buf.put_xdr_bytes(self.keys);
    }
}

pub struct Crypt<'a> {
    pub plugin: &'a str,
    pub key_type: &'a str,
}

impl FrontendProtocol for Crypt<'_> {
    const OPCODE: u32 = op::CRYPT;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_xdr_str(self.plugin);
        buf.put_xdr_str(self.key_type);
    }
}

pub struct Attach<'a> {
    pub database: &'a str,
    pub dpb: &'a [u8],
}

impl FrontendProtocol for Attach<'_> {
    const OPCODE: u32 = op::ATTACH;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(0);
        buf.put_xdr_str(self.database);
        buf.put_xdr_bytes(self.dpb);
    }
}

pub struct Create<'a> {
    pub database: &'a str,
    pub dpb: &'a [u8],
}

impl FrontendProtocol for Create<'_> {
    const OPCODE: u32 = op::CREATE;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(0);
        buf.put_xdr_str(self.database);
        buf.put_xdr_bytes(self.dpb);
    }
}

/// Requests made of a single handle word.
macro_rules! handle_request {
    ($($(#[$meta:meta])* $name:ident = $op:path;)*) => {$(
        $(#[$meta])*
        pub struct $name {
            pub handle: u32,
        }

        impl FrontendProtocol for $name {
            const OPCODE: u32 = $op;

            fn encode(self, buf: &mut BytesMut) {
                buf.put_u32(self.handle);
            }
        }
    )*};
}

handle_request! {
    Detach = op::DETACH;
    DropDatabase = op::DROP_DATABASE;
    AllocateStatement = op::ALLOCATE_STATEMENT;
    Commit = op::COMMIT;
    CommitRetaining = op::COMMIT_RETAINING;
    Rollback = op::ROLLBACK;
    RollbackRetaining = op::ROLLBACK_RETAINING;
    CloseBlob = op::CLOSE_BLOB;
    ServiceDetach = op::SERVICE_DETACH;
}

pub struct Ping;

impl FrontendProtocol for Ping {
    const OPCODE: u32 = op::PING;

    fn encode(self, _: &mut BytesMut) { }
}

/// Database, transaction and statement info requests share one layout.
macro_rules! info_request {
    ($($name:ident = $op:path;)*) => {$(
        pub struct $name<'a> {
            pub handle: u32,
            pub items: &'a [u8],
            pub buffer_length: u32,
        }

        impl FrontendProtocol for $name<'_> {
            const OPCODE: u32 = $op;

            fn encode(self, buf: &mut BytesMut) {
                buf.put_u32(self.handle);
                buf.put_u32(0);
                buf.put_xdr_bytes(self.items);
                buf.put_u32(self.buffer_length);
            }
        }
    )*};
}

info_request! {
    InfoDatabase = op::INFO_DATABASE;
    InfoTransaction = op::INFO_TRANSACTION;
    InfoSql = op::INFO_SQL;
}

pub struct Transaction<'a> {
    pub db: u32,
    pub tpb: &'a [u8],
}

impl FrontendProtocol for Transaction<'_> {
    const OPCODE: u32 = op::TRANSACTION;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(self.db);
        buf.put_xdr_bytes(self.tpb);
    }
}

pub struct PrepareStatement<'a> {
    pub tr: u32,
    pub stmt: u32,
    pub sql: &'a [u8],
    pub items: &'a [u8],
    pub buffer_length: u32,
}

impl FrontendProtocol for PrepareStatement<'_> {
    const OPCODE: u32 = op::PREPARE_STATEMENT;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(self.tr);
        buf.put_u32(self.stmt);
        buf.put_u32(SQL_DIALECT);
        buf.put_xdr_bytes(self.sql);
        buf.put_xdr_bytes(self.items);
        buf.put_u32(self.buffer_length);
    }
}

/// Input message shared by execute and execute2.
pub struct Params<'a> {
    pub blr: &'a [u8],
    /// Encoded values, already 4 byte aligned.
    pub values: &'a [u8],
}

impl Params<'_> {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_xdr_bytes(self.blr);
        // message number
        buf.put_u32(0);
        match self.blr.is_empty() {
            true => buf.put_u32(0),
            false => {
                buf.put_u32(1);
                buf.put_slice(self.values);
            },
        }
    }
}

pub struct Execute<'a> {
    pub stmt: u32,
    pub tr: u32,
    pub params: Params<'a>,
    pub protocol: u32,
}

impl FrontendProtocol for Execute<'_> {
    const OPCODE: u32 = op::EXECUTE;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(self.stmt);
        buf.put_u32(self.tr);
        self.params.encode(buf);
        if self.protocol >= PROTOCOL_VERSION16 {
            // statement timeout
            buf.put_u32(0);
        }
    }
}

pub struct Execute2<'a> {
    pub stmt: u32,
    pub tr: u32,
    pub params: Params<'a>,
    pub output_blr: &'a [u8],
    pub protocol: u32,
}

impl FrontendProtocol for Execute2<'_> {
    const OPCODE: u32 = op::EXECUTE2;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(self.stmt);
        buf.put_u32(self.tr);
        self.params.encode(buf);
        buf.put_xdr_bytes(self.output_blr);
        // output message number
        buf.put_u32(0);
        if self.protocol >= PROTOCOL_VERSION16 {
            buf.put_u32(0);
        }
    }
}

pub struct Fetch<'a> {
    pub stmt: u32,
    pub blr: &'a [u8],
    pub count: u32,
}

impl FrontendProtocol for Fetch<'_> {
    const OPCODE: u32 = op::FETCH;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(self.stmt);
        buf.put_xdr_bytes(self.blr);
        buf.put_u32(0);
        buf.put_u32(self.count);
    }
}

pub struct FreeStatement {
    pub stmt: u32,
    pub mode: u32,
}

impl FrontendProtocol for FreeStatement {
    const OPCODE: u32 = op::FREE_STATEMENT;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(self.stmt);
        buf.put_u32(self.mode);
    }
}

pub struct OpenBlob {
    pub tr: u32,
    pub blob_id: u64,
}

impl FrontendProtocol for OpenBlob {
    const OPCODE: u32 = op::OPEN_BLOB;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(self.tr);
        buf.put_u64(self.blob_id);
    }
}

pub struct CreateBlob2 {
    pub tr: u32,
}

impl FrontendProtocol for CreateBlob2 {
    const OPCODE: u32 = op::CREATE_BLOB2;

    fn encode(self, buf: &mut BytesMut) {
        // empty blob parameter block
        buf.put_u32(0);
        buf.put_u32(self.tr);
        buf.put_u64(0);
    }
}

pub struct GetSegment {
    pub blob: u32,
    pub buffer_length: u32,
}

impl FrontendProtocol for GetSegment {
    const OPCODE: u32 = op::GET_SEGMENT;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(self.blob);
        buf.put_u32(self.buffer_length);
        buf.put_u32(0);
    }
}

pub struct PutSegment<'a> {
    pub blob: u32,
    pub data: &'a [u8],
}

impl FrontendProtocol for PutSegment<'_> {
    const OPCODE: u32 = op::PUT_SEGMENT;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(self.blob);
        buf.put_u32(self.data.len() as u32);
        buf.put_xdr_bytes(self.data);
    }
}

pub struct ConnectRequest {
    pub db: u32,
}

impl FrontendProtocol for ConnectRequest {
    const OPCODE: u32 = op::CONNECT_REQUEST;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(P_REQ_ASYNC);
        buf.put_u32(self.db);
        buf.put_u32(0);
    }
}

pub struct QueEvents<'a> {
    pub db: u32,
    pub epb: &'a [u8],
    pub event_id: u32,
}

impl FrontendProtocol for QueEvents<'_> {
    const OPCODE: u32 = op::QUE_EVENTS;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(self.db);
        buf.put_xdr_bytes(self.epb);
        // ast routine and its argument, unused by remote clients
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_u32(self.event_id);
    }
}

pub struct CancelEvents {
    pub db: u32,
    pub event_id: u32,
}

impl FrontendProtocol for CancelEvents {
    const OPCODE: u32 = op::CANCEL_EVENTS;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(self.db);
        buf.put_u32(self.event_id);
    }
}

pub struct ServiceAttach<'a> {
    pub spb: &'a [u8],
}

impl FrontendProtocol for ServiceAttach<'_> {
    const OPCODE: u32 = op::SERVICE_ATTACH;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(0);
        buf.put_xdr_str("service_mgr");
        buf.put_xdr_bytes(self.spb);
    }
}

pub struct ServiceStart<'a> {
    pub svc: u32,
    pub spb: &'a [u8],
}

impl FrontendProtocol for ServiceStart<'_> {
    const OPCODE: u32 = op::SERVICE_START;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(self.svc);
        buf.put_u32(0);
        buf.put_xdr_bytes(self.spb);
    }
}

pub struct ServiceInfo<'a> {
    pub svc: u32,
    pub spb: &'a [u8],
    pub items: &'a [u8],
    pub buffer_length: u32,
}

impl FrontendProtocol for ServiceInfo<'_> {
    const OPCODE: u32 = op::SERVICE_INFO;

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u32(self.svc);
        buf.put_u32(0);
        buf.put_xdr_bytes(self.spb);
        buf.put_xdr_bytes(self.items);
        buf.put_u32(self.buffer_length);
    }
}
