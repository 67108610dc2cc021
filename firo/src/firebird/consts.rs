//! Protocol constants.
//!
//! Tag names follow the server headers with their `isc_`/`CNCT_` prefix
//! replaced by the module they live in.

/// Protocol version flag set on every version above 10.
pub const FB_PROTOCOL_FLAG: u32 = 0x8000;
pub const FB_PROTOCOL_MASK: u32 = !FB_PROTOCOL_FLAG & 0xFFFF;

pub const PROTOCOL_VERSION10: u32 = 10;
pub const PROTOCOL_VERSION11: u32 = FB_PROTOCOL_FLAG | 11;
pub const PROTOCOL_VERSION12: u32 = FB_PROTOCOL_FLAG | 12;
pub const PROTOCOL_VERSION13: u32 = FB_PROTOCOL_FLAG | 13;
pub const PROTOCOL_VERSION14: u32 = FB_PROTOCOL_FLAG | 14;
pub const PROTOCOL_VERSION15: u32 = FB_PROTOCOL_FLAG | 15;
pub const PROTOCOL_VERSION16: u32 = FB_PROTOCOL_FLAG | 16;
pub const PROTOCOL_VERSION17: u32 = FB_PROTOCOL_FLAG | 17;

/// Generic architecture.
pub const ARCH_GENERIC: u32 = 1;

pub const CONNECT_VERSION3: u32 = 3;

pub const PTYPE_RPC: u32 = 2;
pub const PTYPE_BATCH_SEND: u32 = 3;
pub const PTYPE_OUT_OF_BAND: u32 = 4;
pub const PTYPE_LAZY_SEND: u32 = 5;
pub const PTYPE_MASK: u32 = 0xFF;
pub const PFLAG_COMPRESS: u32 = 0x100;

/// Advertised authentication plugins, most preferred first.
pub const PLUGIN_LIST: &str = "Srp256,Srp,Legacy_Auth";

pub const INVALID_OBJECT: u32 = 0xFFFF;
pub const SQL_DIALECT: u32 = 3;

/// `DSQL_close`, keeps the statement allocated.
pub const DSQL_CLOSE: u32 = 1;
/// `DSQL_drop`, releases the statement.
pub const DSQL_DROP: u32 = 2;

/// Fetch status signalling an exhausted cursor.
pub const FETCH_EXHAUSTED: u32 = 100;

/// `get_segment` response handle when there is no more blob data.
pub const SEGSTR_EOF: u32 = 2;

pub const P_REQ_ASYNC: u32 = 1;
pub const EPB_VERSION1: u8 = 1;

pub mod cnct {
    pub const USER: u8 = 1;
    pub const PASSWD: u8 = 2;
    pub const HOST: u8 = 4;
    pub const GROUP: u8 = 5;
    pub const USER_VERIFICATION: u8 = 6;
    pub const SPECIFIC_DATA: u8 = 7;
    pub const PLUGIN_NAME: u8 = 8;
    pub const LOGIN: u8 = 9;
    pub const PLUGIN_LIST: u8 = 10;
    pub const CLIENT_CRYPT: u8 = 11;
}

/// Server key list tags sent with a conditional accept.
pub mod keys {
    pub const KNOWN_PLUGINS: u8 = 1;
    pub const PLUGIN_SPECIFIC: u8 = 3;
}

pub mod info {
    pub const END: u8 = 1;
    pub const TRUNCATED: u8 = 2;
    pub const ERROR: u8 = 3;
    pub const DATA_NOT_READY: u8 = 4;

    pub const SQL_SELECT: u8 = 4;
    pub const SQL_BIND: u8 = 5;
    pub const SQL_NUM_VARIABLES: u8 = 6;
    pub const SQL_DESCRIBE_VARS: u8 = 7;
    pub const SQL_DESCRIBE_END: u8 = 8;
    pub const SQL_SQLDA_SEQ: u8 = 9;
    pub const SQL_MESSAGE_SEQ: u8 = 10;
    pub const SQL_TYPE: u8 = 11;
    pub const SQL_SUB_TYPE: u8 = 12;
    pub const SQL_SCALE: u8 = 13;
    pub const SQL_LENGTH: u8 = 14;
    pub const SQL_NULL_IND: u8 = 15;
    pub const SQL_FIELD: u8 = 16;
    pub const SQL_RELATION: u8 = 17;
    pub const SQL_OWNER: u8 = 18;
    pub const SQL_ALIAS: u8 = 19;
    pub const SQL_SQLDA_START: u8 = 20;
    pub const SQL_STMT_TYPE: u8 = 21;
    pub const SQL_GET_PLAN: u8 = 22;
    pub const SQL_RECORDS: u8 = 23;
    pub const SQL_BATCH_FETCH: u8 = 24;

    pub const REQ_SELECT_COUNT: u8 = 13;
    pub const REQ_INSERT_COUNT: u8 = 14;
    pub const REQ_UPDATE_COUNT: u8 = 15;
    pub const REQ_DELETE_COUNT: u8 = 16;

    pub const FIREBIRD_VERSION: u8 = 103;

    pub const SVC_SERVER_VERSION: u8 = 55;
    pub const SVC_IMPLEMENTATION: u8 = 56;
    pub const SVC_LINE: u8 = 62;
    pub const SVC_TO_EOF: u8 = 63;
    pub const SVC_TIMEOUT: u8 = 64;
    pub const SVC_RUNNING: u8 = 67;
}

pub mod tpb {
    pub const VERSION3: u8 = 3;
    pub const CONSISTENCY: u8 = 1;
    pub const CONCURRENCY: u8 = 2;
    pub const WAIT: u8 = 6;
    pub const NOWAIT: u8 = 7;
    pub const READ: u8 = 8;
    pub const WRITE: u8 = 9;
    pub const READ_COMMITTED: u8 = 15;
    pub const REC_VERSION: u8 = 17;
    pub const NO_REC_VERSION: u8 = 18;
    pub const LOCK_TIMEOUT: u8 = 21;
}

pub mod dpb {
    pub const VERSION1: u8 = 1;
    pub const PAGE_SIZE: u8 = 4;
    pub const FORCE_WRITE: u8 = 24;
    pub const USER_NAME: u8 = 28;
    pub const PASSWORD: u8 = 29;
    pub const LC_CTYPE: u8 = 48;
    pub const OVERWRITE: u8 = 54;
    pub const SQL_ROLE_NAME: u8 = 60;
    pub const SQL_DIALECT: u8 = 63;
    pub const SET_DB_CHARSET: u8 = 68;
    pub const PROCESS_ID: u8 = 71;
    pub const PROCESS_NAME: u8 = 74;
    pub const UTF8_FILENAME: u8 = 77;
    pub const SPECIFIC_AUTH_DATA: u8 = 84;
    pub const AUTH_PLUGIN_LIST: u8 = 85;
    pub const AUTH_PLUGIN_NAME: u8 = 86;
    pub const SESSION_TIME_ZONE: u8 = 91;
}

pub mod spb {
    pub const VERSION: u8 = 2;
    pub const CURRENT_VERSION: u8 = 2;
    pub const USER_NAME: u8 = 28;
    pub const PASSWORD: u8 = 29;
    pub const DUMMY_PACKET_INTERVAL: u8 = 58;
    pub const SQL_ROLE_NAME: u8 = 60;
    pub const SPECIFIC_AUTH_DATA: u8 = 84;
}

/// Status vector argument tags.
pub mod arg {
    pub const END: u32 = 0;
    pub const GDS: u32 = 1;
    pub const STRING: u32 = 2;
    pub const CSTRING: u32 = 3;
    pub const NUMBER: u32 = 4;
    pub const INTERPRETED: u32 = 5;
    pub const WARNING: u32 = 18;
    pub const SQL_STATE: u32 = 19;
}

/// Column wire type codes, nullable bit cleared.
pub mod sql_type {
    pub const VARYING: i32 = 448;
    pub const TEXT: i32 = 452;
    pub const DOUBLE: i32 = 480;
    pub const FLOAT: i32 = 482;
    pub const LONG: i32 = 496;
    pub const SHORT: i32 = 500;
    pub const TIMESTAMP: i32 = 510;
    pub const BLOB: i32 = 520;
    pub const D_FLOAT: i32 = 530;
    pub const ARRAY: i32 = 540;
    pub const QUAD: i32 = 550;
    pub const TIME: i32 = 560;
    pub const DATE: i32 = 570;
    pub const INT64: i32 = 580;
    pub const TIMESTAMP_TZ_EX: i32 = 32748;
    pub const TIME_TZ_EX: i32 = 32750;
    pub const INT128: i32 = 32752;
    pub const TIMESTAMP_TZ: i32 = 32754;
    pub const TIME_TZ: i32 = 32756;
    pub const DEC_FIXED: i32 = 32758;
    pub const DEC64: i32 = 32760;
    pub const DEC128: i32 = 32762;
    pub const BOOLEAN: i32 = 32764;
    pub const NULL: i32 = 32766;
}

/// Binary language representation codes used in message descriptions.
pub mod blr {
    pub const TEXT: u8 = 14;
    pub const SHORT: u8 = 7;
    pub const LONG: u8 = 8;
    pub const QUAD: u8 = 9;
    pub const FLOAT: u8 = 10;
    pub const D_FLOAT: u8 = 11;
    pub const SQL_DATE: u8 = 12;
    pub const SQL_TIME: u8 = 13;
    pub const INT64: u8 = 16;
    pub const BOOL: u8 = 23;
    pub const DEC64: u8 = 24;
    pub const DEC128: u8 = 25;
    pub const INT128: u8 = 26;
    pub const DOUBLE: u8 = 27;
    pub const SQL_TIME_TZ: u8 = 28;
    pub const TIMESTAMP_TZ: u8 = 29;
    pub const EX_TIME_TZ: u8 = 30;
    pub const EX_TIMESTAMP_TZ: u8 = 31;
    pub const TIMESTAMP: u8 = 35;
    pub const VARYING: u8 = 37;

    pub const VERSION5: u8 = 5;
    pub const BEGIN: u8 = 2;
    pub const MESSAGE: u8 = 4;
    pub const END: u8 = 255;
    pub const EOC: u8 = 76;
}
