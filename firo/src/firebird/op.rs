//! Operation codes, the first word of every message.

macro_rules! opcodes {
    ($($name:ident = $code:literal,)*) => {
        $(pub const $name: u32 = $code;)*

        /// Returns human readable name of an opcode.
        pub fn name(op: u32) -> &'static str {
            match op {
                $($code => stringify!($name),)*
                _ => "unknown",
            }
        }
    };
}

opcodes! {
    CONNECT = 1,
    EXIT = 2,
    ACCEPT = 3,
    REJECT = 4,
    DISCONNECT = 6,
    RESPONSE = 9,
    ATTACH = 19,
    CREATE = 20,
    DETACH = 21,
    TRANSACTION = 29,
    COMMIT = 30,
    ROLLBACK = 31,
    OPEN_BLOB = 35,
    GET_SEGMENT = 36,
    PUT_SEGMENT = 37,
    CLOSE_BLOB = 39,
    INFO_DATABASE = 40,
    INFO_TRANSACTION = 42,
    BATCH_SEGMENTS = 44,
    QUE_EVENTS = 48,
    CANCEL_EVENTS = 49,
    COMMIT_RETAINING = 50,
    EVENT = 52,
    CONNECT_REQUEST = 53,
    OPEN_BLOB2 = 56,
    CREATE_BLOB2 = 57,
    ALLOCATE_STATEMENT = 62,
    EXECUTE = 63,
    EXECUTE_IMMEDIATE = 64,
    FETCH = 65,
    FETCH_RESPONSE = 66,
    FREE_STATEMENT = 67,
    PREPARE_STATEMENT = 68,
    INFO_SQL = 70,
    DUMMY = 71,
    EXECUTE2 = 76,
    SQL_RESPONSE = 78,
    DROP_DATABASE = 81,
    SERVICE_ATTACH = 82,
    SERVICE_DETACH = 83,
    SERVICE_INFO = 84,
    SERVICE_START = 85,
    ROLLBACK_RETAINING = 86,
    CONT_AUTH = 92,
    PING = 93,
    ACCEPT_DATA = 94,
    CRYPT = 96,
    COND_ACCEPT = 98,
}
