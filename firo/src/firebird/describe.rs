//! Statement describe buffers.
//!
//! Prepare asks the server for the statement kind and one descriptor per
//! output column. The answer is a self describing info buffer, when it does
//! not fit the requested buffer length the server ends it with
//! [`info::TRUNCATED`] and the client asks again starting from the last
//! column it saw.
use bytes::Bytes;

use super::{
    ProtocolError,
    consts::{info, sql_type},
    pb::ParamReader,
};

/// Info items describing every output column.
pub const DESCRIBE_VARS: &[u8] = &[
    info::SQL_SELECT,
    info::SQL_DESCRIBE_VARS,
    info::SQL_SQLDA_SEQ,
    info::SQL_TYPE,
    info::SQL_SUB_TYPE,
    info::SQL_SCALE,
    info::SQL_LENGTH,
    info::SQL_NULL_IND,
    info::SQL_FIELD,
    info::SQL_RELATION,
    info::SQL_OWNER,
    info::SQL_ALIAS,
    info::SQL_DESCRIBE_END,
];

/// Info items sent with prepare.
pub fn prepare_items() -> Vec<u8> {
    let mut items = Vec::with_capacity(DESCRIBE_VARS.len() + 1);
    items.push(info::SQL_STMT_TYPE);
    items.extend_from_slice(DESCRIBE_VARS);
    items
}

/// Info items continuing a truncated describe from column `index`, 1 based.
pub fn continuation_items(index: u16) -> Vec<u8> {
    let mut items = Vec::with_capacity(DESCRIBE_VARS.len() + 4);
    items.push(info::SQL_SQLDA_START);
    items.push(2);
    items.extend_from_slice(&index.to_le_bytes());
    items.extend_from_slice(DESCRIBE_VARS);
    items
}

/// Statement kind reported by prepare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    GetSegment,
    PutSegment,
    ExecProcedure,
    StartTransaction,
    Commit,
    Rollback,
    SelectForUpdate,
    SetGenerator,
    Savepoint,
    Unknown(i32),
}

impl StatementKind {
    pub fn from_code(code: i32) -> StatementKind {
        match code {
            1 => Self::Select,
            2 => Self::Insert,
            3 => Self::Update,
            4 => Self::Delete,
            5 => Self::Ddl,
            6 => Self::GetSegment,
            7 => Self::PutSegment,
            8 => Self::ExecProcedure,
            9 => Self::StartTransaction,
            10 => Self::Commit,
            11 => Self::Rollback,
            12 => Self::SelectForUpdate,
            13 => Self::SetGenerator,
            14 => Self::Savepoint,
            code => Self::Unknown(code),
        }
    }

    /// Returns `true` if the statement opens a cursor.
    pub fn has_cursor(self) -> bool {
        matches!(self, Self::Select | Self::SelectForUpdate)
    }
}

/// Size of a column value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireLength {
    Fixed(usize),
    /// 4 byte length prefix followed by the value.
    Varying,
}

/// Column descriptor, immutable after prepare.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptor {
    pub sql_type: i32,
    pub sub_type: i32,
    pub scale: i32,
    pub length: i32,
    pub nullable: bool,
    pub field: String,
    pub relation: String,
    pub owner: String,
    pub alias: String,
}

impl Descriptor {
    /// Column label, the alias when present.
    pub fn name(&self) -> &str {
        match self.alias.is_empty() {
            true => &self.field,
            false => &self.alias,
        }
    }

    pub fn wire_length(&self) -> Result<WireLength, ProtocolError> {
        use sql_type::*;
        let len = match self.sql_type {
            VARYING => return Ok(WireLength::Varying),
            TEXT => self.length.max(0) as usize,
            SHORT | LONG | FLOAT | TIME | DATE => 4,
            DOUBLE | D_FLOAT | TIMESTAMP | BLOB | ARRAY | QUAD | INT64 | DEC64 => 8,
            INT128 | DEC128 | DEC_FIXED => 16,
            TIME_TZ => 6,
            TIME_TZ_EX => 8,
            TIMESTAMP_TZ => 10,
            TIMESTAMP_TZ_EX => 12,
            BOOLEAN => 1,
            NULL => 0,
            other => return Err(ProtocolError::UnsupportedType(other)),
        };
        Ok(WireLength::Fixed(len))
    }
}

/// Parsed prepare response.
#[derive(Debug)]
pub struct Described {
    pub kind: StatementKind,
    pub columns: Vec<Descriptor>,
    /// Column index to continue from when the buffer was truncated.
    pub truncated_at: Option<u16>,
}

/// Parse the info buffer returned by prepare.
pub fn parse_prepare(buf: Bytes) -> Result<Described, ProtocolError> {
    let mut r = ParamReader::new(buf);
    let mut kind = StatementKind::Unknown(0);
    let mut columns = Vec::new();
    let mut truncated_at = None;

    while let Some(tag) = r.next_tag() {
        match tag {
            info::SQL_STMT_TYPE => kind = StatementKind::from_code(r.get_int()? as i32),
            info::SQL_SELECT => {
                let count = select_header(&mut r)?;
                columns = vec![Descriptor::default(); count];
                truncated_at = parse_items(&mut r, &mut columns)?;
                if truncated_at.is_some() {
                    break;
                }
            },
            info::END => break,
            tag => return Err(ProtocolError::malformed(format!("unknown describe item {tag}"))),
        }
    }

    Ok(Described { kind, columns, truncated_at })
}

/// Parse a continuation buffer into the already allocated `columns`.
///
/// Returns the next index when the server truncated again.
pub fn parse_continuation(
    buf: Bytes,
    columns: &mut [Descriptor],
) -> Result<Option<u16>, ProtocolError> {
    let mut r = ParamReader::new(buf);
    match r.next_tag() {
        Some(info::SQL_SELECT) => { },
        _ => return Err(ProtocolError::malformed("describe continuation without select block")),
    }
    let count = select_header(&mut r)?;
    if count != columns.len() {
        return Err(ProtocolError::malformed("describe continuation column count changed"));
    }
    parse_items(&mut r, columns)
}

fn select_header(r: &mut ParamReader) -> Result<usize, ProtocolError> {
    if r.next_tag() != Some(info::SQL_DESCRIBE_VARS) {
        return Err(ProtocolError::malformed("select block without describe vars"));
    }
    let count = r.get_int()?;
    usize::try_from(count).map_err(|_| ProtocolError::malformed("negative column count"))
}

fn parse_items(
    r: &mut ParamReader,
    columns: &mut [Descriptor],
) -> Result<Option<u16>, ProtocolError> {
    let mut index = 0usize;

    macro_rules! column {
        () => {
            match index.checked_sub(1).and_then(|i| columns.get_mut(i)) {
                Some(col) => col,
                None => return Err(ProtocolError::malformed("describe item outside column range")),
            }
        };
    }

    loop {
        let Some(tag) = r.next_tag() else {
            return Err(ProtocolError::malformed("describe buffer without end"));
        };
        match tag {
            info::SQL_SQLDA_SEQ => index = r.get_int()? as usize,
            info::SQL_TYPE => column!().sql_type = (r.get_int()? as i32) & !1,
            info::SQL_SUB_TYPE => column!().sub_type = r.get_int()? as i32,
            info::SQL_SCALE => column!().scale = r.get_int()? as i32,
            info::SQL_LENGTH => column!().length = r.get_int()? as i32,
            info::SQL_NULL_IND => column!().nullable = r.get_int()? != 0,
            info::SQL_FIELD => column!().field = r.get_string()?,
            info::SQL_RELATION => column!().relation = r.get_string()?,
            info::SQL_OWNER => column!().owner = r.get_string()?,
            info::SQL_ALIAS => column!().alias = r.get_string()?,
            info::SQL_DESCRIBE_END => { },
            info::TRUNCATED => {
                // the partially described column is requested again
                return Ok(Some(index.max(1) as u16));
            },
            info::END => return Ok(None),
            tag => return Err(ProtocolError::malformed(format!("unknown describe item {tag}"))),
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;

    /// Server side describe buffer builder.
    pub(crate) struct DescribeWriter(pub BytesMut);

    impl DescribeWriter {
        pub(crate) fn new() -> Self {
            Self(BytesMut::new())
        }

        pub(crate) fn int(&mut self, tag: u8, value: i32) -> &mut Self {
            self.0.put_u8(tag);
            self.0.put_u16_le(4);
            self.0.put_i32_le(value);
            self
        }

        pub(crate) fn str(&mut self, tag: u8, value: &str) -> &mut Self {
            self.0.put_u8(tag);
            self.0.put_u16_le(value.len() as u16);
            self.0.put_slice(value.as_bytes());
            self
        }

        pub(crate) fn tag(&mut self, tag: u8) -> &mut Self {
            self.0.put_u8(tag);
            self
        }

        pub(crate) fn select(&mut self, count: i32) -> &mut Self {
            self.tag(info::SQL_SELECT);
            self.int(info::SQL_DESCRIBE_VARS, count)
        }

        pub(crate) fn column(&mut self, seq: i32, ty: i32, len: i32, name: &str) -> &mut Self {
            self.int(info::SQL_SQLDA_SEQ, seq)
                .int(info::SQL_TYPE, ty | 1)
                .int(info::SQL_SUB_TYPE, 0)
                .int(info::SQL_SCALE, 0)
                .int(info::SQL_LENGTH, len)
                .int(info::SQL_NULL_IND, 1)
                .str(info::SQL_FIELD, name)
                .str(info::SQL_RELATION, "T")
                .str(info::SQL_OWNER, "SYSDBA")
                .str(info::SQL_ALIAS, name)
                .tag(info::SQL_DESCRIBE_END)
        }

        pub(crate) fn freeze(&mut self) -> Bytes {
            std::mem::take(&mut self.0).freeze()
        }
    }

    #[test]
    fn describe_two_columns() {
        let buf = DescribeWriter::new()
            .int(info::SQL_STMT_TYPE, 1)
            .select(2)
            .column(1, sql_type::LONG, 4, "A")
            .column(2, sql_type::VARYING, 10, "B")
            .tag(info::END)
            .freeze();

        let d = parse_prepare(buf).unwrap();
        assert_eq!(d.kind, StatementKind::Select);
        assert_eq!(d.truncated_at, None);
        assert_eq!(d.columns.len(), 2);
        assert_eq!(d.columns[0].sql_type, sql_type::LONG);
        assert!(d.columns[0].nullable);
        assert_eq!(d.columns[1].name(), "B");
        assert_eq!(d.columns[1].relation, "T");
        assert_eq!(d.columns[1].wire_length().unwrap(), WireLength::Varying);
    }

    #[test]
    fn truncated_describe_resumes_into_same_array() {
        let first = DescribeWriter::new()
            .int(info::SQL_STMT_TYPE, 1)
            .select(3)
            .column(1, sql_type::LONG, 4, "A")
            .int(info::SQL_SQLDA_SEQ, 2)
            .int(info::SQL_TYPE, sql_type::TEXT)
            .tag(info::TRUNCATED)
            .freeze();

        let mut d = parse_prepare(first).unwrap();
        assert_eq!(d.truncated_at, Some(2));

        let second = DescribeWriter::new()
            .select(3)
            .column(2, sql_type::TEXT, 1, "B")
            .column(3, sql_type::INT64, 8, "C")
            .tag(info::END)
            .freeze();

        let next = parse_continuation(second, &mut d.columns).unwrap();
        assert_eq!(next, None);
        assert_eq!(d.columns.len(), 3);
        let names: Vec<_> = d.columns.iter().map(Descriptor::name).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(d.columns[1].length, 1);
        assert_eq!(d.columns[2].sql_type, sql_type::INT64);
    }

    #[test]
    fn continuation_items_layout() {
        let items = continuation_items(0x0102);
        assert_eq!(&items[..4], &[info::SQL_SQLDA_START, 2, 0x02, 0x01]);
        assert_eq!(&items[4..], DESCRIBE_VARS);
    }

    #[test]
    fn item_outside_range_is_error() {
        let buf = DescribeWriter::new()
            .select(1)
            .column(2, sql_type::LONG, 4, "A")
            .tag(info::END)
            .freeze();
        assert!(parse_prepare(buf).is_err());
    }

    #[test]
    fn no_select_block_for_insert() {
        let buf = DescribeWriter::new()
            .int(info::SQL_STMT_TYPE, 2)
            .select(0)
            .tag(info::END)
            .freeze();
        let d = parse_prepare(buf).unwrap();
        assert_eq!(d.kind, StatementKind::Insert);
        assert!(d.columns.is_empty());
    }
}
