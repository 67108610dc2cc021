//! Protocol error
use std::{borrow::Cow, fmt};

use super::op;

/// An error when translating buffer from the server.
///
/// Wire position is unrecoverable after this error, the connection should be
/// discarded.
pub enum ProtocolError {
    /// Message with unexpected opcode.
    Unexpected {
        expect: Option<u32>,
        found: u32,
        phase: Option<&'static str>,
    },
    /// Buffer content does not match its declared layout.
    Malformed(Cow<'static, str>),
    /// Column wire type that cannot be decoded.
    UnsupportedType(i32),
    /// Server asked for a wire crypt plugin we do not implement.
    UnknownCipher(String),
}

impl ProtocolError {
    pub(crate) fn unexpected(expect: u32, found: u32) -> ProtocolError {
        Self::Unexpected { expect: Some(expect), found, phase: None }
    }

    pub(crate) fn unexpected_phase(found: u32, phase: &'static str) -> ProtocolError {
        Self::Unexpected { expect: None, found, phase: Some(phase) }
    }

    pub(crate) fn malformed(reason: impl Into<Cow<'static, str>>) -> ProtocolError {
        Self::Malformed(reason.into())
    }
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Unexpected { expect, found, phase } => {
                let found_name = op::name(*found);
                match expect {
                    Some(m) => write!(
                        f,
                        "Expected message `{}` found `{found_name}` ({found})",
                        op::name(*m),
                    )?,
                    None => write!(f, "Unexpected message `{found_name}` ({found})")?,
                }
                if let Some(phase) = phase {
                    write!(f, " in `{phase}`")?
                }
                Ok(())
            },
            ProtocolError::Malformed(reason) => write!(f, "malformed message: {reason}"),
            ProtocolError::UnsupportedType(ty) => write!(f, "unsupported column type: {ty}"),
            ProtocolError::UnknownCipher(name) => {
                write!(f, "Unknown wire encrypto plugin name: {name:?}")
            },
        }
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
