//! Firebird wire protocol.
//!
//! Message layouts live in [`frontend`] and [`backend`], the remaining
//! modules hold the constants and sub-formats those messages carry.
pub mod op;
pub mod consts;
pub mod status;
pub mod pb;
pub mod describe;
pub mod blr;
pub mod frontend;
pub mod backend;

mod error;

pub use error::ProtocolError;
pub use status::DatabaseError;
pub use frontend::FrontendProtocol;
