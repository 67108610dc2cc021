//! Host representation of server values.
//!
//! - [`Decimal`], exact numerics with a power of ten exponent
//! - [`DecFloat`], `DECFLOAT(16)` and `DECFLOAT(34)`
//! - [`datetime`], day count and time of day conversion
//! - [`Charset`], text encoding negotiated with `lc_ctype`
//! - [`timezone`], time zone id resolution
pub mod decimal;
pub mod decfloat;
pub mod datetime;
pub mod charset;
pub mod timezone;

pub use decimal::Decimal;
pub use decfloat::DecFloat;
pub use charset::Charset;
