//! Status vector translation.
//!
//! A status vector is a sequence of tagged words terminated by
//! [`arg::END`][super::consts::arg::END]. Each gds code opens a message taken
//! from the static message table, the following numeric and string arguments
//! fill its `@1`, `@2`, ... placeholders in order.
use std::fmt;

/// `isc_sqlerr`, its numeric argument is the SQL code.
pub const ISC_SQLERR: u32 = 335544436;
/// Violation of PRIMARY or UNIQUE KEY constraint.
pub const ISC_UNIQUE_KEY_VIOLATION: u32 = 335544665;
/// Violation of FOREIGN KEY constraint.
pub const ISC_FOREIGN_KEY: u32 = 335544466;
/// Violation of CHECK constraint.
pub const ISC_CHECK_CONSTRAINT: u32 = 335544558;

// sorted by code
static MESSAGES: &[(u32, &str)] = &[
    (335544321, "arithmetic exception, numeric overflow, or string truncation"),
    (335544334, "conversion error from string \"@1\""),
    (335544336, "deadlock"),
    (335544344, "I/O error during \"@1\" operation for file \"@2\""),
    (335544345, "lock conflict on no wait transaction"),
    (335544347, "validation error for column @1, value \"@2\""),
    (335544349, "attempt to store duplicate value (visible to active transactions) in unique index \"@1\""),
    (335544351, "unsuccessful metadata update"),
    (335544352, "no permission for @1 access to @2 @3"),
    (335544375, "unavailable database"),
    (335544436, "SQL error code = @1"),
    (335544466, "violation of FOREIGN KEY constraint \"@1\" on table \"@2\""),
    (335544472, "Your user name and password are not defined. Ask your database administrator to set up a Firebird login."),
    (335544510, "lock time-out on wait transaction"),
    (335544517, "exception @1"),
    (335544558, "Operation violates CHECK constraint @1 on view or table @2"),
    (335544569, "Dynamic SQL Error"),
    (335544578, "Column unknown"),
    (335544580, "Table unknown"),
    (335544634, "Token unknown - line @1, column @2"),
    (335544665, "violation of PRIMARY or UNIQUE KEY constraint \"@1\" on table \"@2\""),
    (335544721, "Unable to complete network request to host \"@1\"."),
    (335544838, "Foreign key reference target does not exist"),
    (335544839, "Foreign key references are present for the record"),
    (335545106, "Error occurred during login, please check server firebird.log for details"),
];

/// Returns the message template of a gds code.
pub fn message(code: u32) -> Option<&'static str> {
    MESSAGES
        .binary_search_by_key(&code, |(c, _)| *c)
        .ok()
        .map(|i| MESSAGES[i].1)
}

/// Error reported by the server.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseError {
    codes: Vec<u32>,
    sql_code: i32,
    sql_state: Option<String>,
    message: String,
}

impl DatabaseError {
    /// Every gds code in the status vector, in order.
    pub fn codes(&self) -> &[u32] {
        &self.codes
    }

    /// Returns `true` if the status vector contains `code`.
    pub fn has_code(&self, code: u32) -> bool {
        self.codes.contains(&code)
    }

    /// SQL code, zero if the server did not send one.
    pub fn sql_code(&self) -> i32 {
        self.sql_code
    }

    /// SQLSTATE, only sent by newer servers.
    pub fn sql_state(&self) -> Option<&str> {
        self.sql_state.as_deref()
    }

    /// Formatted message.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_unique_violation(&self) -> bool {
        self.has_code(ISC_UNIQUE_KEY_VIOLATION)
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        self.has_code(ISC_FOREIGN_KEY)
    }

    pub fn is_check_violation(&self) -> bool {
        self.has_code(ISC_CHECK_CONSTRAINT)
    }
}

impl std::error::Error for DatabaseError { }

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(state) = &self.sql_state {
            write!(f, " (SQLSTATE {state})")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseError")
            .field("codes", &self.codes)
            .field("sql_code", &self.sql_code)
            .field("message", &self.message)
            .finish()
    }
}

/// Accumulates status vector entries in wire order.
#[derive(Debug, Default)]
pub struct StatusBuilder {
    codes: Vec<u32>,
    last_code: u32,
    sql_code: i32,
    sql_state: Option<String>,
    lines: Vec<String>,
    num_arg: usize,
    warning: bool,
}

impl StatusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gds(&mut self, code: u32) {
        self.warning = false;
        if code == 0 {
            return;
        }
        self.codes.push(code);
        self.last_code = code;
        self.num_arg = 0;
        self.lines.push(match message(code) {
            Some(msg) => msg.to_owned(),
            None => format!("gds code {code}"),
        });
    }

    /// Warnings do not fail the request, their arguments are skipped.
    pub fn warning(&mut self, _code: u32) {
        self.warning = true;
    }

    pub fn number(&mut self, num: i32) {
        if self.warning {
            return;
        }
        if self.last_code == ISC_SQLERR {
            self.sql_code = num;
        }
        self.substitute(itoa::Buffer::new().format(num));
    }

    pub fn string(&mut self, arg: &str) {
        if self.warning {
            return;
        }
        self.substitute(arg);
    }

    pub fn interpreted(&mut self, text: &str) {
        if self.warning {
            return;
        }
        self.lines.push(text.to_owned());
    }

    pub fn sql_state(&mut self, state: &str) {
        self.sql_state = Some(state.to_owned());
    }

    fn substitute(&mut self, arg: &str) {
        self.num_arg += 1;
        let Some(line) = self.lines.last_mut() else {
            return;
        };
        let mut placeholder = String::from("@");
        placeholder.push_str(itoa::Buffer::new().format(self.num_arg));
        if let Some(at) = line.find(&placeholder) {
            line.replace_range(at..at + placeholder.len(), arg);
        }
    }

    /// Returns [`None`] when the vector carries no error code.
    pub fn finish(self) -> Option<DatabaseError> {
        if self.codes.is_empty() {
            return None;
        }
        Some(DatabaseError {
            codes: self.codes,
            sql_code: self.sql_code,
            sql_state: self.sql_state,
            message: self.lines.join("\n"),
        })
    }
}
