//! SQL injection guards for scadasim-rdbc.
//!
//! Identifiers are always quoted by the dialect and values are always bound
//! parameters. Two places still need extra care:
//! - Table names arrive from the command line and are checked before any
//!   statement is built from them
//! - `DBCC CHECKIDENT` takes the table name as a string literal, which cannot
//!   be bound as a parameter

use crate::error::Error;

/// Longest identifier any supported backend accepts (SQL Server `sysname`).
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Validate a user-supplied table name.
///
/// Any character a dialect can quote is allowed, including the quote
/// characters themselves. Rejected:
/// - Empty or all-whitespace names
/// - Names longer than [`MAX_IDENTIFIER_LEN`] characters
/// - Names containing NUL or other control characters
///
/// # Examples
///
/// ```
/// use scadasim_rdbc::security::validate_table_name;
///
/// assert!(validate_table_name("ANA").is_ok());
/// assert!(validate_table_name("odd\"name").is_ok());
/// assert!(validate_table_name("weird]name").is_ok());
///
/// assert!(validate_table_name("").is_err());
/// assert!(validate_table_name("x\0").is_err());
/// ```
pub fn validate_table_name(name: &str) -> crate::Result<()> {
    if name.trim().is_empty() {
        return Err(Error::config("table name cannot be empty"));
    }

    let len = name.chars().count();
    if len > MAX_IDENTIFIER_LEN {
        return Err(Error::config(format!(
            "table name too long: {} chars (max {})",
            len, MAX_IDENTIFIER_LEN
        )));
    }

    if let Some(c) = name.chars().find(|c| c.is_control()) {
        return Err(Error::config(format!(
            "invalid table name {:?}: contains control character {:?}",
            name, c
        )));
    }

    Ok(())
}

/// Escape a string value for interpolation into a single-quoted SQL literal.
///
/// Replaces `'` with `''`. Only used where the statement grammar has no slot
/// for a bound parameter.
///
/// # Examples
///
/// ```
/// use scadasim_rdbc::security::escape_string_literal;
///
/// assert_eq!(escape_string_literal("ANA"), "ANA");
/// assert_eq!(escape_string_literal("don't"), "don''t");
/// ```
pub fn escape_string_literal(value: &str) -> String {
    // Fast path: no escaping needed (common case)
    if !value.contains('\'') {
        return value.to_string();
    }
    value.replace('\'', "''")
}
