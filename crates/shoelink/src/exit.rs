use std::fmt;
use std::io;

use shoelink_peer::GroupError;
use shoelink_transport::ErrorKind;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
/// Some channels succeeded, others did not.
pub const PARTIAL_FAILURE: i32 = 2;
pub const LINK_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const UNAVAILABLE: i32 = 69;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn kind_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NotAvailable => UNAVAILABLE,
        ErrorKind::UserCancelled => FAILURE,
        ErrorKind::LinkError | ErrorKind::NotConnected => LINK_ERROR,
        ErrorKind::Internal => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound => UNAVAILABLE,
        io::ErrorKind::InvalidData => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn group_error(context: &str, err: GroupError) -> CliError {
    let details: Vec<String> = err
        .report
        .failed()
        .iter()
        .map(|(channel, cause)| format!("{channel}: {cause}"))
        .collect();
    let message = if details.is_empty() {
        format!("{context}: {err}")
    } else {
        format!("{context}: {err} ({})", details.join("; "))
    };
    CliError::new(kind_code(err.kind()), message)
}
