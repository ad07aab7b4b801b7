use std::fmt;
use std::time::Duration;

use tower_lsp::lsp_types::Diagnostic;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    // The prover rejected an inserted step. Carries the error diagnostics
    // it reported for the candidate text.
    InvalidAdd(Vec<Diagnostic>),

    // The prover rejected a deletion, usually because a surviving step
    // depended on the deleted one.
    InvalidDelete(Vec<Diagnostic>),

    // The file was already invalid when it was opened, so there is no
    // consistent baseline to edit against.
    InvalidFile,

    // The request asks for something the engine does not support, like
    // splicing a step across a proof boundary. Nothing was changed.
    Unsupported(String),

    // A notation pattern matched no declaration in scope.
    NotationNotFound(String),

    // The prover did not answer within the configured window.
    Timeout(Duration),

    // The transport layer reported a failure of its own.
    Client(String),

    // A rollback re-submission failed, so the in-memory model and the
    // prover can no longer be assumed to agree.
    Desync(String),

    Io(std::io::Error),
}

impl Error {
    pub fn unsupported<T: Into<String>>(s: T) -> Error {
        Error::Unsupported(s.into())
    }

    pub fn client<T: Into<String>>(s: T) -> Error {
        Error::Client(s.into())
    }

    pub fn desync<T: Into<String>>(s: T) -> Error {
        Error::Desync(s.into())
    }

    pub fn notation_not_found(pattern: &str, scope: &str) -> Error {
        if scope.is_empty() {
            Error::NotationNotFound(pattern.to_string())
        } else {
            Error::NotationNotFound(format!("{} : {}", pattern, scope))
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Error::InvalidAdd(_) => "InvalidAdd",
            Error::InvalidDelete(_) => "InvalidDelete",
            Error::InvalidFile => "InvalidFile",
            Error::Unsupported(_) => "Unsupported",
            Error::NotationNotFound(_) => "NotationNotFound",
            Error::Timeout(_) => "Timeout",
            Error::Client(_) => "Client",
            Error::Desync(_) => "Desync",
            Error::Io(_) => "Io",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidAdd(diagnostics) => {
                write!(f, "the prover rejected the added step")?;
                if let Some(first) = diagnostics.first() {
                    write!(f, ": {}", first.message)?;
                }
                Ok(())
            }
            Error::InvalidDelete(diagnostics) => {
                write!(f, "the prover rejected the deletion")?;
                if let Some(first) = diagnostics.first() {
                    write!(f, ": {}", first.message)?;
                }
                Ok(())
            }
            Error::InvalidFile => {
                write!(f, "the file is invalid, so it cannot be edited")
            }
            Error::Unsupported(s) => write!(f, "unsupported operation: {}", s),
            Error::NotationNotFound(s) => write!(f, "notation not found: {}", s),
            Error::Timeout(limit) => {
                write!(f, "the prover did not answer within {:?}", limit)
            }
            Error::Client(s) => write!(f, "client error: {}", s),
            Error::Desync(s) => write!(f, "desynchronized from the prover: {}", s),
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
