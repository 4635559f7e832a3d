use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_format(element: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: element.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn capacity_exceeded(name: impl Into<String>, limit: usize, requested: usize) -> Error {
        Error(
            ErrorKind::CapacityExceeded {
                name: name.into(),
                limit,
                requested,
            }
            .into(),
        )
    }

    pub fn out_of_bounds(
        element: impl Into<String>,
        position: usize,
        len: usize,
        buffer_len: usize,
    ) -> Error {
        Error(
            ErrorKind::OutOfBounds {
                element: element.into(),
                position,
                len,
                buffer_len,
            }
            .into(),
        )
    }

    pub fn unaligned(element: impl Into<String>, position: usize, alignment: usize) -> Error {
        Error(
            ErrorKind::Unaligned {
                element: element.into(),
                position,
                alignment,
            }
            .into(),
        )
    }

    /// Returns `true` if the error was raised while decoding a malformed buffer,
    /// as opposed to a misuse of the API or a configured limit.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::OutOfBounds { .. }
                | ErrorKind::InvalidFormat { .. }
                | ErrorKind::Unaligned { .. }
                | ErrorKind::InvalidUtf8 { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("capacity exceeded for '{name}': limit {limit}, requested {requested}")]
    CapacityExceeded {
        name: String,
        limit: usize,
        requested: usize,
    },

    #[error(
        "'{element}' is out of bounds: {len} bytes at position {position}, buffer length {buffer_len}"
    )]
    OutOfBounds {
        element: String,
        position: usize,
        len: usize,
        buffer_len: usize,
    },

    #[error("invalid buffer format for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("'{element}' at position {position} is not aligned to {alignment} bytes")]
    Unaligned {
        element: String,
        position: usize,
        alignment: usize,
    },

    #[error("invalid UTF-8 string at position {position}")]
    InvalidUtf8 {
        position: usize,
        source: std::str::Utf8Error,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}
