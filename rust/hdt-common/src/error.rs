use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Returns `true` if the error indicates malformed input or a corrupted
    /// persisted structure, as opposed to a caller mistake or an I/O failure.
    pub fn is_format_violation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::FormatViolation(_)
                | ErrorKind::InvalidFormat { .. }
                | ErrorKind::ChecksumMismatch { .. }
        )
    }

    /// Returns the format violation carried by this error, if any.
    pub fn format_violation(&self) -> Option<&FormatViolation> {
        match self.kind() {
            ErrorKind::FormatViolation(violation) => Some(violation),
            _ => None,
        }
    }

    pub fn invalid_format(name: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: name.into(),
                message: Default::default(),
            }
            .into(),
        )
    }

    pub fn invalid_format_msg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn checksum_mismatch(element: impl Into<String>) -> Error {
        Error(
            ErrorKind::ChecksumMismatch {
                element: element.into(),
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

    pub fn value_too_large(value: u64, bit_width: u32) -> Error {
        Error(ErrorKind::ValueTooLarge { value, bit_width }.into())
    }

    pub fn out_of_range(index: u64, len: u64) -> Error {
        Error(ErrorKind::OutOfRange { index, len }.into())
    }

    pub fn resource_exhausted(resource: impl Into<String>, requested: u64, limit: u64) -> Error {
        Error(
            ErrorKind::ResourceExhausted {
                resource: resource.into(),
                requested,
                limit,
            }
            .into(),
        )
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    /// I/O-class error raised by this crate family itself (corrupted spool
    /// chunk, missing bucket file and the like) rather than by the OS.
    pub fn io_corrupted(context: impl Into<String>) -> Error {
        let context = context.into();
        let source = std::io::Error::new(std::io::ErrorKind::InvalidData, context.clone());
        Error::io(context, source)
    }

    pub fn codec<E>(context: impl Into<String>, source: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error(
            ErrorKind::Codec {
                context: context.into(),
                source: Box::new(source),
            }
            .into(),
        )
    }
}

/// Structural violations detected while loading or building a triple index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatViolation {
    #[error("triple component is zero at position {position}")]
    ZeroComponent { position: u64 },

    #[error("non-contiguous subject: {found} follows {previous}")]
    NonContiguousSubject { previous: u64, found: u64 },

    #[error("unordered middle level: {found} follows {previous} at position {position}")]
    UnorderedMiddleLevel {
        previous: u64,
        found: u64,
        position: u64,
    },

    #[error("unordered lower level: {found} follows {previous} at position {position}")]
    UnorderedLowerLevel {
        previous: u64,
        found: u64,
        position: u64,
    },

    #[error("non-contiguous object: {found} follows {previous}")]
    NonContiguousObject { previous: u64, found: u64 },

    #[error("control block mismatch for '{field}': expected {expected}, found {found}")]
    ControlMismatch {
        field: String,
        expected: String,
        found: String,
    },
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("value {value} does not fit in {bit_width} bits")]
    ValueTooLarge { value: u64, bit_width: u32 },

    #[error("index {index} is out of range (len {len})")]
    OutOfRange { index: u64, len: u64 },

    #[error("format violation: {0}")]
    FormatViolation(FormatViolation),

    #[error("checksum mismatch for '{element}'")]
    ChecksumMismatch { element: String },

    #[error("invalid storage format for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("IO error for '{context}': {source}'")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("codec error: {context}")]
    Codec {
        context: String,
        source: StdErrorBoxed,
    },

    #[error("{resource} exhausted: requested {requested}, limit {limit}")]
    ResourceExhausted {
        resource: String,
        requested: u64,
        limit: u64,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<FormatViolation> for Error {
    fn from(violation: FormatViolation) -> Self {
        ErrorKind::FormatViolation(violation).into()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(_: std::convert::Infallible) -> Self {
        Error::invalid_operation("conversion")
    }
}
