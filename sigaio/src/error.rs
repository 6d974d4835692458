use std::io;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub(crate) struct SubmitError {
    kind: SubmitErrorKind,
}

impl SubmitError {
    pub(crate) fn invalid(reason: &'static str) -> Self {
        Self {
            kind: SubmitErrorKind::Invalid(reason),
        }
    }

    pub(crate) fn shutting_down() -> Self {
        Self {
            kind: SubmitErrorKind::ShuttingDown,
        }
    }

    pub(crate) fn rejected(err: io::Error) -> Self {
        Self {
            kind: SubmitErrorKind::Rejected(err),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum SubmitErrorKind {
    #[error("invalid request: {0}")]
    Invalid(&'static str),
    #[error("bridge is shutting down")]
    ShuttingDown,
    #[error("aio submission failed: {0}")]
    Rejected(#[source] io::Error),
}

impl From<SubmitError> for io::Error {
    fn from(value: SubmitError) -> Self {
        match value.kind {
            SubmitErrorKind::Invalid(_) => io::Error::new(io::ErrorKind::InvalidInput, value),
            SubmitErrorKind::ShuttingDown => io::Error::new(io::ErrorKind::Other, value),
            // Keep the facility's errno observable to the caller.
            SubmitErrorKind::Rejected(err) => match err.raw_os_error() {
                Some(code) => io::Error::from_raw_os_error(code),
                None => err,
            },
        }
    }
}
