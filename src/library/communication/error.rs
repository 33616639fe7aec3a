use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use crate::library::BoxedError;

/// Broad classification of a [`RemoteError`]
///
/// Receivers can not inspect the concrete error type of a remote party, however some
/// conditions require distinct handling (e.g. a capability gap is not a transient failure).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Generic failure while processing a request
    Failure,
    /// The remote party does not implement the requested operation
    Unsupported,
    /// The remote party does not know the requested entity
    NotFound,
}

/// Type erased, serializable error which retains the error chain information
///
/// This error is carried as the `Err(_)` variant of a [`MessageBody`](super::MessageBody)
/// when a remote party reports a failure. While receiving services don't know about
/// the possible types of errors, they can still use this error type to embed in
/// their own errors and display the full chain of causes.
///
/// When the error from which this is created contains another `RemoteError` in its
/// source chain, its causes are integrated so that one nicely formatted chain
/// can be provided at the top-most level.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    kind: RemoteErrorKind,
    causes: Vec<String>,
}

impl RemoteError {
    /// Creates a new failure from any error type
    pub fn new<E: Error + 'static>(e: E) -> Self {
        (&e as &(dyn Error + 'static)).into()
    }

    /// Creates a new failure from a boxed error type
    pub fn from_boxed(e: BoxedError) -> Self {
        (e.as_ref() as &(dyn Error + 'static)).into()
    }

    /// Creates an error from a plain message without any further causes
    pub fn message<S: Into<String>>(kind: RemoteErrorKind, message: S) -> Self {
        Self {
            kind,
            causes: vec![message.into()],
        }
    }

    /// Signals that the named operation is not implemented by the responding party
    pub fn unsupported(operation: &str) -> Self {
        Self::message(
            RemoteErrorKind::Unsupported,
            format!("operation not supported: {}", operation),
        )
    }

    /// Overrides the kind of this error
    pub fn with_kind(mut self, kind: RemoteErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Classification of the error
    pub fn kind(&self) -> RemoteErrorKind {
        self.kind
    }

    /// Textual representation of every error in the original source chain, outermost first
    pub fn causes(&self) -> &[String] {
        &self.causes
    }
}

impl Error for RemoteError {}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut causes = self.causes.iter();

        match causes.next() {
            Some(first) => write!(f, "{}", first)?,
            None => return write!(f, "unknown remote error"),
        }

        for cause in causes {
            write!(f, ": {}", cause)?;
        }

        Ok(())
    }
}

impl From<&(dyn Error + 'static)> for RemoteError {
    fn from(e: &(dyn Error + 'static)) -> Self {
        let mut source: Option<&(dyn Error + 'static)> = Some(e);
        let mut causes: Vec<String> = Vec::new();
        let mut kind = RemoteErrorKind::Failure;

        while let Some(error) = source {
            // Integrate nested remote errors (and their kind) and use ToString for anything else
            if let Some(remote) = error.downcast_ref::<RemoteError>() {
                causes.extend(remote.causes.iter().cloned());
                if kind == RemoteErrorKind::Failure {
                    kind = remote.kind;
                }
            } else {
                causes.push(error.to_string());
            }

            source = error.source();
        }

        Self { kind, causes }
    }
}
