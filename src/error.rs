use std::time::Duration;

use snafu::Snafu;

use crate::{generator::GeneratorError, kubernetes::ClientError, validation::ValidationErrors};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Classification the reconcile engine uses to decide between status conditions, requeues and
/// propagation to the controller framework.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The forwarder spec is ill-formed. Reported as `Invalid`, never requeued.
    Validation,
    /// Optimistic-lock collision on a write.
    Conflict,
    /// A referenced object is missing.
    NotFound,
    /// Any other cluster API failure.
    Transient,
    /// A broken internal invariant.
    Fatal,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("invalid forwarder spec: {}", source))]
    Invalid { source: ValidationErrors },

    #[snafu(display("failed to generate collector config: {}", source))]
    Generate { source: GeneratorError },

    #[snafu(display("{} {}: {}", action, object, source))]
    Client {
        action: &'static str,
        object: String,
        source: ClientError,
    },

    #[snafu(display("object is missing required field {}", field))]
    MissingObjectKey { field: &'static str },

    #[snafu(display("reconcile cancelled before {}", step))]
    Cancelled { step: String },

    #[snafu(display("failed to serialize {}: {}", what, source))]
    Serialize {
        what: &'static str,
        source: serde_json::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid { .. } => ErrorKind::Validation,
            Self::Generate { source } if source.is_user_error() => ErrorKind::Validation,
            Self::Generate { .. } => ErrorKind::Fatal,
            Self::Client { source, .. } => source.kind(),
            Self::MissingObjectKey { .. } | Self::Serialize { .. } => ErrorKind::Fatal,
            Self::Cancelled { .. } => ErrorKind::Transient,
        }
    }

    /// How long the controller should wait before retrying after this error, if at all.
    pub fn requeue_after(&self) -> Option<Duration> {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::Fatal => None,
            ErrorKind::Conflict => Some(Duration::from_secs(1)),
            ErrorKind::NotFound => Some(Duration::from_secs(30)),
            ErrorKind::Transient => Some(Duration::from_secs(10)),
        }
    }
}
