use crate::he::HeError;
use thiserror::Error;

/// An Error enum capturing the errors produced by the packing and distance
/// layers. None of them are retryable: each one points at an inconsistent
/// configuration or a corrupted payload.
#[derive(Error, Debug)]
pub enum Error {
    /// Template size and packing geometry disagree
    #[error("Layout mismatch: {0}")]
    LayoutMismatch(String),
    /// A broadcast query did not fit into a single strip
    #[error("Query replication spans {strips} strips, expected exactly one")]
    ReplicationOverflow { strips: usize },
    /// Biometric kind outside of {finger, iris}
    #[error("Unsupported biometric modality {0:?}")]
    UnsupportedModality(String),
    /// The enrollment database could not be packed
    #[error("Packing the enrollment database failed: {0}")]
    Packing(#[source] Box<Error>),
    /// A serialized ciphertext could not be decoded
    #[error("Malformed ciphertext: {0}")]
    Codec(String),
    /// Plaintext modulus too small for the worst-case slot magnitude
    #[error("Plaintext modulus {available} lacks headroom, slots may reach {required}")]
    InsufficientHeadroom { required: u128, available: u64 },
    /// The worker pool for per-strip evaluation could not be started
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),
    /// Failure reported by the homomorphic encryption provider
    #[error(transparent)]
    He(#[from] HeError),
}

impl Error {
    pub fn layout(mes: impl Into<String>) -> Self {
        Self::LayoutMismatch(mes.into())
    }

    /// Wraps a packer failure raised while building the encrypted database.
    pub fn packing(err: Error) -> Self {
        match err {
            Error::LayoutMismatch(_) | Error::ReplicationOverflow { .. } => {
                Self::Packing(Box::new(err))
            }
            other => other,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
