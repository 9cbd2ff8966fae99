//! Error types for the WS-Security envelope processor.

use thiserror::Error;

/// Errors raised by the securing and verification pipelines.
///
/// Every variant maps to exactly one [`Stage`] so callers can tell
/// authentication failures apart from confidentiality failures and from
/// structural (malformed-input) failures. Each pipeline stage fails fast;
/// no partially processed envelope is ever returned alongside an error.
#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("reference URI cannot be resolved: {0}")]
    ReferenceNotFound(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("signature computation error: {0}")]
    SignatureComputation(String),

    #[error("malformed signature structure: {0}")]
    MalformedSignature(String),

    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("session key wrap failed: {0}")]
    KeyWrapFailed(String),

    #[error("session key unwrap failed: {0}")]
    KeyUnwrapFailed(String),

    #[error("symmetric cipher error: {0}")]
    SymmetricCrypto(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// The peer answered with a non-success HTTP status. The raw body is
    /// kept for diagnostics; it is not interpreted further.
    #[error("peer returned HTTP {status}")]
    PeerStatus { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline stage a [`SecurityError`] originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Envelope construction, parsing, canonicalization.
    Structure,
    /// Signature computation or verification.
    Signature,
    /// Key wrapping and body encryption/decryption.
    Encryption,
    /// Credential loading and certificate parsing.
    Credential,
    /// HTTP exchange with the peer.
    Transport,
}

impl Stage {
    /// Get the string code for this stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structure => "STRUCTURE",
            Self::Signature => "SIGNATURE",
            Self::Encryption => "ENCRYPTION",
            Self::Credential => "CREDENTIAL",
            Self::Transport => "TRANSPORT",
        }
    }
}

impl SecurityError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::MalformedInput(_) | Self::Canonicalization(_) => Stage::Structure,
            Self::ReferenceNotFound(_)
            | Self::SignatureComputation(_)
            | Self::MalformedSignature(_)
            | Self::SignatureInvalid(_) => Stage::Signature,
            Self::KeyWrapFailed(_)
            | Self::KeyUnwrapFailed(_)
            | Self::SymmetricCrypto(_)
            | Self::DecryptionFailed(_)
            | Self::UnsupportedAlgorithm(_) => Stage::Encryption,
            Self::Credential(_) | Self::Io(_) => Stage::Credential,
            Self::Transport(_) | Self::PeerStatus { .. } => Stage::Transport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_as_str() {
        assert_eq!(Stage::Signature.as_str(), "SIGNATURE");
        assert_eq!(Stage::Encryption.as_str(), "ENCRYPTION");
    }

    #[test]
    fn test_error_stage_mapping() {
        assert_eq!(
            SecurityError::MalformedInput("x".into()).stage(),
            Stage::Structure
        );
        assert_eq!(
            SecurityError::SignatureInvalid("x".into()).stage(),
            Stage::Signature
        );
        assert_eq!(
            SecurityError::DecryptionFailed("x".into()).stage(),
            Stage::Encryption
        );
        assert_eq!(
            SecurityError::PeerStatus {
                status: 500,
                body: String::new()
            }
            .stage(),
            Stage::Transport
        );
    }
}
