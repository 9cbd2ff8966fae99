//! WS-Security envelope processor for the Pasarela SOAP gateway.
//!
//! Implements the one message-security profile the gateway's parser
//! accepts: UsernameToken authentication, XML digital signature with
//! exclusive canonicalization over designated fragments, and hybrid
//! (RSA-wrapped symmetric) encryption of the Body content — in both the
//! outbound (secure-and-send) and inbound (verify-and-decrypt)
//! directions.
//!
//! # Features
//!
//! - Base envelope construction around a business payload
//! - UsernameToken with fresh nonce and UTC timestamp
//! - RSA-SHA1 signature, per-reference canonicalization prefix lists,
//!   issuer+serial certificate references
//! - Session-key encryption of the Body (EncryptedData of type Content),
//!   session key wrapped under the peer certificate
//! - Strict security-header ordering (EncryptedKey first)
//! - Inbound verification before decryption, typed field extraction
//!
//! # Example
//!
//! ```ignore
//! use pasarela_wsse::{load_credential, SecureEnvelopeProcessor, SecurityProfile};
//!
//! let credential = load_credential(&paths, "col-158", "secret")?;
//! let processor = SecureEnvelopeProcessor::new(SecurityProfile::default());
//! let mut rng = rand::rngs::OsRng;
//! let request = processor.secure(payload, "GetSession", &credential, &mut rng)?;
//! let (status, body) = transport.post_envelope(url, &request.body, &request.headers)?;
//! let session_id = processor.process_response(status, &body, &credential, "sesionId")?;
//! ```

pub mod c14n;
pub mod config;
pub mod credential;
pub mod dom;
pub mod encryption;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod ns;
pub mod processor;
pub mod signature;
pub mod token;
pub mod transport;

pub use config::{ClientConfig, SecurityProfile};
pub use credential::{load_credential, Credential};
pub use error::{SecurityError, Stage};
pub use processor::{SecureEnvelopeProcessor, SecuredRequest};
pub use transport::{HttpTransport, Transport};
