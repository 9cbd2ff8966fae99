//! Fixed outbound and inbound security pipelines.
//!
//! Outbound: `Plain → TokenAdded → Signed → Encrypted → Finalized`, in
//! that order, unconditionally; finalization serializes the security
//! header with `EncryptedKey` first. Inbound: `Received →
//! SignatureVerified → Decrypted → PayloadExtracted`; verification always
//! precedes decryption (authenticate before exposing plaintext). A
//! failure at any stage aborts the run; no partially processed envelope
//! is ever returned.

use crate::config::SecurityProfile;
use crate::credential::Credential;
use crate::encryption::EncryptionEngine;
use crate::envelope::{Envelope, EnvelopeBuilder, SecurityHeader, SecurityToken};
use crate::error::SecurityError;
use crate::signature::SignatureEngine;
use crate::token::UsernameTokenFactory;
use rand::{CryptoRng, RngCore};
use tracing::debug;

/// Outbound pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundState {
    Plain,
    TokenAdded,
    Signed,
    Encrypted,
    Finalized,
}

impl OutboundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::TokenAdded => "TOKEN_ADDED",
            Self::Signed => "SIGNED",
            Self::Encrypted => "ENCRYPTED",
            Self::Finalized => "FINALIZED",
        }
    }
}

/// Inbound pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundState {
    Received,
    SignatureVerified,
    Decrypted,
    PayloadExtracted,
}

impl InboundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::SignatureVerified => "SIGNATURE_VERIFIED",
            Self::Decrypted => "DECRYPTED",
            Self::PayloadExtracted => "PAYLOAD_EXTRACTED",
        }
    }
}

/// A secured envelope ready for the transport collaborator.
#[derive(Debug, Clone)]
pub struct SecuredRequest {
    /// Serialized envelope bytes
    pub body: Vec<u8>,
    /// HTTP headers to send with it (Content-Type, SOAPAction)
    pub headers: Vec<(String, String)>,
}

/// Orchestrates the engines into the fixed pipelines.
#[derive(Debug, Clone)]
pub struct SecureEnvelopeProcessor {
    builder: EnvelopeBuilder,
    signer: SignatureEngine,
    encryptor: EncryptionEngine,
}

impl SecureEnvelopeProcessor {
    pub fn new(profile: SecurityProfile) -> Self {
        Self {
            builder: EnvelopeBuilder::new(profile.namespaces),
            signer: SignatureEngine::new(profile.signature),
            encryptor: EncryptionEngine::new(profile.encryption),
        }
    }

    /// Run the outbound pipeline over a payload fragment.
    pub fn secure<R: RngCore + CryptoRng>(
        &self,
        payload: &str,
        operation: &str,
        credential: &Credential,
        rng: &mut R,
    ) -> Result<SecuredRequest, SecurityError> {
        let mut state = OutboundState::Plain;
        let mut envelope = self.builder.build(payload, operation)?;
        let mut header = SecurityHeader::new();

        header.push(SecurityToken::UsernameToken(UsernameTokenFactory::create(
            &credential.username,
            &credential.password,
            rng,
        )));
        state = transition_out(state, OutboundState::TokenAdded);

        self.signer.sign(&mut envelope, &mut header, credential, rng)?;
        state = transition_out(state, OutboundState::Signed);

        self.encryptor.encrypt_body(
            &mut envelope,
            &mut header,
            &credential.peer_encryption_cert,
            rng,
        )?;
        state = transition_out(state, OutboundState::Encrypted);

        envelope.attach_security(header.finalize());
        let body = envelope.to_xml().into_bytes();
        transition_out(state, OutboundState::Finalized);

        Ok(SecuredRequest {
            body,
            headers: vec![
                (
                    "Content-Type".to_string(),
                    "text/xml; charset=utf-8".to_string(),
                ),
                ("SOAPAction".to_string(), operation.to_string()),
            ],
        })
    }

    /// Run the inbound pipeline over raw envelope bytes: verify, then
    /// decrypt. Returns the envelope with the plaintext restored under
    /// the Body, plus the decrypted fragment itself.
    pub fn open(
        &self,
        data: &[u8],
        credential: &Credential,
    ) -> Result<(Envelope, String), SecurityError> {
        let mut state = InboundState::Received;
        let mut envelope = Envelope::from_bytes(data)?;

        self.signer.verify(&envelope, &credential.peer_trust_cert)?;
        state = transition_in(state, InboundState::SignatureVerified);

        let plaintext = self
            .encryptor
            .decrypt_body(&mut envelope, &credential.decryption_key)?;
        transition_in(state, InboundState::Decrypted);

        Ok((envelope, plaintext))
    }

    /// Handle a transport response: non-success statuses become a
    /// transport-category error carrying the raw body; success runs the
    /// inbound pipeline and extracts the named business field.
    pub fn process_response(
        &self,
        status: u16,
        body: &[u8],
        credential: &Credential,
        field: &str,
    ) -> Result<String, SecurityError> {
        if !(200..300).contains(&status) {
            return Err(SecurityError::PeerStatus {
                status,
                body: String::from_utf8_lossy(body).into_owned(),
            });
        }

        let (envelope, _) = self.open(body, credential)?;
        let value = envelope
            .body()?
            .find(field)
            .map(|e| e.text())
            .ok_or_else(|| {
                SecurityError::MalformedInput(format!("response field '{}' not found", field))
            })?;
        transition_in(InboundState::Decrypted, InboundState::PayloadExtracted);
        Ok(value)
    }
}

fn transition_out(from: OutboundState, to: OutboundState) -> OutboundState {
    debug!(from = from.as_str(), to = to.as_str(), "outbound transition");
    to
}

fn transition_in(from: InboundState, to: InboundState) -> InboundState {
    debug!(from = from.as_str(), to = to.as_str(), "inbound transition");
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{parse_certificate, parse_private_key};
    use crate::dom::Node;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    const PAYLOAD: &str = "<dto:GetSessionRequest><canal>SP</canal></dto:GetSessionRequest>";

    fn test_credential() -> Credential {
        let signing_key =
            parse_private_key(include_str!("../tests/fixtures/bank_signing_key.pem")).unwrap();
        let signing_cert =
            parse_certificate(include_bytes!("../tests/fixtures/bank_signing_cert.pem")).unwrap();
        let gateway_key =
            parse_private_key(include_str!("../tests/fixtures/gateway_key.pem")).unwrap();
        let gateway_cert =
            parse_certificate(include_bytes!("../tests/fixtures/gateway_cert.pem")).unwrap();
        Credential {
            signing_key,
            signing_cert: signing_cert.clone(),
            decryption_key: gateway_key,
            decryption_cert: gateway_cert.clone(),
            peer_encryption_cert: gateway_cert,
            peer_trust_cert: signing_cert,
            username: "col-158".to_string(),
            password: "secret".to_string(),
        }
    }

    fn processor() -> SecureEnvelopeProcessor {
        SecureEnvelopeProcessor::new(SecurityProfile::default())
    }

    #[test]
    fn test_outbound_header_order_and_headers() {
        let credential = test_credential();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let secured = processor()
            .secure(PAYLOAD, "GetSession", &credential, &mut rng)
            .unwrap();

        assert!(secured
            .headers
            .contains(&("SOAPAction".to_string(), "GetSession".to_string())));
        assert!(secured.headers.iter().any(|(k, v)| {
            k == "Content-Type" && v == "text/xml; charset=utf-8"
        }));

        let envelope = Envelope::from_bytes(&secured.body).unwrap();
        let security = envelope.root.find("Security").unwrap();
        let order: Vec<&str> = security
            .children
            .iter()
            .filter_map(|n| match n {
                Node::Element(e) => Some(e.local.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec!["EncryptedKey", "UsernameToken", "Signature"]);

        let body = envelope.body().unwrap();
        let ed = body.child("EncryptedData").unwrap();
        assert_eq!(
            ed.attribute(None, "Type"),
            Some(crate::ns::XENC_CONTENT)
        );
    }

    #[test]
    fn test_securing_is_not_idempotent() {
        let credential = test_credential();
        let mut rng_a = ChaCha20Rng::seed_from_u64(2);
        let mut rng_b = ChaCha20Rng::seed_from_u64(3);
        let p = processor();
        let a = p.secure(PAYLOAD, "GetSession", &credential, &mut rng_a).unwrap();
        let b = p.secure(PAYLOAD, "GetSession", &credential, &mut rng_b).unwrap();
        assert_ne!(a.body, b.body);
    }

    #[test]
    fn test_malformed_payload_aborts_pipeline() {
        let credential = test_credential();
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let result = processor().secure("<broken", "GetSession", &credential, &mut rng);
        assert!(matches!(result, Err(SecurityError::MalformedInput(_))));
    }

    #[test]
    fn test_non_success_status_is_transport_error() {
        let credential = test_credential();
        let result =
            processor().process_response(500, b"backend exploded", &credential, "sesionId");
        match result {
            Err(SecurityError::PeerStatus { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "backend exploded");
            }
            other => panic!("expected PeerStatus, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_inbound_rejects_garbage() {
        let credential = test_credential();
        let result = processor().process_response(200, b"not xml at all", &credential, "sesionId");
        assert!(matches!(result, Err(SecurityError::MalformedInput(_))));
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(OutboundState::TokenAdded.as_str(), "TOKEN_ADDED");
        assert_eq!(InboundState::SignatureVerified.as_str(), "SIGNATURE_VERIFIED");
    }
}
