//! Credential loading and certificate metadata.
//!
//! All key material arrives through [`load_credential`]; nothing is ever
//! embedded in the binary. The resulting [`Credential`] is immutable and
//! can be shared read-only across any number of concurrent securing or
//! verification runs.

use crate::config::CredentialPaths;
use crate::error::SecurityError;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;

/// Certificate metadata needed by the security header: the issuer name
/// (RFC 2253 form, as it appears in `X509IssuerName`), the decimal serial
/// number, and the RSA public key.
#[derive(Debug, Clone)]
pub struct CertificateRef {
    pub issuer: String,
    pub serial: String,
    pub public_key: RsaPublicKey,
}

/// The full credential bundle for one peer relationship.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Own signing private key
    pub signing_key: RsaPrivateKey,
    /// Own signing certificate, referenced by issuer+serial in KeyInfo
    pub signing_cert: CertificateRef,
    /// Own decryption private key for inbound EncryptedKey unwrapping
    pub decryption_key: RsaPrivateKey,
    /// Own decryption certificate
    pub decryption_cert: CertificateRef,
    /// Peer certificate under which outbound session keys are wrapped
    pub peer_encryption_cert: CertificateRef,
    /// Peer certificate trusted for inbound signature verification
    pub peer_trust_cert: CertificateRef,
    /// UsernameToken username
    pub username: String,
    /// UsernameToken password
    pub password: String,
}

/// Load the credential bundle from PEM files.
pub fn load_credential(
    paths: &CredentialPaths,
    username: &str,
    password: &str,
) -> Result<Credential, SecurityError> {
    Ok(Credential {
        signing_key: load_private_key(&paths.signing_key)?,
        signing_cert: load_certificate(&paths.signing_cert)?,
        decryption_key: load_private_key(&paths.decryption_key)?,
        decryption_cert: load_certificate(&paths.decryption_cert)?,
        peer_encryption_cert: load_certificate(&paths.peer_encryption_cert)?,
        peer_trust_cert: load_certificate(&paths.peer_trust_cert)?,
        username: username.to_string(),
        password: password.to_string(),
    })
}

fn load_private_key(path: &std::path::Path) -> Result<RsaPrivateKey, SecurityError> {
    let pem = std::fs::read_to_string(path)?;
    parse_private_key(&pem)
}

fn load_certificate(path: &std::path::Path) -> Result<CertificateRef, SecurityError> {
    let pem = std::fs::read(path)?;
    parse_certificate(&pem)
}

/// Parse an RSA private key from PEM (PKCS#8 or PKCS#1 encoding).
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, SecurityError> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs1_pem(pem)
        .map_err(|e| SecurityError::Credential(format!("cannot parse private key: {}", e)))
}

/// Parse an X.509 certificate from PEM into a [`CertificateRef`].
pub fn parse_certificate(pem: &[u8]) -> Result<CertificateRef, SecurityError> {
    let (_, parsed) = parse_x509_pem(pem)
        .map_err(|e| SecurityError::Credential(format!("cannot parse certificate PEM: {}", e)))?;
    let cert = parsed
        .parse_x509()
        .map_err(|e| SecurityError::Credential(format!("cannot parse certificate: {}", e)))?;

    let issuer = issuer_rfc2253(cert.issuer())?;
    let serial = cert.tbs_certificate.serial.to_string();

    let spki = cert.public_key();
    let public_key = RsaPublicKey::from_pkcs1_der(spki.subject_public_key.data.as_ref())
        .map_err(|e| {
            SecurityError::Credential(format!("certificate does not hold an RSA key: {}", e))
        })?;

    Ok(CertificateRef {
        issuer,
        serial,
        public_key,
    })
}

/// Render a distinguished name in RFC 2253 form: RDNs most-specific
/// first, comma-joined, no spaces. This is the exact shape the peer puts
/// in `X509IssuerName`.
fn issuer_rfc2253(name: &X509Name) -> Result<String, SecurityError> {
    let mut rdns: Vec<String> = Vec::new();
    for rdn in name.iter_rdn() {
        let mut parts: Vec<String> = Vec::new();
        for attr in rdn.iter() {
            let value = attr.as_str().map_err(|e| {
                SecurityError::Credential(format!("unsupported issuer attribute value: {}", e))
            })?;
            parts.push(format!(
                "{}={}",
                attribute_abbrev(&attr.attr_type().to_id_string()),
                value
            ));
        }
        rdns.push(parts.join("+"));
    }
    rdns.reverse();
    Ok(rdns.join(","))
}

fn attribute_abbrev(oid: &str) -> &str {
    match oid {
        "2.5.4.3" => "CN",
        "2.5.4.6" => "C",
        "2.5.4.7" => "L",
        "2.5.4.8" => "ST",
        "2.5.4.10" => "O",
        "2.5.4.11" => "OU",
        "0.9.2342.19200300.100.1.25" => "DC",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;

    const SIGNING_CERT: &[u8] = include_bytes!("../tests/fixtures/bank_signing_cert.pem");
    const SIGNING_KEY: &str = include_str!("../tests/fixtures/bank_signing_key.pem");
    const GATEWAY_CERT: &[u8] = include_bytes!("../tests/fixtures/gateway_cert.pem");

    #[test]
    fn test_parse_certificate_issuer_and_serial() {
        let cert = parse_certificate(SIGNING_CERT).unwrap();
        assert_eq!(
            cert.issuer,
            "CN=COL-158,OU=CAN-SP,O=Banco Prueba,L=Ciudad de Panama,ST=PA,C=PA"
        );
        assert_eq!(cert.serial, "864031817");
    }

    #[test]
    fn test_parse_gateway_certificate() {
        let cert = parse_certificate(GATEWAY_CERT).unwrap();
        assert_eq!(cert.serial, "1390261308");
        assert!(cert.issuer.starts_with("CN=osbdev.pasarela.local"));
    }

    #[test]
    fn test_parse_private_key_pkcs8() {
        let key = parse_private_key(SIGNING_KEY).unwrap();
        assert_eq!(key.size(), 256); // RSA-2048
    }

    #[test]
    fn test_private_key_matches_certificate() {
        let key = parse_private_key(SIGNING_KEY).unwrap();
        let cert = parse_certificate(SIGNING_CERT).unwrap();
        assert_eq!(RsaPublicKey::from(&key), cert.public_key);
    }

    #[test]
    fn test_garbage_inputs_rejected() {
        assert!(matches!(
            parse_certificate(b"not a certificate"),
            Err(SecurityError::Credential(_))
        ));
        assert!(matches!(
            parse_private_key("not a key"),
            Err(SecurityError::Credential(_))
        ));
    }
}
