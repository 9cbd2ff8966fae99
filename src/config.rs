//! Configuration types for the WS-Security envelope processor.
//!
//! The algorithm suite, padding conventions and prefix lists here were
//! pinned against one specific receiving peer. They are deployment data,
//! not a general WS-Security policy: do not reuse them as defaults for
//! other endpoints.

use crate::ns;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The peer-pinned security profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityProfile {
    /// Business payload namespace
    pub namespaces: NamespaceConfig,

    /// Signature suite
    pub signature: SignatureConfig,

    /// Encryption suite
    pub encryption: EncryptionConfig,
}

impl Default for SecurityProfile {
    fn default() -> Self {
        Self {
            namespaces: NamespaceConfig::default(),
            signature: SignatureConfig::default(),
            encryption: EncryptionConfig::default(),
        }
    }
}

/// Namespace bindings declared on the envelope root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// Prefix bound to the business payload namespace
    pub business_prefix: String,

    /// Business payload namespace URI
    pub business_uri: String,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            business_prefix: "dto".to_string(),
            business_uri: "http://dto.eis.pasarela.hubpagos.bytesw.com/".to_string(),
        }
    }
}

/// Signature suite configuration.
///
/// The prefix lists are per-reference: each must name exactly the
/// namespace prefixes in scope at the referenced fragment. A mismatch
/// breaks verification at the receiver, not at signing time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// InclusiveNamespaces prefix list of the SignedInfo canonicalization
    pub signed_info_prefix_list: Vec<String>,

    /// Prefix list of the Body reference transform
    pub body_prefix_list: Vec<String>,

    /// Prefix list of the SignatureConfirmation reference transform
    pub confirmation_prefix_list: Vec<String>,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            signed_info_prefix_list: vec!["dto".to_string(), "soapenv".to_string()],
            body_prefix_list: vec!["dto".to_string()],
            confirmation_prefix_list: vec!["wsse".to_string(), "soapenv".to_string()],
        }
    }
}

/// Encryption suite configuration.
///
/// Outbound and inbound conventions differ on purpose: the peer wraps
/// with OAEP when answering but expects PKCS#1 v1.5 wrapping on requests,
/// and answers with AES-128 while requests carry 3DES. Inbound algorithms
/// are read from the message and checked against the supported set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Block cipher used for outbound Body content
    pub content_cipher: ContentCipher,

    /// RSA padding used for outbound session-key wrapping
    pub key_wrap: KeyWrap,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            content_cipher: ContentCipher::TripleDesCbc,
            key_wrap: KeyWrap::Rsa15,
        }
    }
}

/// Symmetric content ciphers of the pinned suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentCipher {
    #[serde(rename = "tripledes-cbc")]
    TripleDesCbc,
    #[serde(rename = "aes128-cbc")]
    Aes128Cbc,
}

impl ContentCipher {
    /// Session-key size in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            Self::TripleDesCbc => 24,
            Self::Aes128Cbc => 16,
        }
    }

    /// Cipher block (and IV) size in bytes.
    pub fn block_len(&self) -> usize {
        match self {
            Self::TripleDesCbc => 8,
            Self::Aes128Cbc => 16,
        }
    }

    /// XML Encryption algorithm identifier.
    pub fn algorithm_uri(&self) -> &'static str {
        match self {
            Self::TripleDesCbc => ns::TRIPLEDES_CBC,
            Self::Aes128Cbc => ns::AES128_CBC,
        }
    }

    /// Map a message's algorithm identifier onto the supported set.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            ns::TRIPLEDES_CBC => Some(Self::TripleDesCbc),
            ns::AES128_CBC => Some(Self::Aes128Cbc),
            _ => None,
        }
    }
}

/// RSA key-transport paddings of the pinned suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyWrap {
    #[serde(rename = "rsa-1_5")]
    Rsa15,
    #[serde(rename = "rsa-oaep-mgf1p")]
    RsaOaepSha1,
}

impl KeyWrap {
    /// XML Encryption algorithm identifier.
    pub fn algorithm_uri(&self) -> &'static str {
        match self {
            Self::Rsa15 => ns::RSA_1_5,
            Self::RsaOaepSha1 => ns::RSA_OAEP_MGF1P,
        }
    }

    /// Map a message's algorithm identifier onto the supported set.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            ns::RSA_1_5 => Some(Self::Rsa15),
            ns::RSA_OAEP_MGF1P => Some(Self::RsaOaepSha1),
            _ => None,
        }
    }
}

/// File locations of the credential material. Key material is always
/// supplied through these paths; nothing is embedded in the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialPaths {
    /// Own signing private key (PEM)
    pub signing_key: PathBuf,

    /// Own signing certificate (PEM)
    pub signing_cert: PathBuf,

    /// Own decryption private key (PEM)
    pub decryption_key: PathBuf,

    /// Own decryption certificate (PEM)
    pub decryption_cert: PathBuf,

    /// Peer certificate used for encrypting session keys (PEM)
    pub peer_encryption_cert: PathBuf,

    /// Peer certificate trusted for signature verification (PEM)
    pub peer_trust_cert: PathBuf,
}

/// Configuration for the client binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service endpoint URL
    pub endpoint: String,

    /// Operation name; also sent as the SOAPAction header
    pub operation: String,

    /// Business payload fragment placed in the Body
    pub payload: String,

    /// Local name of the response field to extract
    pub response_field: String,

    /// UsernameToken username
    pub username: String,

    /// UsernameToken password
    pub password: String,

    /// Credential material locations
    pub credentials: Option<CredentialPaths>,

    /// Security profile
    pub profile: SecurityProfile,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/PasarelaWS".to_string(),
            operation: "GetSession".to_string(),
            payload: "<dto:GetSessionRequest><canal>SP</canal></dto:GetSessionRequest>"
                .to_string(),
            response_field: "sesionId".to_string(),
            username: String::new(),
            password: String::new(),
            credentials: None,
            profile: SecurityProfile::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_matches_pinned_suite() {
        let profile = SecurityProfile::default();
        assert_eq!(profile.encryption.content_cipher, ContentCipher::TripleDesCbc);
        assert_eq!(profile.encryption.key_wrap, KeyWrap::Rsa15);
        assert_eq!(
            profile.signature.signed_info_prefix_list,
            vec!["dto".to_string(), "soapenv".to_string()]
        );
        assert_eq!(profile.signature.body_prefix_list, vec!["dto".to_string()]);
    }

    #[test]
    fn test_cipher_parameters() {
        assert_eq!(ContentCipher::TripleDesCbc.key_len(), 24);
        assert_eq!(ContentCipher::TripleDesCbc.block_len(), 8);
        assert_eq!(ContentCipher::Aes128Cbc.key_len(), 16);
        assert_eq!(ContentCipher::Aes128Cbc.block_len(), 16);
    }

    #[test]
    fn test_algorithm_uri_round_trip() {
        for cipher in [ContentCipher::TripleDesCbc, ContentCipher::Aes128Cbc] {
            assert_eq!(ContentCipher::from_uri(cipher.algorithm_uri()), Some(cipher));
        }
        for wrap in [KeyWrap::Rsa15, KeyWrap::RsaOaepSha1] {
            assert_eq!(KeyWrap::from_uri(wrap.algorithm_uri()), Some(wrap));
        }
        assert_eq!(ContentCipher::from_uri("urn:nope"), None);
        assert_eq!(KeyWrap::from_uri("urn:nope"), None);
    }

    #[test]
    fn test_profile_serialization() {
        let profile = SecurityProfile::default();
        let yaml = serde_yaml::to_string(&profile).unwrap();
        let parsed: SecurityProfile = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            parsed.encryption.content_cipher,
            profile.encryption.content_cipher
        );
    }

    #[test]
    fn test_client_config_from_yaml() {
        let yaml = r#"
endpoint: "https://gateway.example/PasarelaWS"
operation: GetSession
username: col-158
password: secret
profile:
  encryption:
    content_cipher: aes128-cbc
    key_wrap: rsa-oaep-mgf1p
  signature:
    body_prefix_list: ["dto"]
"#;
        let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.endpoint, "https://gateway.example/PasarelaWS");
        assert_eq!(config.username, "col-158");
        assert_eq!(
            config.profile.encryption.content_cipher,
            ContentCipher::Aes128Cbc
        );
        assert_eq!(config.profile.encryption.key_wrap, KeyWrap::RsaOaepSha1);
        // Untouched sections keep their defaults.
        assert_eq!(config.response_field, "sesionId");
    }
}
