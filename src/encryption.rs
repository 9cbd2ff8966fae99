//! Hybrid body encryption: an ephemeral symmetric session key protects
//! the Body content, and the session key travels RSA-wrapped under the
//! recipient's certificate.
//!
//! The ciphertext layout is IV-prepended CBC with PKCS#7 padding over the
//! canonicalized Body content. Outbound algorithm choices come from the
//! pinned profile; inbound algorithms are read from the message and
//! checked against the supported set, which deliberately reproduces the
//! peer's asymmetric conventions (it wraps with OAEP but expects
//! PKCS#1 v1.5, answers AES-128 but accepts 3DES).

use crate::c14n;
use crate::config::{ContentCipher, EncryptionConfig, KeyWrap};
use crate::credential::CertificateRef;
use crate::dom::{scope_along_path, Element, Node};
use crate::envelope::{Envelope, SecurityHeader, SecurityToken};
use crate::error::SecurityError;
use crate::ids::{generate_id, IdRegistry};
use crate::ns::{
    DS_NS, TOKEN_TYPE_ENCRYPTED_KEY, WSSE11_NS, WSSE_NS, XENC_CONTENT, XENC_NS,
};
use crate::signature::issuer_serial;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::{CryptoRng, RngCore};
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey};
use sha1::Sha1;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Ephemeral symmetric key. Generated fresh per outbound call, never
/// persisted or reused; the raw bytes are wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    bytes: Vec<u8>,
    #[zeroize(skip)]
    cipher: ContentCipher,
}

impl SessionKey {
    /// Draw a fresh key sized for the cipher from the injected CSPRNG.
    pub fn generate<R: RngCore + CryptoRng>(cipher: ContentCipher, rng: &mut R) -> Self {
        let mut bytes = vec![0u8; cipher.key_len()];
        rng.fill_bytes(&mut bytes);
        Self { bytes, cipher }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn cipher(&self) -> ContentCipher {
        self.cipher
    }
}

/// Encrypts and decrypts the envelope Body.
#[derive(Debug, Clone)]
pub struct EncryptionEngine {
    config: EncryptionConfig,
}

impl EncryptionEngine {
    pub fn new(config: EncryptionConfig) -> Self {
        Self { config }
    }

    /// Replace the Body children with an `EncryptedData` (Type=Content;
    /// the Body tag itself survives) and push the matching `EncryptedKey`
    /// token, wrapped under the recipient's RSA key.
    pub fn encrypt_body<R: RngCore + CryptoRng>(
        &self,
        envelope: &mut Envelope,
        header: &mut SecurityHeader,
        recipient: &CertificateRef,
        rng: &mut R,
    ) -> Result<(), SecurityError> {
        let cipher = self.config.content_cipher;
        let body_path = envelope.body_path()?;
        let scope = scope_along_path(&envelope.root, &body_path);
        let content = c14n::canonicalize_content(envelope.body()?, &scope, &[])?;

        let session_key = SessionKey::generate(cipher, rng);
        let mut iv = vec![0u8; cipher.block_len()];
        rng.fill_bytes(&mut iv);

        let mut ciphertext = iv.clone();
        ciphertext.extend(cbc_encrypt(
            cipher,
            session_key.bytes(),
            &iv,
            content.as_bytes(),
        )?);

        let wrapped = match self.config.key_wrap {
            KeyWrap::Rsa15 => recipient
                .public_key
                .encrypt(rng, Pkcs1v15Encrypt, session_key.bytes()),
            KeyWrap::RsaOaepSha1 => {
                recipient
                    .public_key
                    .encrypt(rng, Oaep::new::<Sha1>(), session_key.bytes())
            }
        }
        .map_err(|e| SecurityError::KeyWrapFailed(e.to_string()))?;
        drop(session_key);

        let ed_id = generate_id("ED", rng);
        let ek_id = generate_id("EK", rng);

        let encrypted_data =
            encrypted_data_element(&ed_id, &ek_id, cipher, &BASE64.encode(&ciphertext));
        let encrypted_key = encrypted_key_element(
            &ek_id,
            &ed_id,
            self.config.key_wrap,
            recipient,
            &BASE64.encode(&wrapped),
        );

        let body = envelope.body_mut()?;
        body.children = vec![Node::Element(encrypted_data)];
        header.push(SecurityToken::EncryptedKey(encrypted_key));

        debug!(
            cipher = cipher.algorithm_uri(),
            wrap = self.config.key_wrap.algorithm_uri(),
            "body encrypted"
        );
        Ok(())
    }

    /// Unwrap the session key with the local private key, decrypt the
    /// referenced `EncryptedData`, and restore the plaintext children
    /// under the Body. Returns the plaintext fragment.
    pub fn decrypt_body(
        &self,
        envelope: &mut Envelope,
        private_key: &RsaPrivateKey,
    ) -> Result<String, SecurityError> {
        let (wrap_uri, wrapped_b64, data_ref) = {
            let ek = envelope.root.find("EncryptedKey").ok_or_else(|| {
                SecurityError::MalformedInput("no EncryptedKey in envelope".to_string())
            })?;
            let alg = ek
                .child("EncryptionMethod")
                .and_then(|m| m.attribute(None, "Algorithm"))
                .ok_or_else(|| {
                    SecurityError::MalformedInput(
                        "EncryptedKey without EncryptionMethod".to_string(),
                    )
                })?
                .to_string();
            let cipher_value = ek
                .find("CipherValue")
                .ok_or_else(|| {
                    SecurityError::MalformedInput("EncryptedKey without CipherValue".to_string())
                })?
                .text();
            let data_ref = ek
                .find("DataReference")
                .and_then(|d| d.attribute(None, "URI"))
                .map(str::to_string);
            (alg, cipher_value, data_ref)
        };

        let wrap = KeyWrap::from_uri(&wrap_uri)
            .ok_or_else(|| SecurityError::UnsupportedAlgorithm(wrap_uri.clone()))?;
        let wrapped = BASE64
            .decode(compact(&wrapped_b64).as_bytes())
            .map_err(|_| {
                SecurityError::KeyUnwrapFailed("EncryptedKey CipherValue is not base64".to_string())
            })?;
        let session_key = Zeroizing::new(
            match wrap {
                KeyWrap::Rsa15 => private_key.decrypt(Pkcs1v15Encrypt, &wrapped),
                KeyWrap::RsaOaepSha1 => private_key.decrypt(Oaep::new::<Sha1>(), &wrapped),
            }
            .map_err(|e| SecurityError::KeyUnwrapFailed(e.to_string()))?,
        );

        let (cipher_uri, content_b64) = {
            let registry = IdRegistry::scan(&envelope.root)?;
            let ed: &Element = match &data_ref {
                Some(uri) => {
                    let path = registry.resolve(uri)?.to_vec();
                    envelope.root.node_at(&path).ok_or_else(|| {
                        SecurityError::ReferenceNotFound(uri.clone())
                    })?
                }
                None => envelope.body()?.find("EncryptedData").ok_or_else(|| {
                    SecurityError::MalformedInput("no EncryptedData in Body".to_string())
                })?,
            };
            if let Some(data_type) = ed.attribute(None, "Type") {
                if data_type != XENC_CONTENT {
                    return Err(SecurityError::UnsupportedAlgorithm(format!(
                        "EncryptedData type {}",
                        data_type
                    )));
                }
            }
            let alg = ed
                .child("EncryptionMethod")
                .and_then(|m| m.attribute(None, "Algorithm"))
                .ok_or_else(|| {
                    SecurityError::MalformedInput(
                        "EncryptedData without EncryptionMethod".to_string(),
                    )
                })?
                .to_string();
            let cipher_value = ed
                .find("CipherValue")
                .ok_or_else(|| {
                    SecurityError::MalformedInput("EncryptedData without CipherValue".to_string())
                })?
                .text();
            (alg, cipher_value)
        };

        let cipher = ContentCipher::from_uri(&cipher_uri)
            .ok_or_else(|| SecurityError::UnsupportedAlgorithm(cipher_uri.clone()))?;
        if session_key.len() != cipher.key_len() {
            return Err(SecurityError::SymmetricCrypto(format!(
                "session key is {} bytes, cipher needs {}",
                session_key.len(),
                cipher.key_len()
            )));
        }

        let ciphertext = BASE64
            .decode(compact(&content_b64).as_bytes())
            .map_err(|_| {
                SecurityError::DecryptionFailed("EncryptedData CipherValue is not base64".to_string())
            })?;
        let block = cipher.block_len();
        if ciphertext.len() <= block || (ciphertext.len() - block) % block != 0 {
            return Err(SecurityError::SymmetricCrypto(format!(
                "ciphertext length {} is not IV plus whole blocks",
                ciphertext.len()
            )));
        }
        let (iv, remainder) = ciphertext.split_at(block);
        let plaintext_bytes = cbc_decrypt(cipher, &session_key, iv, remainder)?;

        let plaintext = String::from_utf8(plaintext_bytes).map_err(|_| {
            SecurityError::DecryptionFailed("decrypted content is not UTF-8".to_string())
        })?;
        let nodes = crate::dom::parse_fragment(&plaintext).map_err(|_| {
            SecurityError::DecryptionFailed("decrypted content is not well-formed".to_string())
        })?;
        // Body content is element content; stray non-whitespace text means
        // a corrupted-but-unpaddable block slipped through.
        let has_element = nodes.iter().any(|n| matches!(n, Node::Element(_)));
        let stray_text = nodes.iter().any(|n| match n {
            Node::Text(t) => !t.trim().is_empty(),
            _ => false,
        });
        if !has_element || stray_text {
            return Err(SecurityError::DecryptionFailed(
                "decrypted content is not element content".to_string(),
            ));
        }

        envelope.body_mut()?.children = nodes;
        debug!(cipher = cipher.algorithm_uri(), "body decrypted");
        Ok(plaintext)
    }
}

fn cbc_encrypt(
    cipher: ContentCipher,
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, SecurityError> {
    match cipher {
        ContentCipher::TripleDesCbc => cbc::Encryptor::<des::TdesEde3>::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
            .map_err(|e| SecurityError::SymmetricCrypto(e.to_string())),
        ContentCipher::Aes128Cbc => cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
            .map_err(|e| SecurityError::SymmetricCrypto(e.to_string())),
    }
}

fn cbc_decrypt(
    cipher: ContentCipher,
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, SecurityError> {
    let decrypted = match cipher {
        ContentCipher::TripleDesCbc => cbc::Decryptor::<des::TdesEde3>::new_from_slices(key, iv)
            .map_err(|e| SecurityError::SymmetricCrypto(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        ContentCipher::Aes128Cbc => cbc::Decryptor::<aes::Aes128>::new_from_slices(key, iv)
            .map_err(|e| SecurityError::SymmetricCrypto(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
    };
    decrypted.map_err(|_| SecurityError::DecryptionFailed("invalid PKCS#7 padding".to_string()))
}

fn compact(b64: &str) -> String {
    b64.split_whitespace().collect()
}

fn encrypted_data_element(
    ed_id: &str,
    ek_id: &str,
    cipher: ContentCipher,
    cipher_value_b64: &str,
) -> Element {
    let mut ed = Element::new(Some("xenc"), "EncryptedData");
    ed.declare(Some("xenc"), XENC_NS);
    ed.set_attribute(None, "Id", ed_id);
    ed.set_attribute(None, "Type", XENC_CONTENT);

    let mut method = Element::new(Some("xenc"), "EncryptionMethod");
    method.set_attribute(None, "Algorithm", cipher.algorithm_uri());
    ed.add_child(method);

    let mut key_info = Element::new(Some("ds"), "KeyInfo");
    key_info.declare(Some("ds"), DS_NS);
    let mut str_el = Element::new(Some("wsse"), "SecurityTokenReference");
    str_el.declare(Some("wsse"), WSSE_NS);
    str_el.declare(Some("wsse11"), WSSE11_NS);
    str_el.set_attribute(Some("wsse11"), "TokenType", TOKEN_TYPE_ENCRYPTED_KEY);
    let mut reference = Element::new(Some("wsse"), "Reference");
    reference.set_attribute(None, "URI", &format!("#{}", ek_id));
    str_el.add_child(reference);
    key_info.add_child(str_el);
    ed.add_child(key_info);

    let mut cipher_data = Element::new(Some("xenc"), "CipherData");
    let mut cipher_value = Element::new(Some("xenc"), "CipherValue");
    cipher_value.add_text(cipher_value_b64);
    cipher_data.add_child(cipher_value);
    ed.add_child(cipher_data);
    ed
}

fn encrypted_key_element(
    ek_id: &str,
    ed_id: &str,
    wrap: KeyWrap,
    recipient: &CertificateRef,
    cipher_value_b64: &str,
) -> Element {
    let mut ek = Element::new(Some("xenc"), "EncryptedKey");
    ek.declare(Some("xenc"), XENC_NS);
    ek.set_attribute(None, "Id", ek_id);

    let mut method = Element::new(Some("xenc"), "EncryptionMethod");
    method.set_attribute(None, "Algorithm", wrap.algorithm_uri());
    ek.add_child(method);

    let mut key_info = Element::new(Some("ds"), "KeyInfo");
    key_info.declare(Some("ds"), DS_NS);
    let mut str_el = Element::new(Some("wsse"), "SecurityTokenReference");
    str_el.add_child(issuer_serial(recipient));
    key_info.add_child(str_el);
    ek.add_child(key_info);

    let mut cipher_data = Element::new(Some("xenc"), "CipherData");
    let mut cipher_value = Element::new(Some("xenc"), "CipherValue");
    cipher_value.add_text(cipher_value_b64);
    cipher_data.add_child(cipher_value);
    ek.add_child(cipher_data);

    let mut reference_list = Element::new(Some("xenc"), "ReferenceList");
    let mut data_reference = Element::new(Some("xenc"), "DataReference");
    data_reference.set_attribute(None, "URI", &format!("#{}", ed_id));
    reference_list.add_child(data_reference);
    ek.add_child(reference_list);
    ek
}
