//! XML digital signature over designated envelope fragments.
//!
//! One Reference per target, each with its own exclusive-C14N prefix
//! list; SHA-1 digests; RSA-SHA1 over the canonical SignedInfo; KeyInfo
//! points at the signing certificate by issuer and serial, never by
//! embedding it.

use crate::c14n;
use crate::config::SignatureConfig;
use crate::credential::{CertificateRef, Credential};
use crate::dom::{scope_along_path, Element, Node, NsDecl};
use crate::envelope::{Envelope, SecurityHeader, SecurityToken};
use crate::error::SecurityError;
use crate::ids::{ensure_wsu_id, generate_id, IdRegistry};
use crate::ns::{DS_NS, EXC_C14N, RSA_SHA1, SHA1_DIGEST};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::{CryptoRng, RngCore};
use rsa::pkcs1v15::{Signature as RsaSignature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use sha1::{Digest, Sha1};
use tracing::debug;

/// Computes and verifies envelope signatures.
#[derive(Debug, Clone)]
pub struct SignatureEngine {
    config: SignatureConfig,
}

impl SignatureEngine {
    pub fn new(config: SignatureConfig) -> Self {
        Self { config }
    }

    /// Sign the Body and, when the header holds one, the
    /// SignatureConfirmation token. Ids are assigned to every target
    /// before any reference is built; the resulting Signature token is
    /// pushed into the security header.
    pub fn sign<R: RngCore + CryptoRng>(
        &self,
        envelope: &mut Envelope,
        header: &mut SecurityHeader,
        credential: &Credential,
        rng: &mut R,
    ) -> Result<(), SecurityError> {
        let body_path = envelope.body_path()?;
        let body_id = ensure_wsu_id(envelope.body_mut()?, "id", rng);

        let mut references: Vec<(String, Vec<String>, String)> = Vec::new();

        let body_scope = scope_along_path(&envelope.root, &body_path);
        let body_canonical = c14n::canonicalize(
            envelope.body()?,
            &body_scope,
            &self.config.body_prefix_list,
        )?;
        references.push((
            body_id,
            self.config.body_prefix_list.clone(),
            digest_b64(body_canonical.as_bytes()),
        ));

        let root_decls = envelope.root.namespaces.clone();
        if let Some(confirmation) = header.signature_confirmation_mut() {
            let confirmation_id = ensure_wsu_id(confirmation, "SC", rng);
            let mut scope = root_decls.clone();
            scope.extend(SecurityHeader::scope());
            let canonical = c14n::canonicalize(
                confirmation,
                &scope,
                &self.config.confirmation_prefix_list,
            )?;
            references.push((
                confirmation_id,
                self.config.confirmation_prefix_list.clone(),
                digest_b64(canonical.as_bytes()),
            ));
        }

        let mut signed_info = Element::new(Some("ds"), "SignedInfo");
        let mut canon_method = Element::new(Some("ds"), "CanonicalizationMethod");
        canon_method.set_attribute(None, "Algorithm", EXC_C14N);
        canon_method.add_child(inclusive_namespaces(&self.config.signed_info_prefix_list));
        signed_info.add_child(canon_method);
        let mut sig_method = Element::new(Some("ds"), "SignatureMethod");
        sig_method.set_attribute(None, "Algorithm", RSA_SHA1);
        signed_info.add_child(sig_method);
        for (id, prefixes, digest) in &references {
            signed_info.add_child(reference_element(id, prefixes, digest));
        }

        // SignedInfo is canonicalized as it will sit in the finalized
        // tree: under Security, inside a Signature that declares `ds`.
        let mut scope: Vec<NsDecl> = root_decls;
        scope.extend(SecurityHeader::scope());
        scope.push((Some("ds".to_string()), DS_NS.to_string()));
        let si_canonical =
            c14n::canonicalize(&signed_info, &scope, &self.config.signed_info_prefix_list)?;

        let signing_key = SigningKey::<Sha1>::new(credential.signing_key.clone());
        let signature = signing_key
            .try_sign(si_canonical.as_bytes())
            .map_err(|e| SecurityError::SignatureComputation(e.to_string()))?;

        let mut signature_el = Element::new(Some("ds"), "Signature");
        signature_el.declare(Some("ds"), DS_NS);
        signature_el.set_attribute(None, "Id", &generate_id("SIG", rng));
        signature_el.add_child(signed_info);
        let mut value_el = Element::new(Some("ds"), "SignatureValue");
        value_el.add_text(&BASE64.encode(signature.to_bytes()));
        signature_el.add_child(value_el);
        signature_el.add_child(key_info(&credential.signing_cert, rng));

        debug!(references = references.len(), "envelope signed");
        header.push(SecurityToken::Signature(signature_el));
        Ok(())
    }

    /// Verify the envelope's signature against a trusted certificate:
    /// resolve every reference, recompute canonical digests, then check
    /// the signature value over the canonical SignedInfo. Read-only
    /// beyond id-registry bookkeeping.
    pub fn verify(
        &self,
        envelope: &Envelope,
        trusted: &CertificateRef,
    ) -> Result<(), SecurityError> {
        let root = &envelope.root;
        let registry = IdRegistry::scan(root)?;

        let sig_path = root.find_path("Signature").ok_or_else(|| {
            SecurityError::MalformedSignature("no Signature element".to_string())
        })?;
        let signature = root
            .node_at(&sig_path)
            .ok_or_else(|| SecurityError::MalformedSignature("no Signature element".to_string()))?;

        let signed_info = signature.child("SignedInfo").ok_or_else(|| {
            SecurityError::MalformedSignature("Signature without SignedInfo".to_string())
        })?;

        let canon_method = signed_info.child("CanonicalizationMethod").ok_or_else(|| {
            SecurityError::MalformedSignature("missing CanonicalizationMethod".to_string())
        })?;
        let canon_alg = algorithm_of(canon_method)?;
        if canon_alg != EXC_C14N {
            return Err(SecurityError::UnsupportedAlgorithm(canon_alg.to_string()));
        }
        let si_prefixes = prefix_list_of(canon_method);

        let sig_method = signed_info.child("SignatureMethod").ok_or_else(|| {
            SecurityError::MalformedSignature("missing SignatureMethod".to_string())
        })?;
        let sig_alg = algorithm_of(sig_method)?;
        if sig_alg != RSA_SHA1 {
            return Err(SecurityError::UnsupportedAlgorithm(sig_alg.to_string()));
        }

        let mut reference_count = 0usize;
        for child in &signed_info.children {
            let reference = match child {
                Node::Element(e) if e.local == "Reference" => e,
                _ => continue,
            };
            reference_count += 1;
            self.verify_reference(root, &registry, reference)?;
        }
        if reference_count == 0 {
            return Err(SecurityError::MalformedSignature(
                "SignedInfo holds no Reference".to_string(),
            ));
        }

        let value_text = signature
            .child("SignatureValue")
            .ok_or_else(|| {
                SecurityError::MalformedSignature("missing SignatureValue".to_string())
            })?
            .text();
        let compact: String = value_text.split_whitespace().collect();
        let sig_bytes = BASE64.decode(compact.as_bytes()).map_err(|_| {
            SecurityError::MalformedSignature("SignatureValue is not base64".to_string())
        })?;

        let si_index = signature
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.local == "SignedInfo"))
            .ok_or_else(|| {
                SecurityError::MalformedSignature("Signature without SignedInfo".to_string())
            })?;
        let mut si_path = sig_path.clone();
        si_path.push(si_index);
        let scope = scope_along_path(root, &si_path);
        let canonical = c14n::canonicalize(signed_info, &scope, &si_prefixes)?;

        let rsa_signature = RsaSignature::try_from(sig_bytes.as_slice()).map_err(|_| {
            SecurityError::MalformedSignature("SignatureValue has invalid encoding".to_string())
        })?;
        let verifying_key = VerifyingKey::<Sha1>::new(trusted.public_key.clone());
        verifying_key
            .verify(canonical.as_bytes(), &rsa_signature)
            .map_err(|_| {
                SecurityError::SignatureInvalid(
                    "signature value does not verify against the trusted certificate".to_string(),
                )
            })?;

        debug!(references = reference_count, "signature verified");
        Ok(())
    }

    fn verify_reference(
        &self,
        root: &Element,
        registry: &IdRegistry,
        reference: &Element,
    ) -> Result<(), SecurityError> {
        let uri = reference.attribute(None, "URI").ok_or_else(|| {
            SecurityError::MalformedSignature("Reference without URI".to_string())
        })?;

        let transforms = reference.child("Transforms").ok_or_else(|| {
            SecurityError::MalformedSignature("Reference without Transforms".to_string())
        })?;
        let transform = transforms.child("Transform").ok_or_else(|| {
            SecurityError::MalformedSignature("Transforms without Transform".to_string())
        })?;
        let transform_alg = algorithm_of(transform)?;
        if transform_alg != EXC_C14N {
            return Err(SecurityError::UnsupportedAlgorithm(transform_alg.to_string()));
        }
        let prefixes = prefix_list_of(transform);

        let digest_method = reference.child("DigestMethod").ok_or_else(|| {
            SecurityError::MalformedSignature("Reference without DigestMethod".to_string())
        })?;
        let digest_alg = algorithm_of(digest_method)?;
        if digest_alg != SHA1_DIGEST {
            return Err(SecurityError::UnsupportedAlgorithm(digest_alg.to_string()));
        }
        let expected = reference
            .child("DigestValue")
            .ok_or_else(|| {
                SecurityError::MalformedSignature("Reference without DigestValue".to_string())
            })?
            .text()
            .trim()
            .to_string();

        let target_path = registry.resolve(uri)?.to_vec();
        let target = root
            .node_at(&target_path)
            .ok_or_else(|| SecurityError::ReferenceNotFound(uri.to_string()))?;
        let scope = scope_along_path(root, &target_path);
        let canonical = c14n::canonicalize(target, &scope, &prefixes)?;
        let actual = digest_b64(canonical.as_bytes());
        if actual != expected {
            return Err(SecurityError::SignatureInvalid(format!(
                "digest mismatch for reference {}",
                uri
            )));
        }
        debug!(uri, "reference digest verified");
        Ok(())
    }
}

fn digest_b64(data: &[u8]) -> String {
    BASE64.encode(Sha1::digest(data))
}

fn algorithm_of(el: &Element) -> Result<&str, SecurityError> {
    el.attribute(None, "Algorithm").ok_or_else(|| {
        SecurityError::MalformedSignature(format!("{} without Algorithm", el.local))
    })
}

/// PrefixList of an `ec:InclusiveNamespaces` child, empty when absent.
fn prefix_list_of(el: &Element) -> Vec<String> {
    el.find("InclusiveNamespaces")
        .and_then(|inc| inc.attribute(None, "PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn inclusive_namespaces(prefixes: &[String]) -> Element {
    let mut el = Element::new(Some("ec"), "InclusiveNamespaces");
    el.declare(Some("ec"), EXC_C14N);
    el.set_attribute(None, "PrefixList", &prefixes.join(" "));
    el
}

fn reference_element(id: &str, prefixes: &[String], digest: &str) -> Element {
    let mut reference = Element::new(Some("ds"), "Reference");
    reference.set_attribute(None, "URI", &format!("#{}", id));

    let mut transforms = Element::new(Some("ds"), "Transforms");
    let mut transform = Element::new(Some("ds"), "Transform");
    transform.set_attribute(None, "Algorithm", EXC_C14N);
    transform.add_child(inclusive_namespaces(prefixes));
    transforms.add_child(transform);
    reference.add_child(transforms);

    let mut digest_method = Element::new(Some("ds"), "DigestMethod");
    digest_method.set_attribute(None, "Algorithm", SHA1_DIGEST);
    reference.add_child(digest_method);

    let mut digest_value = Element::new(Some("ds"), "DigestValue");
    digest_value.add_text(digest);
    reference.add_child(digest_value);

    reference
}

fn key_info<R: RngCore + CryptoRng>(cert: &CertificateRef, rng: &mut R) -> Element {
    let mut key_info = Element::new(Some("ds"), "KeyInfo");
    key_info.set_attribute(None, "Id", &generate_id("KI", rng));

    let mut str_el = Element::new(Some("wsse"), "SecurityTokenReference");
    str_el.set_attribute(Some("wsu"), "Id", &generate_id("STR", rng));
    str_el.add_child(issuer_serial(cert));
    key_info.add_child(str_el);
    key_info
}

/// `ds:X509Data/ds:X509IssuerSerial` naming a certificate by issuer and
/// serial number.
pub fn issuer_serial(cert: &CertificateRef) -> Element {
    let mut x509_data = Element::new(Some("ds"), "X509Data");
    let mut pair = Element::new(Some("ds"), "X509IssuerSerial");
    let mut issuer = Element::new(Some("ds"), "X509IssuerName");
    issuer.add_text(&cert.issuer);
    pair.add_child(issuer);
    let mut serial = Element::new(Some("ds"), "X509SerialNumber");
    serial.add_text(&cert.serial);
    pair.add_child(serial);
    x509_data.add_child(pair);
    x509_data
}
