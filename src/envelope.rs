//! Envelope construction and the ordered security header.
//!
//! The security header is kept as an explicit ordered token list and only
//! turned into a tree at finalization, serialized in final list order
//! with `EncryptedKey` first. That ordering is a wire-format contract of
//! the receiving peer's parser, so it is modeled as data rather than as a
//! tree-repositioning pass.

use crate::config::NamespaceConfig;
use crate::dom::{self, ns_lookup, Element, Node};
use crate::error::SecurityError;
use crate::ns::{SOAPENV_NS, WSSE_NS, WSU_NS};
use tracing::debug;

/// A SOAP 1.1 envelope under construction or received from the peer.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub root: Element,
}

impl Envelope {
    /// Parse received bytes, checking the document element is a SOAP 1.1
    /// envelope.
    pub fn from_bytes(data: &[u8]) -> Result<Self, SecurityError> {
        let root = dom::parse(data)?;
        if root.local != "Envelope" {
            return Err(SecurityError::MalformedInput(format!(
                "document element is '{}', expected Envelope",
                root.local
            )));
        }
        let uri = ns_lookup(&root.namespaces, root.prefix.as_deref());
        if uri != Some(SOAPENV_NS) {
            return Err(SecurityError::MalformedInput(
                "envelope is not in the SOAP 1.1 namespace".to_string(),
            ));
        }
        Ok(Self { root })
    }

    /// The Body element. Its children may be replaced when encrypting,
    /// but the element itself is never removed.
    pub fn body(&self) -> Result<&Element, SecurityError> {
        self.root
            .child("Body")
            .ok_or_else(|| SecurityError::MalformedInput("envelope has no Body".to_string()))
    }

    /// Mutable variant of [`Envelope::body`].
    pub fn body_mut(&mut self) -> Result<&mut Element, SecurityError> {
        self.root
            .child_mut("Body")
            .ok_or_else(|| SecurityError::MalformedInput("envelope has no Body".to_string()))
    }

    /// Child-index path of the Body under the root.
    pub fn body_path(&self) -> Result<Vec<usize>, SecurityError> {
        self.root
            .child_index("Body")
            .map(|i| vec![i])
            .ok_or_else(|| SecurityError::MalformedInput("envelope has no Body".to_string()))
    }

    /// Insert a Header holding the finalized security element as the
    /// first child of the envelope.
    pub fn attach_security(&mut self, security: Element) {
        let mut header = Element::new(Some("soapenv"), "Header");
        header.add_child(security);
        self.root.children.insert(0, Node::Element(header));
    }

    /// Serialize the envelope.
    pub fn to_xml(&self) -> String {
        self.root.to_xml()
    }
}

/// Builds the base envelope: no header yet, Body holding the business
/// payload, envelope and business namespaces declared on the root.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    namespaces: NamespaceConfig,
}

impl EnvelopeBuilder {
    pub fn new(namespaces: NamespaceConfig) -> Self {
        Self { namespaces }
    }

    /// Wrap a payload fragment into a fresh envelope.
    pub fn build(&self, payload: &str, operation: &str) -> Result<Envelope, SecurityError> {
        let nodes = dom::parse_fragment(payload)?;
        if !nodes.iter().any(|n| matches!(n, Node::Element(_))) {
            return Err(SecurityError::MalformedInput(
                "payload fragment holds no element".to_string(),
            ));
        }

        let mut root = Element::new(Some("soapenv"), "Envelope");
        root.declare(Some("soapenv"), SOAPENV_NS);
        root.declare(
            Some(&self.namespaces.business_prefix),
            &self.namespaces.business_uri,
        );

        let mut body = Element::new(Some("soapenv"), "Body");
        body.children = nodes;
        root.add_child(body);

        debug!(operation, "built base envelope");
        Ok(Envelope { root })
    }
}

/// One token of the security header.
#[derive(Debug, Clone)]
pub enum SecurityToken {
    EncryptedKey(Element),
    UsernameToken(Element),
    Signature(Element),
    SignatureConfirmation(Element),
}

impl SecurityToken {
    pub fn element(&self) -> &Element {
        match self {
            Self::EncryptedKey(e)
            | Self::UsernameToken(e)
            | Self::Signature(e)
            | Self::SignatureConfirmation(e) => e,
        }
    }

    pub fn element_mut(&mut self) -> &mut Element {
        match self {
            Self::EncryptedKey(e)
            | Self::UsernameToken(e)
            | Self::Signature(e)
            | Self::SignatureConfirmation(e) => e,
        }
    }

    pub fn into_element(self) -> Element {
        match self {
            Self::EncryptedKey(e)
            | Self::UsernameToken(e)
            | Self::Signature(e)
            | Self::SignatureConfirmation(e) => e,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::EncryptedKey(_) => "EncryptedKey",
            Self::UsernameToken(_) => "UsernameToken",
            Self::Signature(_) => "Signature",
            Self::SignatureConfirmation(_) => "SignatureConfirmation",
        }
    }
}

/// Ordered collection of security tokens.
#[derive(Debug, Clone, Default)]
pub struct SecurityHeader {
    tokens: Vec<SecurityToken>,
}

impl SecurityHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: SecurityToken) {
        self.tokens.push(token);
    }

    pub fn tokens(&self) -> &[SecurityToken] {
        &self.tokens
    }

    /// The SignatureConfirmation token, if one is queued; the signature
    /// engine references it when present.
    pub fn signature_confirmation_mut(&mut self) -> Option<&mut Element> {
        self.tokens.iter_mut().find_map(|t| match t {
            SecurityToken::SignatureConfirmation(e) => Some(e),
            _ => None,
        })
    }

    /// Namespace declarations the finalized Security element will carry;
    /// tokens canonicalized while still in the list inherit this scope.
    pub fn scope() -> Vec<(Option<String>, String)> {
        vec![
            (Some("wsse".to_string()), WSSE_NS.to_string()),
            (Some("wsu".to_string()), WSU_NS.to_string()),
        ]
    }

    /// Build the `wsse:Security` element, EncryptedKey tokens first
    /// regardless of the order they were pushed in.
    pub fn finalize(self) -> Element {
        let mut security = Element::new(Some("wsse"), "Security");
        security.declare(Some("wsse"), WSSE_NS);
        security.declare(Some("wsu"), WSU_NS);

        let (keys, rest): (Vec<SecurityToken>, Vec<SecurityToken>) = self
            .tokens
            .into_iter()
            .partition(|t| matches!(t, SecurityToken::EncryptedKey(_)));
        for token in keys.into_iter().chain(rest) {
            security.add_child(token.into_element());
        }
        security
    }
}
