//! Namespace and algorithm URI constants for the pinned WS-Security profile.

/// SOAP 1.1 envelope namespace. The peer speaks SOAP 1.1 only.
pub const SOAPENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// WS-Security extensions 1.0 namespace.
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// WS-Security utility namespace (`wsu:Id`, `wsu:Created`).
pub const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

/// WS-Security extensions 1.1 namespace (SignatureConfirmation, TokenType).
pub const WSSE11_NS: &str = "http://docs.oasis-open.org/wss/oasis-wss-wssecurity-secext-1.1.xsd";

/// XML Digital Signature namespace.
pub const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Encryption namespace.
pub const XENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";

/// Exclusive canonicalization namespace (also its algorithm URI).
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

// Algorithm identifiers of the pinned suite.

/// RSA-SHA1 signature method.
pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";

/// SHA-1 digest method.
pub const SHA1_DIGEST: &str = "http://www.w3.org/2000/09/xmldsig#sha1";

/// RSA PKCS#1 v1.5 key transport.
pub const RSA_1_5: &str = "http://www.w3.org/2001/04/xmlenc#rsa-1_5";

/// RSA-OAEP (MGF1 with SHA-1) key transport.
pub const RSA_OAEP_MGF1P: &str = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p";

/// Triple-DES in CBC mode.
pub const TRIPLEDES_CBC: &str = "http://www.w3.org/2001/04/xmlenc#tripledes-cbc";

/// AES-128 in CBC mode.
pub const AES128_CBC: &str = "http://www.w3.org/2001/04/xmlenc#aes128-cbc";

/// EncryptedData Type for content (children) encryption; the element itself survives.
pub const XENC_CONTENT: &str = "http://www.w3.org/2001/04/xmlenc#Content";

/// TokenType for a SecurityTokenReference pointing at an EncryptedKey.
pub const TOKEN_TYPE_ENCRYPTED_KEY: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-soap-message-security-1.1#EncryptedKey";

/// UsernameToken cleartext password type.
pub const PASSWORD_TEXT: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";

/// Base64 encoding type for the UsernameToken nonce.
pub const BASE64_BINARY: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
