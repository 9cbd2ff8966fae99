//! UsernameToken construction.
//!
//! The profile transmits a cleartext `PasswordText` credential; there is
//! no local digesting. Replay resistance comes from the per-call random
//! nonce and the UTC creation timestamp.

use crate::dom::Element;
use crate::ids::generate_id;
use crate::ns::{BASE64_BINARY, PASSWORD_TEXT, WSSE11_NS};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use rand::{CryptoRng, RngCore};

/// Nonce size in bytes.
const NONCE_LEN: usize = 16;

/// Builds UsernameToken elements for the security header.
#[derive(Debug, Clone, Copy)]
pub struct UsernameTokenFactory;

impl UsernameTokenFactory {
    /// Create a token with a fresh nonce, a UTC creation timestamp and a
    /// unique id. No other side effects.
    pub fn create<R: RngCore + CryptoRng>(
        username: &str,
        password: &str,
        rng: &mut R,
    ) -> Element {
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);
        let created = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let mut token = Element::new(Some("wsse"), "UsernameToken");
        token.set_attribute(Some("wsu"), "Id", &generate_id("UT", rng));

        let mut user = Element::new(Some("wsse"), "Username");
        user.add_text(username);
        token.add_child(user);

        let mut pass = Element::new(Some("wsse"), "Password");
        pass.set_attribute(None, "Type", PASSWORD_TEXT);
        pass.add_text(password);
        token.add_child(pass);

        let mut nonce_el = Element::new(Some("wsse"), "Nonce");
        nonce_el.set_attribute(None, "EncodingType", BASE64_BINARY);
        nonce_el.add_text(&BASE64.encode(nonce));
        token.add_child(nonce_el);

        let mut created_el = Element::new(Some("wsu"), "Created");
        created_el.add_text(&created);
        token.add_child(created_el);

        token
    }
}

/// Build a SignatureConfirmation element (WS-Security 1.1). Inbound
/// responses carry one; it becomes a signature reference target.
pub fn signature_confirmation(value: &str, id: &str) -> Element {
    let mut el = Element::new(Some("wsse11"), "SignatureConfirmation");
    el.declare(Some("wsse11"), WSSE11_NS);
    el.set_attribute(None, "Value", value);
    el.set_attribute(Some("wsu"), "Id", id);
    el
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_token_structure() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let token = UsernameTokenFactory::create("col-158", "secret", &mut rng);

        assert_eq!(token.local, "UsernameToken");
        assert!(token
            .attribute(Some("wsu"), "Id")
            .is_some_and(|id| id.starts_with("UT-")));
        assert_eq!(token.child("Username").unwrap().text(), "col-158");

        let password = token.child("Password").unwrap();
        assert_eq!(password.text(), "secret");
        assert_eq!(password.attribute(None, "Type"), Some(PASSWORD_TEXT));
    }

    #[test]
    fn test_nonce_is_16_random_bytes() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let token = UsernameTokenFactory::create("u", "p", &mut rng);
        let nonce = BASE64.decode(token.child("Nonce").unwrap().text()).unwrap();
        assert_eq!(nonce.len(), NONCE_LEN);
    }

    #[test]
    fn test_created_is_utc_timestamp() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let token = UsernameTokenFactory::create("u", "p", &mut rng);
        let created = token.child("Created").unwrap().text();
        assert!(NaiveDateTime::parse_from_str(&created, "%Y-%m-%dT%H:%M:%SZ").is_ok());
    }

    #[test]
    fn test_fresh_randomness_per_token() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let a = UsernameTokenFactory::create("u", "p", &mut rng);
        let b = UsernameTokenFactory::create("u", "p", &mut rng);
        assert_ne!(
            a.child("Nonce").unwrap().text(),
            b.child("Nonce").unwrap().text()
        );
        assert_ne!(
            a.attribute(Some("wsu"), "Id"),
            b.attribute(Some("wsu"), "Id")
        );
    }

    #[test]
    fn test_signature_confirmation_shape() {
        let el = signature_confirmation("c2lnbmF0dXJl", "SC-1");
        assert_eq!(el.local, "SignatureConfirmation");
        assert_eq!(el.attribute(None, "Value"), Some("c2lnbmF0dXJl"));
        assert_eq!(el.attribute(Some("wsu"), "Id"), Some("SC-1"));
    }
}
