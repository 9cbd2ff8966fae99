//! Unique id assignment and reference-URI resolution.
//!
//! Signature references and key references point at elements through
//! `#id` URIs. Ids are assigned before any reference is computed; during
//! verification every id-bearing attribute in the document (`wsu:Id`
//! resolved by namespace, plus unqualified `Id`/`id`) is registered as a
//! candidate target.

use crate::dom::{ns_lookup, Element, Node, NsDecl};
use crate::error::SecurityError;
use crate::ns::WSU_NS;
use rand::{CryptoRng, RngCore};
use std::collections::HashMap;

/// Generate a document-unique id with the given marker prefix.
pub fn generate_id<R: RngCore + CryptoRng>(prefix: &str, rng: &mut R) -> String {
    let mut buf = [0u8; 16];
    rng.fill_bytes(&mut buf);
    format!("{}-{}", prefix, hex::encode_upper(buf))
}

/// Return the element's `wsu:Id`, assigning a fresh one (and the `wsu`
/// namespace declaration it needs) when absent.
pub fn ensure_wsu_id<R: RngCore + CryptoRng>(
    el: &mut Element,
    prefix: &str,
    rng: &mut R,
) -> String {
    if let Some(existing) = el.attribute(Some("wsu"), "Id") {
        return existing.to_string();
    }
    let id = generate_id(prefix, rng);
    el.declare(Some("wsu"), WSU_NS);
    el.set_attribute(Some("wsu"), "Id", &id);
    id
}

/// Map from id to the child-index path of the element carrying it.
#[derive(Debug, Default)]
pub struct IdRegistry {
    map: HashMap<String, Vec<usize>>,
}

impl IdRegistry {
    /// Register every id-bearing attribute under `root`. Duplicate ids are
    /// a structural defect.
    pub fn scan(root: &Element) -> Result<Self, SecurityError> {
        let mut registry = Self::default();
        let mut scope: Vec<NsDecl> = Vec::new();
        registry.walk(root, &mut Vec::new(), &mut scope)?;
        Ok(registry)
    }

    fn walk(
        &mut self,
        el: &Element,
        path: &mut Vec<usize>,
        scope: &mut Vec<NsDecl>,
    ) -> Result<(), SecurityError> {
        let base = scope.len();
        scope.extend(el.namespaces.iter().cloned());

        for attr in &el.attributes {
            let is_id = match attr.prefix.as_deref() {
                None => attr.local == "Id" || attr.local == "id",
                Some(p) => attr.local == "Id" && ns_lookup(scope, Some(p)) == Some(WSU_NS),
            };
            if is_id {
                if self
                    .map
                    .insert(attr.value.clone(), path.clone())
                    .is_some()
                {
                    scope.truncate(base);
                    return Err(SecurityError::MalformedInput(format!(
                        "duplicate id '{}'",
                        attr.value
                    )));
                }
            }
        }

        for (i, child) in el.children.iter().enumerate() {
            if let Node::Element(e) = child {
                path.push(i);
                self.walk(e, path, scope)?;
                path.pop();
            }
        }
        scope.truncate(base);
        Ok(())
    }

    /// Resolve a `#id` reference URI to the path of its target element.
    pub fn resolve(&self, uri: &str) -> Result<&[usize], SecurityError> {
        let id = uri
            .strip_prefix('#')
            .ok_or_else(|| SecurityError::ReferenceNotFound(uri.to_string()))?;
        self.map
            .get(id)
            .map(Vec::as_slice)
            .ok_or_else(|| SecurityError::ReferenceNotFound(uri.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn doc() -> Element {
        parse(
            format!(
                r#"<r xmlns:wsu="{}"><a wsu:Id="id-1"/><b Id="EK-2"><c id="x"/></b></r>"#,
                WSU_NS
            )
            .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_scan_registers_all_id_flavors() {
        let root = doc();
        let registry = IdRegistry::scan(&root).unwrap();
        assert_eq!(registry.resolve("#id-1").unwrap(), &[0]);
        assert_eq!(registry.resolve("#EK-2").unwrap(), &[1]);
        assert_eq!(registry.resolve("#x").unwrap(), &[1, 0]);
    }

    #[test]
    fn test_wsu_id_requires_wsu_namespace() {
        // A prefixed Id bound to some other namespace is not an id target.
        let root =
            parse(br#"<r xmlns:other="urn:other"><a other:Id="id-1"/></r>"#).unwrap();
        let registry = IdRegistry::scan(&root).unwrap();
        assert!(matches!(
            registry.resolve("#id-1"),
            Err(SecurityError::ReferenceNotFound(_))
        ));
    }

    #[test]
    fn test_unresolved_uri_is_reference_not_found() {
        let registry = IdRegistry::scan(&doc()).unwrap();
        assert!(matches!(
            registry.resolve("#missing"),
            Err(SecurityError::ReferenceNotFound(_))
        ));
        assert!(matches!(
            registry.resolve("no-hash"),
            Err(SecurityError::ReferenceNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let root = parse(br#"<r><a Id="dup"/><b Id="dup"/></r>"#).unwrap();
        assert!(matches!(
            IdRegistry::scan(&root),
            Err(SecurityError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_ensure_wsu_id_assigns_once() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let mut el = Element::new(None, "Body");
        let id = ensure_wsu_id(&mut el, "id", &mut rng);
        assert!(id.starts_with("id-"));
        assert_eq!(el.attribute(Some("wsu"), "Id"), Some(id.as_str()));
        // Second call returns the same id without reassigning.
        let again = ensure_wsu_id(&mut el, "id", &mut rng);
        assert_eq!(id, again);
    }

    #[test]
    fn test_generated_ids_unique() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let a = generate_id("SIG", &mut rng);
        let b = generate_id("SIG", &mut rng);
        assert_ne!(a, b);
    }
}
