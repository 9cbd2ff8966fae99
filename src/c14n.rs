//! Exclusive XML canonicalization (exc-c14n).
//!
//! Digest and signature values are computed over canonical bytes, so this
//! serialization must match what the peer's stack produces for the same
//! fragment: namespace declarations are emitted only where visibly
//! utilized (plus the InclusiveNamespaces prefix list), sorted by prefix;
//! attributes are sorted by (namespace URI, local name); character data
//! uses the canonical escape set.
//!
//! Comments are never canonicalized; the parser in [`crate::dom`] already
//! drops them.

use crate::dom::{ns_lookup, Element, Node, NsDecl};
use crate::error::SecurityError;
use std::collections::BTreeMap;

/// Canonicalize a subtree.
///
/// `ancestor_scope` holds the namespace declarations in scope at the
/// element (outermost first, the element's own excluded) — see
/// [`crate::dom::scope_along_path`]. `inclusive_prefixes` is the
/// InclusiveNamespaces prefix list of the transform; listed prefixes are
/// rendered wherever they are in scope even when not visibly utilized.
pub fn canonicalize(
    el: &Element,
    ancestor_scope: &[NsDecl],
    inclusive_prefixes: &[String],
) -> Result<String, SecurityError> {
    let mut scope: Vec<NsDecl> = ancestor_scope.to_vec();
    let mut out = String::new();
    render(el, &mut scope, &BTreeMap::new(), inclusive_prefixes, &mut out)?;
    Ok(out)
}

/// Canonicalize the child nodes of an element (element content), in order.
/// Used for encrypting Body content: the Body tag itself is not part of
/// the plaintext.
pub fn canonicalize_content(
    el: &Element,
    scope_at_el: &[NsDecl],
    inclusive_prefixes: &[String],
) -> Result<String, SecurityError> {
    let mut scope: Vec<NsDecl> = scope_at_el.to_vec();
    scope.extend(el.namespaces.iter().cloned());
    let mut out = String::new();
    for child in &el.children {
        match child {
            Node::Element(e) => {
                let mut child_scope = scope.clone();
                render(
                    e,
                    &mut child_scope,
                    &BTreeMap::new(),
                    inclusive_prefixes,
                    &mut out,
                )?;
            }
            Node::Text(t) => out.push_str(&escape_text(t)),
        }
    }
    Ok(out)
}

/// `rendered` maps prefixes to the namespace URI already emitted on an
/// output ancestor; `None` is the default namespace. `BTreeMap` keeps the
/// canonical prefix ordering (default namespace first).
fn render(
    el: &Element,
    scope: &mut Vec<NsDecl>,
    rendered: &BTreeMap<Option<String>, String>,
    inclusive: &[String],
    out: &mut String,
) -> Result<(), SecurityError> {
    let base = scope.len();
    scope.extend(el.namespaces.iter().cloned());

    // Prefixes to consider at this element: the element's own and those of
    // its attributes are required; the inclusive list is opportunistic.
    let mut wanted: BTreeMap<Option<String>, bool> = BTreeMap::new();
    wanted.insert(el.prefix.clone(), true);
    for attr in &el.attributes {
        if attr.prefix.is_some() {
            wanted.insert(attr.prefix.clone(), true);
        }
    }
    for p in inclusive {
        wanted.entry(Some(p.clone())).or_insert(false);
    }

    let mut rendered_here = rendered.clone();
    let mut decls: Vec<NsDecl> = Vec::new();
    for (prefix, required) in wanted {
        match ns_lookup(scope, prefix.as_deref()) {
            Some(uri) if !uri.is_empty() => {
                if rendered_here.get(&prefix).map(String::as_str) != Some(uri) {
                    decls.push((prefix.clone(), uri.to_string()));
                    rendered_here.insert(prefix, uri.to_string());
                }
            }
            _ => {
                if prefix.is_none() {
                    // No default namespace in scope; undeclare it if an
                    // output ancestor rendered one.
                    if rendered_here
                        .get(&None)
                        .map(|u| !u.is_empty())
                        .unwrap_or(false)
                    {
                        decls.push((None, String::new()));
                        rendered_here.insert(None, String::new());
                    }
                } else if required {
                    scope.truncate(base);
                    return Err(SecurityError::Canonicalization(format!(
                        "undeclared namespace prefix '{}'",
                        prefix.as_deref().unwrap_or("")
                    )));
                }
                // An inclusive-list prefix not in scope is skipped.
            }
        }
    }

    // Attribute order: no-namespace attributes first, then by
    // (namespace URI, local name).
    let mut attrs: Vec<(String, &crate::dom::Attribute)> = Vec::with_capacity(el.attributes.len());
    for attr in &el.attributes {
        let uri = match attr.prefix.as_deref() {
            None => String::new(),
            Some(p) => ns_lookup(scope, Some(p))
                .ok_or_else(|| {
                    SecurityError::Canonicalization(format!(
                        "undeclared namespace prefix '{}'",
                        p
                    ))
                })?
                .to_string(),
        };
        attrs.push((uri, attr));
    }
    attrs.sort_by(|(ua, a), (ub, b)| (ua, &a.local).cmp(&(ub, &b.local)));

    let name = el.qualified_name();
    out.push('<');
    out.push_str(&name);
    for (prefix, uri) in &decls {
        match prefix {
            Some(p) => out.push_str(&format!(" xmlns:{}=\"{}\"", p, escape_attr(uri))),
            None => out.push_str(&format!(" xmlns=\"{}\"", escape_attr(uri))),
        }
    }
    for (_, attr) in &attrs {
        let attr_name = match &attr.prefix {
            Some(p) => format!("{}:{}", p, attr.local),
            None => attr.local.clone(),
        };
        out.push_str(&format!(" {}=\"{}\"", attr_name, escape_attr(&attr.value)));
    }
    out.push('>');

    for child in &el.children {
        match child {
            Node::Element(e) => render(e, scope, &rendered_here, inclusive, out)?,
            Node::Text(t) => out.push_str(&escape_text(t)),
        }
    }

    out.push_str("</");
    out.push_str(&name);
    out.push('>');

    scope.truncate(base);
    Ok(())
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\r', "&#xD;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
        .replace('\t', "&#x9;")
        .replace('\n', "&#xA;")
        .replace('\r', "&#xD;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse;

    #[test]
    fn test_attribute_and_namespace_sorting() {
        let el = parse(br#"<b:foo xmlns:b="urn:b" xmlns:a="urn:a" z="1" a:x="2"/>"#).unwrap();
        let canonical = canonicalize(&el, &[], &[]).unwrap();
        assert_eq!(
            canonical,
            r#"<b:foo xmlns:a="urn:a" xmlns:b="urn:b" z="1" a:x="2"></b:foo>"#
        );
    }

    #[test]
    fn test_redundant_declaration_suppressed() {
        let el = parse(br#"<s:a xmlns:s="urn:s"><s:b xmlns:s="urn:s">x</s:b></s:a>"#).unwrap();
        let canonical = canonicalize(&el, &[], &[]).unwrap();
        assert_eq!(canonical, r#"<s:a xmlns:s="urn:s"><s:b>x</s:b></s:a>"#);
    }

    #[test]
    fn test_unused_declaration_excluded() {
        // Exclusive c14n drops declarations that are not visibly utilized.
        let el = parse(br#"<s:a xmlns:s="urn:s" xmlns:unused="urn:u">x</s:a>"#).unwrap();
        let canonical = canonicalize(&el, &[], &[]).unwrap();
        assert_eq!(canonical, r#"<s:a xmlns:s="urn:s">x</s:a>"#);
    }

    #[test]
    fn test_inclusive_prefix_list_pulls_ancestor_declaration() {
        let root = parse(br#"<r xmlns:d="urn:d" xmlns:s="urn:s"><s:child>hi</s:child></r>"#)
            .unwrap();
        let child = root.child("child").unwrap();
        let scope = crate::dom::scope_along_path(&root, &[0]);

        let without = canonicalize(child, &scope, &[]).unwrap();
        assert_eq!(without, r#"<s:child xmlns:s="urn:s">hi</s:child>"#);

        let with = canonicalize(child, &scope, &["d".to_string()]).unwrap();
        assert_eq!(
            with,
            r#"<s:child xmlns:d="urn:d" xmlns:s="urn:s">hi</s:child>"#
        );
    }

    #[test]
    fn test_inclusive_prefix_not_in_scope_skipped() {
        let el = parse(br#"<a>x</a>"#).unwrap();
        let canonical = canonicalize(&el, &[], &["ghost".to_string()]).unwrap();
        assert_eq!(canonical, "<a>x</a>");
    }

    #[test]
    fn test_undeclared_element_prefix_is_error() {
        let el = Element::new(Some("nope"), "a");
        let result = canonicalize(&el, &[], &[]);
        assert!(matches!(result, Err(SecurityError::Canonicalization(_))));
    }

    #[test]
    fn test_character_escaping() {
        let el = parse(br#"<a b="&quot;q&quot;">1 &amp; 2 &lt; 3 &gt; 0</a>"#).unwrap();
        let canonical = canonicalize(&el, &[], &[]).unwrap();
        assert_eq!(canonical, r#"<a b="&quot;q&quot;">1 &amp; 2 &lt; 3 &gt; 0</a>"#);
    }

    #[test]
    fn test_default_namespace_rendered_for_unprefixed_element() {
        let el = parse(br#"<a xmlns="urn:x"><b>y</b></a>"#).unwrap();
        let canonical = canonicalize(&el, &[], &[]).unwrap();
        assert_eq!(canonical, r#"<a xmlns="urn:x"><b>y</b></a>"#);
    }

    #[test]
    fn test_content_canonicalization_makes_fragment_self_contained() {
        let root = parse(
            br#"<r xmlns:d="urn:d"><body><d:op><canal>SP</canal></d:op></body></r>"#,
        )
        .unwrap();
        let body = root.child("body").unwrap();
        let scope = crate::dom::scope_along_path(&root, &[0]);
        let content = canonicalize_content(body, &scope, &[]).unwrap();
        assert_eq!(content, r#"<d:op xmlns:d="urn:d"><canal>SP</canal></d:op>"#);
    }

    #[test]
    fn test_stable_across_serialize_parse_round_trip() {
        let xml = r#"<s:a xmlns:s="urn:s" xmlns:t="urn:t" t:k="v"><s:b>text &amp; more</s:b></s:a>"#;
        let el = parse(xml.as_bytes()).unwrap();
        let first = canonicalize(&el, &[], &[]).unwrap();
        let reparsed = parse(el.to_xml().as_bytes()).unwrap();
        let second = canonicalize(&reparsed, &[], &[]).unwrap();
        assert_eq!(first, second);
    }
}
