//! Owned XML element tree.
//!
//! Parsed with quick-xml, which is safe against XXE by default (doesn't
//! expand entities); a pre-scan for DOCTYPE/ENTITY patterns is kept as
//! belt-and-suspenders. The tree is what the security engines mutate:
//! text is stored unescaped and serialization is deterministic, so a
//! serialize/parse round trip preserves canonical form.

use crate::error::SecurityError;
use quick_xml::events::Event;
use quick_xml::Reader;

/// A namespace declaration: `(None, uri)` for `xmlns=`, `(Some(p), uri)` for `xmlns:p=`.
pub type NsDecl = (Option<String>, String);

/// An XML attribute. Namespace declarations are kept separately on [`Element`].
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub prefix: Option<String>,
    pub local: String,
    pub value: String,
}

/// An element or text node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with its namespace declarations, attributes and children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub prefix: Option<String>,
    pub local: String,
    pub namespaces: Vec<NsDecl>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    /// Create an empty element.
    pub fn new(prefix: Option<&str>, local: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// `prefix:local`, or just `local` for unprefixed elements.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }

    /// Add a namespace declaration unless an identical one is already present.
    pub fn declare(&mut self, prefix: Option<&str>, uri: &str) {
        let prefix = prefix.map(str::to_string);
        if !self
            .namespaces
            .iter()
            .any(|(p, u)| *p == prefix && u == uri)
        {
            self.namespaces.push((prefix, uri.to_string()));
        }
    }

    /// Set an attribute, replacing any existing one with the same name.
    pub fn set_attribute(&mut self, prefix: Option<&str>, local: &str, value: &str) {
        let prefix = prefix.map(str::to_string);
        if let Some(attr) = self
            .attributes
            .iter_mut()
            .find(|a| a.prefix == prefix && a.local == local)
        {
            attr.value = value.to_string();
            return;
        }
        self.attributes.push(Attribute {
            prefix,
            local: local.to_string(),
            value: value.to_string(),
        });
    }

    /// Look up an attribute value by prefix and local name.
    pub fn attribute(&self, prefix: Option<&str>, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.prefix.as_deref() == prefix && a.local == local)
            .map(|a| a.value.as_str())
    }

    /// Look up an attribute value by local name alone, ignoring the prefix.
    pub fn attribute_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local == local)
            .map(|a| a.value.as_str())
    }

    /// Append a child element.
    pub fn add_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Append a text child.
    pub fn add_text(&mut self, text: &str) {
        self.children.push(Node::Text(text.to_string()));
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let Node::Text(t) = child {
                out.push_str(t);
            }
        }
        out
    }

    /// First direct child element with the given local name.
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.children.iter().find_map(|n| match n {
            Node::Element(e) if e.local == local => Some(e),
            _ => None,
        })
    }

    /// Mutable variant of [`Element::child`].
    pub fn child_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) if e.local == local => Some(e),
            _ => None,
        })
    }

    /// Index of the first direct child element with the given local name.
    pub fn child_index(&self, local: &str) -> Option<usize> {
        self.children.iter().position(|n| match n {
            Node::Element(e) => e.local == local,
            _ => false,
        })
    }

    /// Depth-first search (including self) for an element by local name.
    pub fn find(&self, local: &str) -> Option<&Element> {
        if self.local == local {
            return Some(self);
        }
        for child in &self.children {
            if let Node::Element(e) = child {
                if let Some(found) = e.find(local) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Mutable variant of [`Element::find`].
    pub fn find_mut(&mut self, local: &str) -> Option<&mut Element> {
        if self.local == local {
            return Some(self);
        }
        for child in &mut self.children {
            if let Node::Element(e) = child {
                if let Some(found) = e.find_mut(local) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Depth-first path (child indices) to the first element with the given
    /// local name. An empty path means the element itself matched.
    pub fn find_path(&self, local: &str) -> Option<Vec<usize>> {
        if self.local == local {
            return Some(Vec::new());
        }
        for (i, child) in self.children.iter().enumerate() {
            if let Node::Element(e) = child {
                if let Some(mut sub) = e.find_path(local) {
                    sub.insert(0, i);
                    return Some(sub);
                }
            }
        }
        None
    }

    /// Element at a child-index path produced by [`Element::find_path`].
    pub fn node_at(&self, path: &[usize]) -> Option<&Element> {
        let mut cur = self;
        for &i in path {
            cur = match cur.children.get(i)? {
                Node::Element(e) => e,
                Node::Text(_) => return None,
            };
        }
        Some(cur)
    }

    /// Mutable variant of [`Element::node_at`].
    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut cur = self;
        for &i in path {
            cur = match cur.children.get_mut(i)? {
                Node::Element(e) => e,
                Node::Text(_) => return None,
            };
        }
        Some(cur)
    }

    /// Serialize the subtree. Declarations and attributes keep document
    /// order; empty elements are written as a start/end pair so that the
    /// output re-parses into an identical tree.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write(&mut out);
        out
    }

    fn write(&self, out: &mut String) {
        let name = self.qualified_name();
        out.push('<');
        out.push_str(&name);
        for (prefix, uri) in &self.namespaces {
            match prefix {
                Some(p) => {
                    out.push_str(&format!(" xmlns:{}=\"{}\"", p, escape_attr(uri)));
                }
                None => {
                    out.push_str(&format!(" xmlns=\"{}\"", escape_attr(uri)));
                }
            }
        }
        for attr in &self.attributes {
            let attr_name = match &attr.prefix {
                Some(p) => format!("{}:{}", p, attr.local),
                None => attr.local.clone(),
            };
            out.push_str(&format!(" {}=\"{}\"", attr_name, escape_attr(&attr.value)));
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(e) => e.write(out),
                Node::Text(t) => out.push_str(&escape_text(t)),
            }
        }
        out.push_str("</");
        out.push_str(&name);
        out.push('>');
    }
}

/// Namespace declarations of every ancestor of the element at `path`,
/// outermost first. The element's own declarations are not included.
pub fn scope_along_path(root: &Element, path: &[usize]) -> Vec<NsDecl> {
    let mut scope = Vec::new();
    let mut cur = root;
    for &i in path {
        scope.extend(cur.namespaces.iter().cloned());
        cur = match cur.children.get(i) {
            Some(Node::Element(e)) => e,
            _ => break,
        };
    }
    scope
}

/// Resolve a prefix against a scope, innermost declaration winning.
pub fn ns_lookup<'a>(scope: &'a [NsDecl], prefix: Option<&str>) -> Option<&'a str> {
    scope
        .iter()
        .rev()
        .find(|(p, _)| p.as_deref() == prefix)
        .map(|(_, uri)| uri.as_str())
}

/// Parse a complete XML document into its root element.
pub fn parse(data: &[u8]) -> Result<Element, SecurityError> {
    let xml = std::str::from_utf8(data)
        .map_err(|e| SecurityError::MalformedInput(format!("invalid UTF-8: {}", e)))?;

    check_xxe_patterns(xml)?;

    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if root.is_some() {
                    return Err(SecurityError::MalformedInput(
                        "content after document element".to_string(),
                    ));
                }
                stack.push(element_from_start(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                if root.is_some() {
                    return Err(SecurityError::MalformedInput(
                        "content after document element".to_string(),
                    ));
                }
                let el = element_from_start(e)?;
                match stack.last_mut() {
                    Some(parent) => parent.add_child(el),
                    None => root = Some(el),
                }
            }
            Ok(Event::End(_)) => {
                let el = stack.pop().ok_or_else(|| {
                    SecurityError::MalformedInput("unbalanced end tag".to_string())
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.add_child(el),
                    None => root = Some(el),
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| SecurityError::MalformedInput(format!("bad text: {}", e)))?;
                if let Some(parent) = stack.last_mut() {
                    parent.add_text(&text);
                }
                // Whitespace outside the document element is dropped.
            }
            Ok(Event::CData(ref e)) => {
                let text = std::str::from_utf8(e).map_err(|e| {
                    SecurityError::MalformedInput(format!("invalid UTF-8 in CDATA: {}", e))
                })?;
                if let Some(parent) = stack.last_mut() {
                    parent.add_text(text);
                }
            }
            Ok(Event::Comment(_)) | Ok(Event::Decl(_)) => {}
            Ok(Event::DocType(_)) => {
                return Err(SecurityError::MalformedInput(
                    "DOCTYPE declarations are not allowed".to_string(),
                ));
            }
            Ok(Event::PI(_)) => {
                return Err(SecurityError::MalformedInput(
                    "processing instructions are not allowed".to_string(),
                ));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {
                return Err(SecurityError::MalformedInput(
                    "unsupported XML construct".to_string(),
                ));
            }
            Err(e) => {
                return Err(SecurityError::MalformedInput(format!(
                    "XML parse error: {}",
                    e
                )));
            }
        }
    }

    if !stack.is_empty() {
        return Err(SecurityError::MalformedInput(
            "unexpected end of document".to_string(),
        ));
    }
    root.ok_or_else(|| SecurityError::MalformedInput("no document element".to_string()))
}

/// Parse a markup fragment into a list of nodes. The fragment may hold
/// several sibling elements and interleaved text.
pub fn parse_fragment(text: &str) -> Result<Vec<Node>, SecurityError> {
    let wrapped = format!("<fragment-wrapper>{}</fragment-wrapper>", text);
    let root = parse(wrapped.as_bytes())?;
    Ok(root.children)
}

fn element_from_start(e: &quick_xml::events::BytesStart) -> Result<Element, SecurityError> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|e| SecurityError::MalformedInput(format!("invalid UTF-8 in name: {}", e)))?
        .to_string();
    let (prefix, local) = split_qname(&name);
    let mut el = Element::new(prefix.as_deref(), &local);

    for attr in e.attributes() {
        let attr = attr
            .map_err(|e| SecurityError::MalformedInput(format!("bad attribute: {}", e)))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| SecurityError::MalformedInput(format!("invalid UTF-8 in attribute: {}", e)))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| SecurityError::MalformedInput(format!("bad attribute value: {}", e)))?
            .into_owned();

        if key == "xmlns" {
            el.namespaces.push((None, value));
        } else if let Some(p) = key.strip_prefix("xmlns:") {
            el.namespaces.push((Some(p.to_string()), value));
        } else {
            let (aprefix, alocal) = split_qname(&key);
            el.attributes.push(Attribute {
                prefix: aprefix,
                local: alocal,
                value,
            });
        }
    }
    Ok(el)
}

fn split_qname(name: &str) -> (Option<String>, String) {
    match name.split_once(':') {
        Some((p, l)) => (Some(p.to_string()), l.to_string()),
        None => (None, name.to_string()),
    }
}

/// Check for XXE attack patterns before handing the bytes to the parser.
fn check_xxe_patterns(xml: &str) -> Result<(), SecurityError> {
    if xml.contains("<!DOCTYPE") || xml.contains("<!doctype") {
        return Err(SecurityError::MalformedInput(
            "DOCTYPE declarations are not allowed".to_string(),
        ));
    }
    if xml.contains("<!ENTITY") || xml.contains("<!entity") {
        return Err(SecurityError::MalformedInput(
            "entity declarations are not allowed".to_string(),
        ));
    }
    if (xml.contains("SYSTEM") || xml.contains("PUBLIC")) && xml.contains("<!") {
        return Err(SecurityError::MalformedInput(
            "external entity references are not allowed".to_string(),
        ));
    }
    Ok(())
}

/// Escape character data.
pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape an attribute value.
pub fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:dto="urn:example:dto"><soapenv:Body><dto:GetSessionRequest><canal>SP</canal></dto:GetSessionRequest></soapenv:Body></soapenv:Envelope>"#;

    #[test]
    fn test_parse_basic_structure() {
        let root = parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(root.local, "Envelope");
        assert_eq!(root.prefix.as_deref(), Some("soapenv"));
        assert_eq!(root.namespaces.len(), 2);
        let body = root.child("Body").unwrap();
        let op = body.child("GetSessionRequest").unwrap();
        assert_eq!(op.prefix.as_deref(), Some("dto"));
        assert_eq!(op.child("canal").unwrap().text(), "SP");
    }

    #[test]
    fn test_serialize_round_trip() {
        let root = parse(SAMPLE.as_bytes()).unwrap();
        let serialized = root.to_xml();
        let reparsed = parse(serialized.as_bytes()).unwrap();
        assert_eq!(root, reparsed);
    }

    #[test]
    fn test_text_escaping_round_trip() {
        let xml = r#"<a b="x &amp; &quot;y&quot;">1 &lt; 2 &amp; 3</a>"#;
        let root = parse(xml.as_bytes()).unwrap();
        assert_eq!(root.text(), "1 < 2 & 3");
        assert_eq!(root.attribute(None, "b"), Some(r#"x & "y""#));
        let reparsed = parse(root.to_xml().as_bytes()).unwrap();
        assert_eq!(root, reparsed);
    }

    #[test]
    fn test_doctype_rejected() {
        let xml = r#"<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]><a>&xxe;</a>"#;
        let result = parse(xml.as_bytes());
        assert!(matches!(result, Err(SecurityError::MalformedInput(_))));
    }

    #[test]
    fn test_unbalanced_rejected() {
        assert!(parse(b"<a><b></a>").is_err());
        assert!(parse(b"<a>").is_err());
        assert!(parse(b"not xml").is_err());
    }

    #[test]
    fn test_find_path_and_node_at() {
        let root = parse(SAMPLE.as_bytes()).unwrap();
        let path = root.find_path("canal").unwrap();
        assert_eq!(path, vec![0, 0, 0]);
        assert_eq!(root.node_at(&path).unwrap().local, "canal");
    }

    #[test]
    fn test_scope_along_path() {
        let root = parse(SAMPLE.as_bytes()).unwrap();
        let path = root.find_path("GetSessionRequest").unwrap();
        let scope = scope_along_path(&root, &path);
        assert_eq!(
            ns_lookup(&scope, Some("dto")),
            Some("urn:example:dto")
        );
        assert_eq!(
            ns_lookup(&scope, Some("soapenv")),
            Some("http://schemas.xmlsoap.org/soap/envelope/")
        );
        assert_eq!(ns_lookup(&scope, Some("missing")), None);
    }

    #[test]
    fn test_parse_fragment_multiple_roots() {
        let nodes = parse_fragment("<a>1</a><b>2</b>").unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_self_closing_equals_empty_pair() {
        let a = parse(b"<a><b/></a>").unwrap();
        let b = parse(b"<a><b></b></a>").unwrap();
        assert_eq!(a, b);
    }
}
