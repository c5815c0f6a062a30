//! Owned XML tree for package parts.
//!
//! Parts are parsed with `roxmltree` into an owned [`Element`] tree that the
//! pipeline mutates in place, and serialized back with `quick-xml` at the
//! assembler boundary. Qualified names are kept as written in the source
//! (`Cell`, `r:id`, ...) so round-tripping does not disturb prefixes; the
//! namespace declarations in scope at the root are captured and re-emitted
//! as plain attributes.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Qualified tag name as written (`Shape`, not `{ns}Shape`).
    pub name: String,
    /// Qualified attribute name/value pairs, xmlns declarations included.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// Strip an optional `prefix:` from a qualified name.
pub fn local_name(qname: &str) -> &str {
    match qname.rsplit_once(':') {
        Some((_, local)) => local,
        None => qname,
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn parse(xml: &str) -> std::result::Result<Element, roxmltree::Error> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc.root_element();
        let mut element = convert(root);

        // roxmltree strips xmlns attributes; re-materialize the root's
        // in-scope declarations so serialization stays self-describing.
        let mut decls: Vec<(String, String)> = Vec::new();
        for ns in root.namespaces() {
            let key = match ns.name() {
                Some(prefix) => format!("xmlns:{prefix}"),
                None => "xmlns".to_string(),
            };
            if ns.uri() != "http://www.w3.org/XML/1998/namespace" {
                decls.push((key, ns.uri().to_string()));
            }
        }
        decls.extend(element.attrs.drain(..));
        element.attrs = decls;
        Ok(element)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let idx = self.attrs.iter().position(|(k, _)| k == name)?;
        Some(self.attrs.remove(idx).1)
    }

    pub fn has_local_name(&self, local: &str) -> bool {
        local_name(&self.name) == local
    }

    /// Child elements with the given local name, prefixes ignored. The
    /// yielded references borrow `self` only, not the name.
    pub fn children_named<'a>(&'a self, local: &str) -> impl Iterator<Item = &'a Element> {
        self.child_elements()
            .filter(move |el| el.has_local_name(local))
    }

    pub fn children_named_mut<'a>(
        &'a mut self,
        local: &str,
    ) -> impl Iterator<Item = &'a mut Element> {
        self.child_elements_mut()
            .filter(move |el| el.has_local_name(local))
    }

    pub fn first_child_named(&self, local: &str) -> Option<&Element> {
        self.children_named(local).next()
    }

    pub fn first_child_named_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.children_named_mut(local).next()
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    pub fn push_element(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    /// Drop child elements for which the predicate returns false; text nodes
    /// are kept.
    pub fn retain_elements(&mut self, mut keep: impl FnMut(&Element) -> bool) {
        self.children.retain(|n| match n {
            Node::Element(el) => keep(el),
            Node::Text(_) => true,
        });
    }

    /// Concatenated descendant text, the way `Text` runs read in a shape.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Depth-first visit of every element in the subtree, self included.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Element)) {
        f(self);
        for child in self.child_elements() {
            child.walk(f);
        }
    }

    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        f(self);
        for child in self.child_elements_mut() {
            child.walk_mut(f);
        }
    }

    /// All descendant elements (any depth) with the given local name.
    pub fn descendants_named(&self, local: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.walk(&mut |el| {
            if el.has_local_name(local) {
                found.push(el);
            }
        });
        found
    }

    /// Serialize the tree with an XML declaration, no added indentation.
    pub fn to_xml_string(&self) -> String {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .expect("in-memory write");
        write_element(&mut writer, self);
        String::from_utf8(writer.into_inner()).expect("writer produces UTF-8")
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for node in &el.children {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(child) => collect_text(child, out),
        }
    }
}

fn convert(node: roxmltree::Node<'_, '_>) -> Element {
    let tag = node.tag_name();
    let name = match node.tag_name().namespace().and_then(|ns| node.lookup_prefix(ns)) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{}", tag.name()),
        _ => tag.name().to_string(),
    };

    let mut element = Element::new(name);
    for attr in node.attributes() {
        let key = match attr.namespace().and_then(|ns| node.lookup_prefix(ns)) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{}", attr.name()),
            _ => attr.name().to_string(),
        };
        element.attrs.push((key, attr.value().to_string()));
    }

    for child in node.children() {
        if child.is_element() {
            element.children.push(Node::Element(convert(child)));
        } else if child.is_text() {
            if let Some(text) = child.text() {
                element.children.push(Node::Text(text.to_string()));
            }
        }
    }
    element
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) {
    let mut start = BytesStart::new(el.name.as_str());
    for (k, v) in &el.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }

    if el.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .expect("in-memory write");
        return;
    }

    writer
        .write_event(Event::Start(start))
        .expect("in-memory write");
    for node in &el.children {
        match node {
            Node::Element(child) => write_element(writer, child),
            Node::Text(text) => {
                writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .expect("in-memory write");
            }
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .expect("in-memory write");
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<PageContents xmlns="http://schemas.microsoft.com/office/visio/2012/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <Shapes>
    <Shape ID="1" Type="Shape" Master="2">
      <Cell N="PinX" V="4.25"/>
      <Text>审批</Text>
    </Shape>
  </Shapes>
</PageContents>"#;

    #[test]
    fn parse_keeps_names_attrs_and_text() {
        let root = Element::parse(PAGE).unwrap();
        assert_eq!(root.name, "PageContents");
        assert_eq!(
            root.attr("xmlns"),
            Some("http://schemas.microsoft.com/office/visio/2012/main")
        );
        assert!(root.attr("xmlns:r").is_some());

        let shape = &root.descendants_named("Shape")[0];
        assert_eq!(shape.attr("ID"), Some("1"));
        assert_eq!(shape.attr("Master"), Some("2"));
        let cell = shape.first_child_named("Cell").unwrap();
        assert_eq!(cell.attr("V"), Some("4.25"));
        assert_eq!(
            shape.first_child_named("Text").unwrap().text_content(),
            "审批"
        );
    }

    #[test]
    fn serialize_round_trips_through_parse() {
        let root = Element::parse(PAGE).unwrap();
        let emitted = root.to_xml_string();
        let again = Element::parse(&emitted).unwrap();
        assert_eq!(root, again);
        assert!(emitted.starts_with("<?xml version=\"1.0\""));
    }

    #[test]
    fn qualified_attribute_prefix_is_preserved() {
        let xml = r#"<Masters xmlns="http://schemas.microsoft.com/office/visio/2012/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><Master ID="3"><Rel r:id="rId1"/></Master></Masters>"#;
        let root = Element::parse(xml).unwrap();
        let rel = &root.descendants_named("Rel")[0];
        assert_eq!(rel.attr("r:id"), Some("rId1"));
        assert!(root.to_xml_string().contains("r:id=\"rId1\""));
    }

    #[test]
    fn child_lookup_does_not_borrow_the_name() {
        let root = Element::parse(PAGE).unwrap();
        let shapes = {
            let name = String::from("Shapes");
            root.first_child_named(&name)
        };
        assert!(shapes.is_some());
    }

    #[test]
    fn retain_and_mutate_children() {
        let mut root = Element::parse(PAGE).unwrap();
        let shapes = root.first_child_named_mut("Shapes").unwrap();
        let shape = shapes.first_child_named_mut("Shape").unwrap();
        shape.set_attr("Master", "9");
        shape.remove_attr("Type");
        shape.retain_elements(|el| !el.has_local_name("Cell"));
        assert_eq!(shape.attr("Master"), Some("9"));
        assert!(shape.attr("Type").is_none());
        assert!(shape.first_child_named("Cell").is_none());
        assert!(shape.first_child_named("Text").is_some());
    }
}
