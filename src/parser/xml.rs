//! XML tree construction using quick-xml
//!
//! Produces the narrow node interface the rest of the crate reads scenarios
//! through: `name()`, `attribute(name)`, `child(name)`, `children(name)`.
//! quick-xml stays confined to this file; everything downstream sees only
//! [`XmlNode`].

use crate::error::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;
use std::path::Path;

/// One element of a parsed XML document
#[derive(Debug, Clone, PartialEq)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
    text: String,
}

impl XmlNode {
    /// Element name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute value, if present
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First child element with the given name
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child elements with the given name, in document order
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// All child elements regardless of name
    pub fn all_children(&self) -> &[XmlNode] {
        &self.children
    }

    /// Concatenated, trimmed text content
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Child element that the schema requires to exist
    pub fn required_child(&self, name: &str) -> Result<&XmlNode> {
        self.child(name).ok_or_else(|| {
            Error::syntax(format!(
                "element '{}' requires a child element '{}'",
                self.name, name
            ))
        })
    }

    /// Attribute that the schema requires to exist
    pub fn required_attribute(&self, name: &str) -> Result<&str> {
        self.attribute(name).ok_or_else(|| {
            Error::syntax(format!(
                "element '{}' requires an attribute '{}'",
                self.name, name
            ))
        })
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlNode> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute =
            attribute.map_err(|e| Error::syntax(format!("malformed attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| Error::syntax(format!("malformed attribute value: {}", e)))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(XmlNode {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

/// Parse an XML document from a string; returns the root element
pub fn parse_document(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push(element_from(&start)?);
            }
            Ok(Event::Empty(start)) => {
                let node = element_from(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None if root.is_none() => root = Some(node),
                    None => return Err(Error::syntax("multiple root elements")),
                }
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| Error::syntax("unbalanced closing tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None if root.is_none() => root = Some(node),
                    None => return Err(Error::syntax("multiple root elements")),
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(top) = stack.last_mut() {
                    let unescaped = text
                        .decode()
                        .map_err(|e| Error::syntax(format!("malformed text content: {}", e)))?;
                    let trimmed = unescaped.trim();
                    if !trimmed.is_empty() {
                        top.text.push_str(trimmed);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::syntax(format!("malformed XML: {}", e))),
        }
    }

    if !stack.is_empty() {
        return Err(Error::syntax("unexpected end of document inside an element"));
    }
    root.ok_or_else(|| Error::syntax("document has no root element"))
}

/// Parse an XML document from the filesystem
pub fn parse_document_file<P: AsRef<Path>>(path: P) -> Result<XmlNode> {
    let content = fs::read_to_string(&path).map_err(|e| {
        Error::syntax(format!(
            "cannot read scenario file {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;
    parse_document(&content)
        .map_err(|e| e.with_context(&format!("in file {}", path.as_ref().display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements() {
        let root = parse_document(
            r#"<OpenSCENARIO>
                 <FileHeader author="test" revMajor="1"/>
                 <Storyboard><Init/></Storyboard>
               </OpenSCENARIO>"#,
        )
        .unwrap();
        assert_eq!(root.name(), "OpenSCENARIO");
        assert_eq!(
            root.child("FileHeader").unwrap().attribute("author"),
            Some("test")
        );
        assert!(root.child("Storyboard").unwrap().child("Init").is_some());
    }

    #[test]
    fn children_iterates_in_document_order() {
        let root =
            parse_document(r#"<Acts><Act name="a"/><Other/><Act name="b"/></Acts>"#).unwrap();
        let names: Vec<_> = root
            .children("Act")
            .map(|n| n.attribute("name").unwrap())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn text_content_is_trimmed() {
        let root = parse_document("<Name>  ego \n</Name>").unwrap();
        assert_eq!(root.text(), "ego");
    }

    #[test]
    fn attribute_entities_are_unescaped() {
        let root = parse_document(r#"<E value="a &amp; b"/>"#).unwrap();
        assert_eq!(root.attribute("value"), Some("a & b"));
    }

    #[test]
    fn missing_required_attribute_is_syntax_error() {
        let root = parse_document("<Vehicle/>").unwrap();
        let err = root.required_attribute("name").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn malformed_document_is_syntax_error() {
        let err = parse_document("<A><B></A>").unwrap_err();
        assert!(err.is_syntax());
    }
}
