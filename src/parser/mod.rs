//! Scenario document parsing
//!
//! The simulator core never touches the XML syntax directly: `xml` builds an
//! owned [`XmlNode`](xml::XmlNode) tree from a quick-xml event stream, and
//! `reader` provides the typed attribute/element accessors the syntax layer
//! uses to construct itself from that tree.

pub mod reader;
pub mod xml;

pub use reader::{read_attribute, read_attribute_or, read_optional_attribute};
pub use xml::{parse_document, parse_document_file, XmlNode};
