//! Typed attribute and element reading over [`XmlNode`]
//!
//! Attribute values may be literals (`"1.5"`), parameter references
//! (`"$initialSpeed"`) or expressions (`"${$initialSpeed * 2}"`); references
//! are resolved through the lexical scope before the value is parsed into its
//! target type.

use crate::error::{Error, Result};
use crate::expression::evaluate_expression;
use crate::parser::xml::XmlNode;
use crate::scope::Scope;
use std::str::FromStr;

fn resolve_raw(raw: &str, node: &XmlNode, scope: &Scope) -> Result<String> {
    if let Some(expression) = raw.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
        let value = evaluate_expression(expression, &scope.visible_parameters())?;
        return Ok(format!("{}", value));
    }
    if let Some(parameter) = raw.strip_prefix('$') {
        let object = scope
            .resolve(parameter)
            .map_err(|e| e.with_context(&format!("in element '{}'", node.name())))?;
        return object
            .as_parameter()
            .map(str::to_string)
            .ok_or_else(|| Error::syntax(format!("'{}' does not name a parameter", parameter)));
    }
    Ok(raw.to_string())
}

fn parse_value<T: FromStr>(value: &str, attribute: &str, node: &XmlNode) -> Result<T> {
    value.parse::<T>().map_err(|_| {
        Error::syntax(format!(
            "cannot parse value '{}' of attribute '{}' in element '{}'",
            value,
            attribute,
            node.name()
        ))
    })
}

/// Read a required attribute, resolving parameter references through the scope
pub fn read_attribute<T: FromStr>(name: &str, node: &XmlNode, scope: &Scope) -> Result<T> {
    let raw = node.required_attribute(name)?;
    let resolved = resolve_raw(raw, node, scope)?;
    parse_value(&resolved, name, node)
}

/// Read an optional attribute; absent attributes yield `None`
pub fn read_optional_attribute<T: FromStr>(
    name: &str,
    node: &XmlNode,
    scope: &Scope,
) -> Result<Option<T>> {
    match node.attribute(name) {
        Some(raw) => {
            let resolved = resolve_raw(raw, node, scope)?;
            parse_value(&resolved, name, node).map(Some)
        }
        None => Ok(None),
    }
}

/// Read an optional attribute with a schema default
pub fn read_attribute_or<T: FromStr>(
    name: &str,
    node: &XmlNode,
    scope: &Scope,
    default: T,
) -> Result<T> {
    Ok(read_optional_attribute(name, node, scope)?.unwrap_or(default))
}
