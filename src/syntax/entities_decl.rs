//! Entity declarations from the scenario's Entities block

use crate::catalog::CatalogCache;
use crate::entity::parameters::{EntityParameters, PedestrianParameters, VehicleParameters};
use crate::error::{Error, Result};
use crate::parser::xml::XmlNode;
use crate::scope::{Object, Scope};
use std::sync::Arc;

/// A declared scenario object: the name the storyboard refers to plus the
/// static parameters of the entity behind it
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioObject {
    pub name: String,
    pub parameters: EntityParameters,
}

impl ScenarioObject {
    /// Parse one ScenarioObject element, resolving catalog references
    pub fn from_xml(node: &XmlNode, scope: &Scope, catalogs: &mut CatalogCache) -> Result<Self> {
        let name = node.required_attribute("name")?.to_string();
        let mut parameters: Option<EntityParameters> = None;
        for child in node.all_children() {
            match child.name() {
                "Vehicle" => {
                    parameters = Some(EntityParameters::Vehicle(VehicleParameters::from_xml(
                        child, scope,
                    )?));
                }
                "Pedestrian" => {
                    parameters = Some(EntityParameters::Pedestrian(
                        PedestrianParameters::from_xml(child, scope)?,
                    ));
                }
                "CatalogReference" => {
                    let (entry, entry_scope) = catalogs.resolve_reference(child, scope)?;
                    declare_entry_parameters(&entry, &entry_scope)?;
                    parameters = Some(match entry.name() {
                        "Vehicle" => EntityParameters::Vehicle(VehicleParameters::from_xml(
                            &entry,
                            &entry_scope,
                        )?),
                        "Pedestrian" => EntityParameters::Pedestrian(
                            PedestrianParameters::from_xml(&entry, &entry_scope)?,
                        ),
                        other => {
                            return Err(Error::unsupported_element(other, "CatalogReference"))
                        }
                    });
                }
                "ObjectController" => {
                    // Controller assignment is accepted and ignored; the
                    // follower controller is built in.
                }
                other => return Err(Error::unsupported_element(other, "ScenarioObject")),
            }
        }
        let parameters = parameters.ok_or_else(|| {
            Error::syntax(format!(
                "ScenarioObject '{}' declares no Vehicle, Pedestrian or CatalogReference",
                name
            ))
        })?;
        Ok(ScenarioObject { name, parameters })
    }
}

/// Declare the defaulted parameter declarations of a catalog entry into its
/// resolution scope, keeping any values assigned by the reference
fn declare_entry_parameters(entry: &XmlNode, entry_scope: &Scope) -> Result<()> {
    if let Some(declarations) = entry.child("ParameterDeclarations") {
        for declaration in declarations.children("ParameterDeclaration") {
            let name = declaration.required_attribute("name")?;
            let stripped = name.trim_start_matches('$');
            if entry_scope.resolve(stripped).is_err() {
                let value = declaration.required_attribute("value")?.to_string();
                entry_scope.define(stripped, Object::Parameter { value });
            }
        }
    }
    Ok(())
}

/// Parse the Entities element, defining every object into the scope and the
/// global environment
pub fn parse_entities(
    node: &XmlNode,
    scope: &Scope,
    catalogs: &mut CatalogCache,
) -> Result<Vec<Arc<ScenarioObject>>> {
    let mut objects = Vec::new();
    for child in node.all_children() {
        match child.name() {
            "ScenarioObject" => {
                let object = Arc::new(ScenarioObject::from_xml(child, scope, catalogs)?);
                scope.define(&object.name, Object::Entity(Arc::clone(&object)));
                scope
                    .global_mut()
                    .entities
                    .insert(object.name.clone(), Arc::clone(&object));
                objects.push(object);
            }
            other => return Err(Error::unsupported_element(other, "Entities")),
        }
    }
    Ok(objects)
}
