//! Catalog locations and lazy catalog resolution
//!
//! Catalog files are ordinary OpenSCENARIO documents carrying a `<Catalog>`
//! element. The scenario registers directories per catalog location element
//! (VehicleCatalog, PedestrianCatalog, ...); a `CatalogReference
//! (catalogName, entryName)` is resolved by lazily scanning the registered
//! directories for a catalog with the matching name, then picking the entry
//! whose `name` attribute matches. Parsed files are cached per path, and
//! `ParameterAssignments` on the reference become scope parameters for the
//! entry subtree.

use crate::error::{Error, Result};
use crate::parser::xml::{parse_document_file, XmlNode};
use crate::scope::{Object, Scope};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Catalog location element names recognized in CatalogLocations
const CATALOG_LOCATION_ELEMENTS: &[&str] = &[
    "VehicleCatalog",
    "ControllerCatalog",
    "PedestrianCatalog",
    "MiscObjectCatalog",
    "EnvironmentCatalog",
    "ManeuverCatalog",
    "TrajectoryCatalog",
    "RouteCatalog",
];

/// Register catalog directories from a CatalogLocations element into the
/// global environment. Relative paths are resolved against the scenario file
/// directory.
pub fn register_catalog_locations(node: &XmlNode, scope: &Scope) -> Result<()> {
    let base = scope
        .global()
        .pathname
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    for name in CATALOG_LOCATION_ELEMENTS {
        if let Some(location) = node.child(name) {
            let directory = location.required_child("Directory")?;
            let path = PathBuf::from(directory.required_attribute("path")?);
            let resolved = if path.is_absolute() {
                path
            } else {
                base.join(path)
            };
            scope
                .global_mut()
                .catalog_locations
                .insert(name.to_string(), resolved);
        }
    }
    Ok(())
}

/// Cache of parsed catalog documents, keyed by file path
#[derive(Debug)]
pub struct CatalogCache {
    documents: HashMap<PathBuf, Option<XmlNode>>,
    substitution: Regex,
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogCache {
    pub fn new() -> Self {
        #[allow(clippy::unwrap_used)]
        let substitution = Regex::new(r"\$\{([^}]+)\}").unwrap();
        CatalogCache {
            documents: HashMap::new(),
            substitution,
        }
    }

    fn document(&mut self, path: &Path) -> Option<&XmlNode> {
        if !self.documents.contains_key(path) {
            let parsed = parse_document_file(path).ok();
            self.documents.insert(path.to_path_buf(), parsed);
        }
        self.documents.get(path).and_then(Option::as_ref)
    }

    /// Resolve a CatalogReference element to the entry subtree and a child
    /// scope carrying the reference's parameter assignments
    pub fn resolve_reference(
        &mut self,
        reference: &XmlNode,
        scope: &Scope,
    ) -> Result<(XmlNode, Scope)> {
        let catalog_name = reference.required_attribute("catalogName")?;
        let entry_name = reference.required_attribute("entryName")?;
        let directories: Vec<PathBuf> =
            scope.global().catalog_locations.values().cloned().collect();
        for directory in directories {
            let mut files: Vec<PathBuf> = std::fs::read_dir(&directory)
                .map(|entries| {
                    entries
                        .filter_map(|entry| entry.ok().map(|e| e.path()))
                        .filter(|path| {
                            path.extension().map(|ext| ext == "xosc").unwrap_or(false)
                        })
                        .collect()
                })
                .unwrap_or_default();
            files.sort();
            for file in files {
                let Some(document) = self.document(&file) else {
                    continue;
                };
                let Some(catalog) = document
                    .children("Catalog")
                    .find(|c| c.attribute("name") == Some(catalog_name))
                else {
                    continue;
                };
                if let Some(entry) = catalog
                    .all_children()
                    .iter()
                    .find(|child| child.attribute("name") == Some(entry_name))
                {
                    let entry_scope = scope.make_child("");
                    apply_parameter_assignments(reference, scope, &entry_scope)?;
                    tracing::debug!(
                        catalog = catalog_name,
                        entry = entry_name,
                        file = %file.display(),
                        "catalog entry resolved"
                    );
                    return Ok((entry.clone(), entry_scope));
                }
            }
        }
        Err(Error::catalog_entry_not_found(catalog_name, entry_name))
    }

    /// Substitute `${...}` references in a raw string against the scope (used
    /// for parameterized catalog attribute values)
    pub fn substitute(&self, raw: &str, scope: &Scope) -> Result<String> {
        if !self.substitution.is_match(raw) {
            return Ok(raw.to_string());
        }
        let parameters = scope.visible_parameters();
        let mut result = String::new();
        let mut last = 0;
        for capture in self.substitution.captures_iter(raw) {
            let whole = capture.get(0).ok_or_else(|| Error::syntax("bad capture"))?;
            let name = &capture[1];
            result.push_str(&raw[last..whole.start()]);
            let value = parameters
                .get(name)
                .ok_or_else(|| Error::no_such_name(name))?;
            result.push_str(value);
            last = whole.end();
        }
        result.push_str(&raw[last..]);
        Ok(result)
    }
}

fn apply_parameter_assignments(
    reference: &XmlNode,
    outer: &Scope,
    entry_scope: &Scope,
) -> Result<()> {
    if let Some(assignments) = reference.child("ParameterAssignments") {
        for assignment in assignments.children("ParameterAssignment") {
            let name = assignment.required_attribute("parameterRef")?;
            let value: String =
                crate::parser::reader::read_attribute("value", assignment, outer)?;
            entry_scope.define(name.trim_start_matches('$'), Object::Parameter { value });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG_XML: &str = r#"<?xml version="1.0"?>
<OpenSCENARIO>
  <FileHeader author="test" date="2024-01-01" description="vehicles" revMajor="1" revMinor="0"/>
  <Catalog name="VehicleCatalog">
    <Vehicle name="sedan" vehicleCategory="car">
      <ParameterDeclarations>
        <ParameterDeclaration name="maxSpeed" parameterType="double" value="20"/>
      </ParameterDeclarations>
      <BoundingBox>
        <Center x="1.4" y="0.0" z="0.9"/>
        <Dimensions width="2.0" length="4.5" height="1.8"/>
      </BoundingBox>
      <Performance maxSpeed="$maxSpeed" maxAcceleration="3" maxDeceleration="5"/>
      <Axles>
        <FrontAxle maxSteering="0.5" wheelDiameter="0.6" trackWidth="1.8" positionX="2.8" positionZ="0.3"/>
        <RearAxle maxSteering="0.0" wheelDiameter="0.6" trackWidth="1.8" positionX="0.0" positionZ="0.3"/>
      </Axles>
    </Vehicle>
  </Catalog>
</OpenSCENARIO>"#;

    fn catalog_fixture() -> (tempfile::TempDir, Scope) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vehicles.xosc");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(CATALOG_XML.as_bytes()).unwrap();
        let scope = Scope::make_root(dir.path().join("scenario.xosc"));
        scope
            .global_mut()
            .catalog_locations
            .insert("VehicleCatalog".to_string(), dir.path().to_path_buf());
        (dir, scope)
    }

    #[test]
    fn resolves_an_entry_by_catalog_and_name() {
        let (_dir, scope) = catalog_fixture();
        let mut cache = CatalogCache::new();
        let reference = crate::parser::xml::parse_document(
            r#"<CatalogReference catalogName="VehicleCatalog" entryName="sedan"/>"#,
        )
        .unwrap();
        let (entry, _entry_scope) = cache.resolve_reference(&reference, &scope).unwrap();
        assert_eq!(entry.name(), "Vehicle");
        assert_eq!(entry.attribute("name"), Some("sedan"));
    }

    #[test]
    fn missing_entry_reports_catalog_and_entry() {
        let (_dir, scope) = catalog_fixture();
        let mut cache = CatalogCache::new();
        let reference = crate::parser::xml::parse_document(
            r#"<CatalogReference catalogName="VehicleCatalog" entryName="limousine"/>"#,
        )
        .unwrap();
        let err = cache.resolve_reference(&reference, &scope).unwrap_err();
        assert!(matches!(err, Error::CatalogEntryNotFound { .. }));
    }

    #[test]
    fn parameter_assignments_enter_the_entry_scope() {
        let (_dir, scope) = catalog_fixture();
        let mut cache = CatalogCache::new();
        let reference = crate::parser::xml::parse_document(
            r#"<CatalogReference catalogName="VehicleCatalog" entryName="sedan">
                 <ParameterAssignments>
                   <ParameterAssignment parameterRef="maxSpeed" value="15"/>
                 </ParameterAssignments>
               </CatalogReference>"#,
        )
        .unwrap();
        let (_entry, entry_scope) = cache.resolve_reference(&reference, &scope).unwrap();
        assert_eq!(
            entry_scope.resolve("maxSpeed").unwrap().as_parameter(),
            Some("15")
        );
    }

    #[test]
    fn substitute_replaces_embedded_references() {
        let (_dir, scope) = catalog_fixture();
        scope.define(
            "model",
            Object::Parameter {
                value: "sedan".to_string(),
            },
        );
        let cache = CatalogCache::new();
        assert_eq!(
            cache.substitute("vehicle_${model}_v1", &scope).unwrap(),
            "vehicle_sedan_v1"
        );
    }
}
