//! Lexical scoping and name resolution for scenario elements
//!
//! Scenario elements see their surroundings through a tree of environment
//! frames. Each frame holds an ordered multimap of named objects plus its
//! inner frames; resolution searches the current frame, then all unnamed
//! inner frames level by level, then ascends to the outer frame. Qualified
//! names (`Act1::Maneuver2::speed`) descend through named frames, and
//! absolute names (`::speed`) restart from the root frame.
//!
//! Frames live in an arena indexed by integer ids; a frame points to its
//! outer frame by index, so the cyclic parent/child structure needs no
//! ownership cycles. A [`Scope`] is a cheap shallow-copy handle onto one
//! frame of that arena.

use crate::error::{Error, Result};
use crate::syntax::entities_decl::ScenarioObject;
use indexmap::IndexMap;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

/// Index of a frame in the scope arena
pub type FrameId = usize;

/// A named object visible through scope resolution
#[derive(Debug, Clone)]
pub enum Object {
    /// A declared parameter with its (already substituted) value
    Parameter { value: String },
    /// A declared scenario entity
    Entity(Arc<ScenarioObject>),
}

impl Object {
    /// Parameter value, if this object is a parameter
    pub fn as_parameter(&self) -> Option<&str> {
        match self {
            Object::Parameter { value } => Some(value),
            _ => None,
        }
    }

    /// Entity declaration, if this object is an entity
    pub fn as_entity(&self) -> Option<&Arc<ScenarioObject>> {
        match self {
            Object::Entity(object) => Some(object),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Frame {
    name: String,
    outer: Option<FrameId>,
    variables: Vec<(String, Object)>,
    named_inner: Vec<FrameId>,
    unnamed_inner: Vec<FrameId>,
}

#[derive(Debug, Default)]
struct Arena {
    frames: Vec<Frame>,
}

/// Scenario-wide environment shared by every scope
#[derive(Debug)]
pub struct GlobalEnvironment {
    /// Path of the scenario file, for catalog path resolution
    pub pathname: PathBuf,
    /// Declared scenario objects by name
    pub entities: IndexMap<String, Arc<ScenarioObject>>,
    /// Catalog location element name (e.g. "VehicleCatalog") to directory
    pub catalog_locations: HashMap<String, PathBuf>,
}

impl GlobalEnvironment {
    fn new(pathname: PathBuf) -> Self {
        Self {
            pathname,
            entities: IndexMap::new(),
            catalog_locations: HashMap::new(),
        }
    }

    /// Look up a declared entity by reference name
    pub fn entity_ref(&self, name: &str) -> Result<Arc<ScenarioObject>> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| Error::no_such_name(name))
    }
}

/// A qualified name split into prefixes and a final name
#[derive(Debug, Clone, PartialEq)]
pub struct PrefixedName {
    pub absolute: bool,
    pub prefixes: Vec<String>,
    pub name: String,
}

impl PrefixedName {
    /// Parse `A::B::name`, `::name` (absolute) or plain `name`
    pub fn parse(input: &str) -> Self {
        let absolute = input.starts_with("::");
        let trimmed = input.trim_start_matches("::");
        let mut segments: Vec<String> = trimmed.split("::").map(str::to_string).collect();
        let name = segments.pop().unwrap_or_default();
        PrefixedName {
            absolute,
            prefixes: segments,
            name,
        }
    }
}

/// Handle onto one frame of the scope arena; shallow copies share the arena
#[derive(Clone)]
pub struct Scope {
    arena: Rc<RefCell<Arena>>,
    global: Rc<RefCell<GlobalEnvironment>>,
    frame: FrameId,
    /// Name of the scenario element that opened this scope
    pub name: String,
    /// Actor entity names assigned by the enclosing maneuver group
    pub actors: Vec<String>,
}

impl Scope {
    /// Create the root scope for a scenario file
    pub fn make_root(pathname: impl Into<PathBuf>) -> Self {
        let arena = Arena {
            frames: vec![Frame::default()],
        };
        Scope {
            arena: Rc::new(RefCell::new(arena)),
            global: Rc::new(RefCell::new(GlobalEnvironment::new(pathname.into()))),
            frame: 0,
            name: String::new(),
            actors: Vec::new(),
        }
    }

    /// Open an inner scope. An empty name creates an unnamed frame, which is
    /// transparent to resolution; a non-empty name creates a frame that
    /// qualified names can address.
    pub fn make_child(&self, name: &str) -> Self {
        let frame = {
            let mut arena = self.arena.borrow_mut();
            let id = arena.frames.len();
            arena.frames.push(Frame {
                name: name.to_string(),
                outer: Some(self.frame),
                ..Frame::default()
            });
            let outer = &mut arena.frames[self.frame];
            if name.is_empty() {
                outer.unnamed_inner.push(id);
            } else {
                outer.named_inner.push(id);
            }
            id
        };
        Scope {
            arena: Rc::clone(&self.arena),
            global: Rc::clone(&self.global),
            frame,
            name: name.to_string(),
            actors: self.actors.clone(),
        }
    }

    /// Insert an object into the current frame
    pub fn define(&self, name: &str, object: Object) {
        let mut arena = self.arena.borrow_mut();
        arena.frames[self.frame]
            .variables
            .push((name.to_string(), object));
    }

    /// Resolve a possibly qualified name
    pub fn resolve(&self, name: &str) -> Result<Object> {
        let prefixed = PrefixedName::parse(name);
        let arena = self.arena.borrow();
        let start = if prefixed.absolute { 0 } else { self.frame };
        Self::find_prefixed(&arena, start, &prefixed)
            .map_err(|e| e.with_context(&format!("resolving '{}'", name)))
    }

    // Consuming a prefix restarts the same resolution rules from the frame
    // it names, so the stripped name may still ascend from there.
    fn find_prefixed(arena: &Arena, frame: FrameId, prefixed: &PrefixedName) -> Result<Object> {
        if prefixed.prefixes.is_empty() {
            return Self::find_variable(arena, frame, &prefixed.name);
        }
        let target = Self::lookup_frame(arena, frame, &prefixed.prefixes[0])?;
        let stripped = PrefixedName {
            absolute: false,
            prefixes: prefixed.prefixes[1..].to_vec(),
            name: prefixed.name.clone(),
        };
        Self::find_prefixed(arena, target, &stripped)
    }

    /// Search for a variable: current frame, then unnamed inner frames level
    /// by level, then the outer frame.
    fn find_variable(arena: &Arena, frame: FrameId, name: &str) -> Result<Object> {
        match Self::find_variable_level(arena, frame, name)? {
            Some(object) => Ok(object),
            None => match arena.frames[frame].outer {
                Some(outer) => Self::find_variable(arena, outer, name),
                None => Err(Error::no_such_name(name)),
            },
        }
    }

    fn find_variable_level(arena: &Arena, frame: FrameId, name: &str) -> Result<Option<Object>> {
        let mut level = vec![frame];
        while !level.is_empty() {
            let mut matches: Vec<Object> = Vec::new();
            for &id in &level {
                for (variable, object) in &arena.frames[id].variables {
                    if variable == name {
                        matches.push(object.clone());
                    }
                }
            }
            match matches.len() {
                0 => {
                    level = level
                        .iter()
                        .flat_map(|&id| arena.frames[id].unnamed_inner.iter().copied())
                        .collect();
                }
                1 => return Ok(Some(matches.remove(0))),
                _ => return Err(Error::ambiguous_reference(name)),
            }
        }
        Ok(None)
    }

    /// Search for a named frame with the same level-wise rules as variables,
    /// ascending to the outer frame on exhaustion.
    fn lookup_frame(arena: &Arena, frame: FrameId, prefix: &str) -> Result<FrameId> {
        match Self::lookup_frame_level(arena, frame, prefix)? {
            Some(id) => Ok(id),
            None => match arena.frames[frame].outer {
                Some(outer) => Self::lookup_frame(arena, outer, prefix),
                None => Err(Error::no_such_name(prefix)),
            },
        }
    }

    fn lookup_frame_level(arena: &Arena, frame: FrameId, prefix: &str) -> Result<Option<FrameId>> {
        let mut level = vec![frame];
        while !level.is_empty() {
            let mut matches: Vec<FrameId> = Vec::new();
            for &id in &level {
                for &inner in &arena.frames[id].named_inner {
                    if arena.frames[inner].name == prefix {
                        matches.push(inner);
                    }
                }
            }
            match matches.len() {
                0 => {
                    level = level
                        .iter()
                        .flat_map(|&id| arena.frames[id].unnamed_inner.iter().copied())
                        .collect();
                }
                1 => return Ok(Some(matches[0])),
                _ => return Err(Error::ambiguous_reference(prefix)),
            }
        }
        Ok(None)
    }

    /// Snapshot of every parameter visible from this scope, innermost
    /// definition winning. Used for expression evaluation.
    pub fn visible_parameters(&self) -> HashMap<String, String> {
        let arena = self.arena.borrow();
        let mut parameters = HashMap::new();
        let mut frame = Some(self.frame);
        while let Some(id) = frame {
            let mut level = vec![id];
            while !level.is_empty() {
                for &fid in &level {
                    for (name, object) in &arena.frames[fid].variables {
                        if let Object::Parameter { value } = object {
                            parameters
                                .entry(name.clone())
                                .or_insert_with(|| value.clone());
                        }
                    }
                }
                level = level
                    .iter()
                    .flat_map(|&fid| arena.frames[fid].unnamed_inner.iter().copied())
                    .collect();
            }
            frame = arena.frames[id].outer;
        }
        parameters
    }

    /// Shared global environment (read)
    pub fn global(&self) -> Ref<'_, GlobalEnvironment> {
        self.global.borrow()
    }

    /// Shared global environment (write)
    pub fn global_mut(&self) -> RefMut<'_, GlobalEnvironment> {
        self.global.borrow_mut()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("frame", &self.frame)
            .field("name", &self.name)
            .field("actors", &self.actors)
            .finish()
    }
}
