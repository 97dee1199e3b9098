// entity.rs — Reflected entity model
//
// Data extracted from one parsed header: namespaces, structs/classes, enums,
// fields, methods, functions and variables, each carrying the user-supplied
// annotation properties. Construction happens from the external parser's
// cursor tree; an entity is reflected only when it carries an annotation
// whose kind tag matches the entity kind.
//
// Outer back references are plain qualified-name strings, rewritten in one
// pass after the cursor walk so no nested entity keeps a dangling parent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diag::ParsingError;
use crate::property::{parse_properties, Property, PropertyError};
use crate::tu::{Cursor, CursorKind};

// ── Entity kinds ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Namespace,
    Struct,
    Class,
    Enum,
    EnumValue,
    Field,
    Method,
    Function,
    Variable,
}

impl EntityKind {
    /// Every kind, in declaration order (used for macro-file emission).
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Namespace,
        EntityKind::Struct,
        EntityKind::Class,
        EntityKind::Enum,
        EntityKind::EnumValue,
        EntityKind::Field,
        EntityKind::Method,
        EntityKind::Function,
        EntityKind::Variable,
    ];

    /// Tag expected before the `:` of an annotation payload for this kind.
    pub fn annotation_tag(self) -> &'static str {
        match self {
            EntityKind::Namespace => "Namespace",
            EntityKind::Struct => "Struct",
            EntityKind::Class => "Class",
            EntityKind::Enum => "Enum",
            EntityKind::EnumValue => "EnumValue",
            EntityKind::Field => "Field",
            EntityKind::Method => "Method",
            EntityKind::Function => "Function",
            EntityKind::Variable => "Variable",
        }
    }
}

// ── Common entity data ──────────────────────────────────────────────────────

/// Name, kind, properties and containing-entity back reference shared by
/// every reflected entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub name: String,
    pub kind: EntityKind,
    pub properties: Vec<Property>,
    /// Qualified name of the containing entity, `None` at file scope.
    /// Refreshed after the cursor walk; see `FileParsingResult::refresh_outer_entities`.
    pub outer: Option<String>,
}

impl EntityInfo {
    pub fn new(name: impl Into<String>, kind: EntityKind, properties: Vec<Property>) -> Self {
        Self {
            name: name.into(),
            kind,
            properties,
            outer: None,
        }
    }

    /// `Outer::Name` when nested, bare name at file scope.
    pub fn qualified_name(&self) -> String {
        match &self.outer {
            Some(outer) => format!("{}::{}", outer, self.name),
            None => self.name.clone(),
        }
    }
}

// ── Concrete entities ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub entity: EntityInfo,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub entity: EntityInfo,
    pub return_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub entity: EntityInfo,
    pub return_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub entity: EntityInfo,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValueInfo {
    pub entity: EntityInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumInfo {
    pub entity: EntityInfo,
    pub values: Vec<EnumValueInfo>,
}

/// A reflected struct or class; the kind discriminates the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructClassInfo {
    pub entity: EntityInfo,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub entity: EntityInfo,
    pub namespaces: Vec<NamespaceInfo>,
    pub structs: Vec<StructClassInfo>,
    pub classes: Vec<StructClassInfo>,
    pub enums: Vec<EnumInfo>,
    pub functions: Vec<FunctionInfo>,
    pub variables: Vec<VariableInfo>,
}

// ── Annotation lookup ───────────────────────────────────────────────────────

/// Find the annotation payload for `kind` among a cursor's children.
///
/// Returns `None` when the entity carries no matching annotation (the entity
/// is simply not reflected). A malformed property list is pushed to `errors`
/// and the entity is skipped as well.
fn reflected_properties(
    cursor: &Cursor,
    kind: EntityKind,
    errors: &mut Vec<ParsingError>,
) -> Option<Vec<Property>> {
    for child in &cursor.children {
        if child.kind != CursorKind::AnnotateAttr {
            continue;
        }
        match parse_properties(&child.spelling, kind.annotation_tag()) {
            Ok(properties) => return Some(properties),
            // Tag for another entity kind, or a foreign annotate attribute:
            // not ours to consume.
            Err(PropertyError::KindMismatch { .. }) | Err(PropertyError::MissingKindTag) => {}
            Err(err @ PropertyError::Malformed { .. }) => {
                errors.push(ParsingError {
                    message: err.to_string(),
                    location: Some(child.location.clone()),
                });
                return None;
            }
        }
    }
    None
}

// ── Per-entity cursor parsers ───────────────────────────────────────────────

impl StructClassInfo {
    /// Parse a struct/class cursor. `None` if the type is not annotated.
    pub fn from_cursor(cursor: &Cursor, errors: &mut Vec<ParsingError>) -> Option<Self> {
        let kind = match cursor.kind {
            CursorKind::StructDecl => EntityKind::Struct,
            CursorKind::ClassDecl | CursorKind::ClassTemplate => EntityKind::Class,
            _ => return None,
        };
        let properties = reflected_properties(cursor, kind, errors)?;
        let mut info = StructClassInfo {
            entity: EntityInfo::new(cursor.spelling.clone(), kind, properties),
            fields: Vec::new(),
            methods: Vec::new(),
        };

        for child in &cursor.children {
            match child.kind {
                CursorKind::FieldDecl => {
                    if let Some(properties) =
                        reflected_properties(child, EntityKind::Field, errors)
                    {
                        info.fields.push(FieldInfo {
                            entity: EntityInfo::new(
                                child.spelling.clone(),
                                EntityKind::Field,
                                properties,
                            ),
                            type_name: child.type_spelling.clone(),
                        });
                    }
                }
                CursorKind::Method => {
                    if let Some(properties) =
                        reflected_properties(child, EntityKind::Method, errors)
                    {
                        info.methods.push(MethodInfo {
                            entity: EntityInfo::new(
                                child.spelling.clone(),
                                EntityKind::Method,
                                properties,
                            ),
                            return_type: child.type_spelling.clone(),
                        });
                    }
                }
                _ => {}
            }
        }

        Some(info)
    }
}

impl EnumInfo {
    pub fn from_cursor(cursor: &Cursor, errors: &mut Vec<ParsingError>) -> Option<Self> {
        let properties = reflected_properties(cursor, EntityKind::Enum, errors)?;
        let mut info = EnumInfo {
            entity: EntityInfo::new(cursor.spelling.clone(), EntityKind::Enum, properties),
            values: Vec::new(),
        };

        for child in &cursor.children {
            if child.kind == CursorKind::EnumConstantDecl {
                // Enum values inherit reflection from their enum; a matching
                // annotation only adds per-value properties.
                let properties = reflected_properties(child, EntityKind::EnumValue, errors)
                    .unwrap_or_default();
                info.values.push(EnumValueInfo {
                    entity: EntityInfo::new(
                        child.spelling.clone(),
                        EntityKind::EnumValue,
                        properties,
                    ),
                });
            }
        }

        Some(info)
    }
}

impl FunctionInfo {
    pub fn from_cursor(cursor: &Cursor, errors: &mut Vec<ParsingError>) -> Option<Self> {
        let properties = reflected_properties(cursor, EntityKind::Function, errors)?;
        Some(FunctionInfo {
            entity: EntityInfo::new(cursor.spelling.clone(), EntityKind::Function, properties),
            return_type: cursor.type_spelling.clone(),
        })
    }
}

impl VariableInfo {
    pub fn from_cursor(cursor: &Cursor, errors: &mut Vec<ParsingError>) -> Option<Self> {
        let properties = reflected_properties(cursor, EntityKind::Variable, errors)?;
        Some(VariableInfo {
            entity: EntityInfo::new(cursor.spelling.clone(), EntityKind::Variable, properties),
            type_name: cursor.type_spelling.clone(),
        })
    }
}

impl NamespaceInfo {
    /// Parse a namespace cursor, recursing into nested reflected entities.
    pub fn from_cursor(cursor: &Cursor, errors: &mut Vec<ParsingError>) -> Option<Self> {
        let properties = reflected_properties(cursor, EntityKind::Namespace, errors)?;
        let mut info = NamespaceInfo {
            entity: EntityInfo::new(cursor.spelling.clone(), EntityKind::Namespace, properties),
            namespaces: Vec::new(),
            structs: Vec::new(),
            classes: Vec::new(),
            enums: Vec::new(),
            functions: Vec::new(),
            variables: Vec::new(),
        };

        for child in &cursor.children {
            match child.kind {
                CursorKind::Namespace => {
                    if let Some(nested) = NamespaceInfo::from_cursor(child, errors) {
                        info.namespaces.push(nested);
                    }
                }
                CursorKind::StructDecl => {
                    if let Some(parsed) = StructClassInfo::from_cursor(child, errors) {
                        info.structs.push(parsed);
                    }
                }
                CursorKind::ClassDecl | CursorKind::ClassTemplate => {
                    if let Some(parsed) = StructClassInfo::from_cursor(child, errors) {
                        info.classes.push(parsed);
                    }
                }
                CursorKind::EnumDecl => {
                    if let Some(parsed) = EnumInfo::from_cursor(child, errors) {
                        info.enums.push(parsed);
                    }
                }
                CursorKind::FunctionDecl => {
                    if let Some(parsed) = FunctionInfo::from_cursor(child, errors) {
                        info.functions.push(parsed);
                    }
                }
                CursorKind::VarDecl => {
                    if let Some(parsed) = VariableInfo::from_cursor(child, errors) {
                        info.variables.push(parsed);
                    }
                }
                _ => {}
            }
        }

        Some(info)
    }
}

// ── File parsing result ─────────────────────────────────────────────────────

/// Everything extracted from one header. `errors` empty means success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileParsingResult {
    pub parsed_file: PathBuf,
    pub namespaces: Vec<NamespaceInfo>,
    pub structs: Vec<StructClassInfo>,
    pub classes: Vec<StructClassInfo>,
    pub enums: Vec<EnumInfo>,
    pub variables: Vec<VariableInfo>,
    pub functions: Vec<FunctionInfo>,
    pub errors: Vec<ParsingError>,
}

impl FileParsingResult {
    pub fn new(parsed_file: &Path) -> Self {
        Self {
            parsed_file: parsed_file.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Rewrite every outer back reference so nested entities point at their
    /// containing parent. Must run once after the cursor walk completes.
    pub fn refresh_outer_entities(&mut self) {
        for namespace in &mut self.namespaces {
            refresh_namespace(namespace, None);
        }
        for parsed in self.structs.iter_mut().chain(self.classes.iter_mut()) {
            refresh_struct_class(parsed, None);
        }
        for parsed in &mut self.enums {
            refresh_enum(parsed, None);
        }
        for parsed in &mut self.functions {
            parsed.entity.outer = None;
        }
        for parsed in &mut self.variables {
            parsed.entity.outer = None;
        }
    }
}

fn refresh_namespace(info: &mut NamespaceInfo, outer: Option<&str>) {
    info.entity.outer = outer.map(String::from);
    let qualified = info.entity.qualified_name();

    for nested in &mut info.namespaces {
        refresh_namespace(nested, Some(&qualified));
    }
    for parsed in info.structs.iter_mut().chain(info.classes.iter_mut()) {
        refresh_struct_class(parsed, Some(&qualified));
    }
    for parsed in &mut info.enums {
        refresh_enum(parsed, Some(&qualified));
    }
    for parsed in &mut info.functions {
        parsed.entity.outer = Some(qualified.clone());
    }
    for parsed in &mut info.variables {
        parsed.entity.outer = Some(qualified.clone());
    }
}

fn refresh_struct_class(info: &mut StructClassInfo, outer: Option<&str>) {
    info.entity.outer = outer.map(String::from);
    let qualified = info.entity.qualified_name();

    for field in &mut info.fields {
        field.entity.outer = Some(qualified.clone());
    }
    for method in &mut info.methods {
        method.entity.outer = Some(qualified.clone());
    }
}

fn refresh_enum(info: &mut EnumInfo, outer: Option<&str>) {
    info.entity.outer = outer.map(String::from);
    let qualified = info.entity.qualified_name();

    for value in &mut info.values {
        value.entity.outer = Some(qualified.clone());
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
