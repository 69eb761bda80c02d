// module.rs — Mutable module object model
//
// The graph the weaver rewrites: types with their methods, fields, properties,
// parameters and metadata attributes. Instruction lists live in `body.rs`.
//
// Preconditions: none.
// Postconditions: after `push_type` / `assign_ids`, every type and method
//   carries a unique stable ID in declaration order.
// Failure modes: JSON decoding errors from `from_json`.
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::body::MethodBody;
use crate::id::{IdAllocator, MethodId, TypeId};

/// Name of an instance constructor.
pub const CTOR_NAME: &str = ".ctor";
/// Name of a static (type) constructor.
pub const CCTOR_NAME: &str = ".cctor";

// ── Type references ─────────────────────────────────────────────────────────

/// A reference to a type, either a built-in or a named type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeRef {
    Void,
    Bool,
    Int32,
    Int64,
    String,
    Object,
    Named(String),
}

impl TypeRef {
    pub fn named(path: impl Into<String>) -> Self {
        TypeRef::Named(path.into())
    }

    /// Map a type keyword (`int32`, `string`, ...) or a path to a `TypeRef`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "void" => TypeRef::Void,
            "bool" => TypeRef::Bool,
            "int32" => TypeRef::Int32,
            "int64" => TypeRef::Int64,
            "string" => TypeRef::String,
            "object" => TypeRef::Object,
            other => TypeRef::Named(other.to_string()),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Void)
    }

    /// Short display name (last path segment for named types).
    pub fn short_name(&self) -> String {
        match self {
            TypeRef::Named(path) => path.rsplit('.').next().unwrap_or(path).to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Void => write!(f, "void"),
            TypeRef::Bool => write!(f, "bool"),
            TypeRef::Int32 => write!(f, "int32"),
            TypeRef::Int64 => write!(f, "int64"),
            TypeRef::String => write!(f, "string"),
            TypeRef::Object => write!(f, "object"),
            TypeRef::Named(path) => write!(f, "{}", path),
        }
    }
}

/// A reference to a method, as used by call instructions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub declaring: String,
    pub name: String,
    pub has_this: bool,
    pub params: Vec<TypeRef>,
    pub ret: TypeRef,
}

/// A reference to a field, as used by load/store instructions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub declaring: String,
    pub name: String,
    pub ty: TypeRef,
}

// ── Attributes ──────────────────────────────────────────────────────────────

/// A positional attribute constructor argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrArg {
    Int(i64),
    Str(String),
    /// Enum member written by name, e.g. `When.OnExit`.
    Enum(String),
}

/// A metadata attribute attached to a type, member or parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub ty: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<AttrArg>,
}

impl Attribute {
    pub fn new(ty: impl Into<String>) -> Self {
        Attribute {
            ty: ty.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: AttrArg) -> Self {
        self.args.push(arg);
        self
    }
}

/// Remove every attribute of type `ty` from `attributes`, returning how many
/// were removed. Iterates in reverse so removal never skips an entry.
pub fn strip_attributes(attributes: &mut Vec<Attribute>, ty: &str) -> usize {
    let mut removed = 0;
    for i in (0..attributes.len()).rev() {
        if attributes[i].ty == ty {
            attributes.remove(i);
            removed += 1;
        }
    }
    removed
}

pub fn has_attribute(attributes: &[Attribute], ty: &str) -> bool {
    attributes.iter().any(|a| a.ty == ty)
}

// ── Members ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Public,
    #[default]
    Private,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Public => write!(f, "public"),
            Access::Private => write!(f, "private"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDef {
    #[serde(skip)]
    pub id: MethodId,
    pub name: String,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub params: Vec<ParamDef>,
    pub ret: TypeRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
    /// `None` for abstract and interface methods.
    #[serde(default)]
    pub body: Option<MethodBody>,
}

impl MethodDef {
    pub fn new(name: impl Into<String>, ret: TypeRef) -> Self {
        MethodDef {
            id: MethodId::default(),
            name: name.into(),
            access: Access::Private,
            is_static: false,
            params: Vec::new(),
            ret,
            attributes: Vec::new(),
            body: None,
        }
    }

    /// Instance constructor (not the static type initializer).
    pub fn is_constructor(&self) -> bool {
        self.name == CTOR_NAME && !self.is_static
    }

    /// Build a call reference to this method as declared on `declaring`.
    pub fn to_ref(&self, declaring: &str) -> MethodRef {
        MethodRef {
            declaring: declaring.to_string(),
            name: self.name.clone(),
            has_this: !self.is_static,
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            ret: self.ret.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    #[default]
    Class,
    Interface,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    #[serde(skip)]
    pub id: TypeId,
    pub name: String,
    #[serde(default)]
    pub kind: TypeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        TypeDef {
            id: TypeId::default(),
            name: name.into(),
            kind: TypeKind::Class,
            base: None,
            attributes: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn self_ref(&self) -> TypeRef {
        TypeRef::Named(self.name.clone())
    }

    pub fn method_by_name(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// ── Module ──────────────────────────────────────────────────────────────────

/// A whole module: the unit one weave pass owns exclusively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(skip)]
    ids: IdAllocator,
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.types == other.types
    }
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            types: Vec::new(),
            ids: IdAllocator::new(),
        }
    }

    /// Decode a module from JSON and assign IDs.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let mut module: Module = serde_json::from_str(text)?;
        module.assign_ids();
        Ok(module)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Append a type, assigning IDs to it and its methods.
    pub fn push_type(&mut self, mut ty: TypeDef) -> TypeId {
        ty.id = self.ids.alloc_type();
        for method in &mut ty.methods {
            method.id = self.ids.alloc_method();
        }
        let id = ty.id;
        self.types.push(ty);
        id
    }

    /// Append a method to an existing type. Returns `None` if the type is gone.
    pub fn push_method(&mut self, ty: TypeId, mut method: MethodDef) -> Option<MethodId> {
        let index = self.type_index(ty)?;
        method.id = self.ids.alloc_method();
        let id = method.id;
        self.types[index].methods.push(method);
        Some(id)
    }

    /// Reassign every ID in declaration order (after decoding or bulk edits).
    pub fn assign_ids(&mut self) {
        self.ids = IdAllocator::new();
        for ty in &mut self.types {
            ty.id = self.ids.alloc_type();
            for method in &mut ty.methods {
                method.id = self.ids.alloc_method();
            }
        }
    }

    pub fn type_index(&self, id: TypeId) -> Option<usize> {
        self.types.iter().position(|t| t.id == id)
    }

    pub fn ty(&self, id: TypeId) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.id == id)
    }

    pub fn ty_mut(&mut self, id: TypeId) -> Option<&mut TypeDef> {
        self.types.iter_mut().find(|t| t.id == id)
    }

    pub fn type_by_name(&self, name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Look up a method together with its declaring type.
    pub fn method(&self, id: MethodId) -> Option<(&TypeDef, &MethodDef)> {
        self.types
            .iter()
            .find_map(|t| t.methods.iter().find(|m| m.id == id).map(|m| (t, m)))
    }

    pub fn method_mut(&mut self, id: MethodId) -> Option<&mut MethodDef> {
        self.types
            .iter_mut()
            .flat_map(|t| t.methods.iter_mut())
            .find(|m| m.id == id)
    }

    /// All methods in module order, paired with their declaring type.
    pub fn methods(&self) -> impl Iterator<Item = (&TypeDef, &MethodDef)> {
        self.types
            .iter()
            .flat_map(|t| t.methods.iter().map(move |m| (t, m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Module {
        let mut module = Module::new("sample");
        let mut ty = TypeDef::new("Demo.Widget");
        ty.methods.push(MethodDef::new(CTOR_NAME, TypeRef::Void));
        ty.methods.push(MethodDef::new("Run", TypeRef::Int32));
        module.push_type(ty);
        module.push_type(TypeDef::new("Demo.Other"));
        module
    }

    #[test]
    fn ids_follow_declaration_order() {
        let module = sample();
        assert_eq!(module.types[0].id, TypeId(0));
        assert_eq!(module.types[1].id, TypeId(1));
        assert_eq!(module.types[0].methods[1].id, MethodId(1));
    }

    #[test]
    fn push_method_continues_allocation() {
        let mut module = sample();
        let id = module
            .push_method(TypeId(1), MethodDef::new("Late", TypeRef::Void))
            .unwrap();
        assert_eq!(id, MethodId(2));
        let (owner, method) = module.method(id).unwrap();
        assert_eq!(owner.name, "Demo.Other");
        assert_eq!(method.name, "Late");
    }

    #[test]
    fn strip_attributes_removes_every_occurrence() {
        let mut attrs = vec![
            Attribute::new("A"),
            Attribute::new("B"),
            Attribute::new("A"),
        ];
        assert_eq!(strip_attributes(&mut attrs, "A"), 2);
        assert_eq!(attrs, vec![Attribute::new("B")]);
    }

    #[test]
    fn json_round_trip_reassigns_ids() {
        let module = sample();
        let text = module.to_json().unwrap();
        let decoded = Module::from_json(&text).unwrap();
        assert_eq!(decoded, module);
        assert_eq!(decoded.types[0].methods[1].id, MethodId(1));
    }

    #[test]
    fn constructor_detection_ignores_static_initializer() {
        let ctor = MethodDef::new(CTOR_NAME, TypeRef::Void);
        let mut cctor = MethodDef::new(CCTOR_NAME, TypeRef::Void);
        cctor.is_static = true;
        assert!(ctor.is_constructor());
        assert!(!cctor.is_constructor());
    }

    #[test]
    fn short_name_uses_last_segment() {
        assert_eq!(TypeRef::named("System.Int32x").short_name(), "Int32x");
        assert_eq!(TypeRef::Int32.short_name(), "int32");
    }
}
