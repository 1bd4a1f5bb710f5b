//! Generated header binding descriptors.
//!
//! The generator turns each C header into a binding module describing the
//! functions and types it exports. The loader imports these lazily, one
//! header at a time.

use serde::{Deserialize, Serialize};

use crate::SchemaError;

/// Bindings for one header file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderBinding {
    /// Header name the binding was generated from.
    #[serde(default)]
    pub header: String,
    /// Exported functions.
    #[serde(default)]
    pub functions: Vec<FunctionBinding>,
    /// Exported types.
    #[serde(default)]
    pub types: Vec<TypeBinding>,
}

/// A native function signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionBinding {
    /// Exported symbol name.
    pub name: String,
    /// C return type, `void` if omitted.
    #[serde(default = "void")]
    pub returns: String,
    /// C parameter types in declaration order.
    #[serde(default)]
    pub params: Vec<String>,
    /// Whether the function takes trailing varargs.
    #[serde(default)]
    pub variadic: bool,
}

fn void() -> String {
    "void".to_string()
}

/// A native type declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeBinding {
    /// Type name.
    pub name: String,
    /// What sort of declaration this is.
    pub kind: TypeKind,
    /// Struct/union members or enum constants, in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldBinding>,
    /// Target type for aliases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Kind of a [`TypeBinding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// `struct`
    Struct,
    /// `union`
    Union,
    /// `enum`
    Enum,
    /// `typedef` to another type.
    Alias,
    /// Forward-declared type with no visible layout.
    Opaque,
}

/// A struct/union member or enum constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinding {
    /// Member name.
    pub name: String,
    /// Member type, or the constant's value for enums.
    #[serde(rename = "type")]
    pub ty: String,
}

impl HeaderBinding {
    /// Parses a binding module.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] for malformed TOML and
    /// [`SchemaError::Invalid`] for an alias without a target.
    pub fn from_toml_str(content: &str) -> Result<Self, SchemaError> {
        let binding: Self = toml::from_str(content)?;
        for ty in &binding.types {
            if ty.kind == TypeKind::Alias && ty.target.is_none() {
                return Err(SchemaError::invalid(
                    format!("types.{}", ty.name),
                    "alias without a target",
                ));
            }
        }
        Ok(binding)
    }

    /// Looks up a function by symbol name.
    pub fn function(&self, name: &str) -> Option<&FunctionBinding> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Looks up a type by name.
    pub fn type_named(&self, name: &str) -> Option<&TypeBinding> {
        self.types.iter().find(|t| t.name == name)
    }
}
