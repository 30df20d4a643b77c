//! Typed values exchanged with the controller.

#![allow(missing_docs)]

use std::fmt;

use serde::Serialize;
use smol_str::SmolStr;

/// Remote type classification of a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum TypeTag {
    Bool,
    Char,
    SInt,
    USInt,
    Int,
    UInt,
    DInt,
    UDInt,
    LInt,
    ULInt,
    Real,
    LReal,
    String,
    /// A type the client cannot convert (structures, arrays, ...).
    Other(SmolStr),
}

impl TypeTag {
    pub fn name(&self) -> &str {
        match self {
            TypeTag::Bool => "BOOL",
            TypeTag::Char => "CHAR",
            TypeTag::SInt => "SINT",
            TypeTag::USInt => "USINT",
            TypeTag::Int => "INT",
            TypeTag::UInt => "UINT",
            TypeTag::DInt => "DINT",
            TypeTag::UDInt => "UDINT",
            TypeTag::LInt => "LINT",
            TypeTag::ULInt => "ULINT",
            TypeTag::Real => "REAL",
            TypeTag::LReal => "LREAL",
            TypeTag::String => "STRING",
            TypeTag::Other(name) => name.as_str(),
        }
    }

    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "BOOL" => Self::Bool,
            "CHAR" => Self::Char,
            "SINT" => Self::SInt,
            "USINT" => Self::USInt,
            "INT" => Self::Int,
            "UINT" => Self::UInt,
            "DINT" => Self::DInt,
            "UDINT" => Self::UDInt,
            "LINT" => Self::LInt,
            "ULINT" => Self::ULInt,
            "REAL" => Self::Real,
            "LREAL" => Self::LReal,
            "STRING" => Self::String,
            _ => Self::Other(SmolStr::new(name.trim())),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value paired with its type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Bool(bool),
    Char(char),
    SInt(i8),
    USInt(u8),
    Int(i16),
    UInt(u16),
    DInt(i32),
    UDInt(u32),
    LInt(i64),
    ULInt(u64),
    Real(f32),
    LReal(f64),
    String(SmolStr),
    Opaque { type_name: SmolStr, text: SmolStr },
}

impl Value {
    #[must_use]
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Bool(_) => TypeTag::Bool,
            Value::Char(_) => TypeTag::Char,
            Value::SInt(_) => TypeTag::SInt,
            Value::USInt(_) => TypeTag::USInt,
            Value::Int(_) => TypeTag::Int,
            Value::UInt(_) => TypeTag::UInt,
            Value::DInt(_) => TypeTag::DInt,
            Value::UDInt(_) => TypeTag::UDInt,
            Value::LInt(_) => TypeTag::LInt,
            Value::ULInt(_) => TypeTag::ULInt,
            Value::Real(_) => TypeTag::Real,
            Value::LReal(_) => TypeTag::LReal,
            Value::String(_) => TypeTag::String,
            Value::Opaque { type_name, .. } => TypeTag::Other(type_name.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            Value::Char(v) => write!(f, "{v}"),
            Value::SInt(v) => write!(f, "{v}"),
            Value::USInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::DInt(v) => write!(f, "{v}"),
            Value::UDInt(v) => write!(f, "{v}"),
            Value::LInt(v) => write!(f, "{v}"),
            Value::ULInt(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::LReal(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Opaque { text, .. } => write!(f, "{text}"),
        }
    }
}
