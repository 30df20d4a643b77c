//! Text to typed value conversion for writes.

#![allow(missing_docs)]

use smol_str::SmolStr;

use crate::value::{TypeTag, Value};

/// Converts user text into a value of the variable's recorded type.
pub trait ValueParser: Send + Sync {
    /// Returns `None` when `text` is not a valid literal for `type_tag`.
    fn parse(&self, type_tag: &TypeTag, text: &str) -> Option<Value>;
}

/// Parser for the elementary IEC 61131-3 types.
#[derive(Debug, Clone, Copy, Default)]
pub struct IecValueParser;

impl ValueParser for IecValueParser {
    fn parse(&self, type_tag: &TypeTag, text: &str) -> Option<Value> {
        let trimmed = text.trim();
        match type_tag {
            TypeTag::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            TypeTag::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => Some(Value::Char(ch)),
                    _ => None,
                }
            }
            TypeTag::SInt => trimmed.parse().ok().map(Value::SInt),
            TypeTag::USInt => trimmed.parse().ok().map(Value::USInt),
            TypeTag::Int => trimmed.parse().ok().map(Value::Int),
            TypeTag::UInt => trimmed.parse().ok().map(Value::UInt),
            TypeTag::DInt => trimmed.parse().ok().map(Value::DInt),
            TypeTag::UDInt => trimmed.parse().ok().map(Value::UDInt),
            TypeTag::LInt => trimmed.parse().ok().map(Value::LInt),
            TypeTag::ULInt => trimmed.parse().ok().map(Value::ULInt),
            TypeTag::Real => trimmed.parse().ok().map(Value::Real),
            TypeTag::LReal => trimmed.parse().ok().map(Value::LReal),
            TypeTag::String => Some(Value::String(SmolStr::new(text))),
            TypeTag::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(tag: TypeTag, text: &str) -> Option<Value> {
        IecValueParser.parse(&tag, text)
    }

    #[test]
    fn booleans_accept_any_case_only() {
        assert_eq!(parse(TypeTag::Bool, "TRUE"), Some(Value::Bool(true)));
        assert_eq!(parse(TypeTag::Bool, "False"), Some(Value::Bool(false)));
        assert_eq!(parse(TypeTag::Bool, "1"), None);
    }

    #[test]
    fn unsigned_widths_reject_out_of_range() {
        assert_eq!(parse(TypeTag::USInt, "255"), Some(Value::USInt(255)));
        assert_eq!(parse(TypeTag::USInt, "256"), None);
        assert_eq!(parse(TypeTag::UInt, "-1"), None);
        assert_eq!(parse(TypeTag::UDInt, "4294967296"), None);
        assert_eq!(
            parse(TypeTag::ULInt, "18446744073709551615"),
            Some(Value::ULInt(u64::MAX))
        );
        assert_eq!(parse(TypeTag::ULInt, "18446744073709551616"), None);
    }

    #[test]
    fn signed_and_real_values_parse() {
        assert_eq!(parse(TypeTag::SInt, "-128"), Some(Value::SInt(-128)));
        assert_eq!(parse(TypeTag::Int, " 1200 "), Some(Value::Int(1200)));
        assert_eq!(parse(TypeTag::LReal, "2.5"), Some(Value::LReal(2.5)));
        assert_eq!(parse(TypeTag::Real, "abc"), None);
    }

    #[test]
    fn chars_need_exactly_one_character() {
        assert_eq!(parse(TypeTag::Char, "x"), Some(Value::Char('x')));
        assert_eq!(parse(TypeTag::Char, "xy"), None);
        assert_eq!(parse(TypeTag::Char, ""), None);
    }

    #[test]
    fn strings_are_verbatim_and_other_types_never_convert() {
        assert_eq!(
            parse(TypeTag::String, " pump 1 "),
            Some(Value::String(SmolStr::new(" pump 1 ")))
        );
        assert_eq!(parse(TypeTag::Other(SmolStr::new("MOTOR")), "1"), None);
    }
}
