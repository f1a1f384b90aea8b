//! Closed set of parameter type tags
//!
//! Annotations are parsed from their source text once per candidate. Anything
//! outside the set becomes `Unknown`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Int,
    Float,
    Str,
    Bool,
    /// Element type
    List(Box<TypeTag>),
    /// Value type; keys are always synthetic strings
    Dict(Box<TypeTag>),
    /// Element types; empty when the tuple is untyped or variadic
    Tuple(Vec<TypeTag>),
    Unknown,
}

impl TypeTag {
    /// Parse annotation text such as `List[int]`, `Optional[str]` or `dict | None`
    pub fn parse(annotation: &str) -> TypeTag {
        let text = annotation.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        if text.is_empty() {
            return TypeTag::Unknown;
        }

        let union = split_top_level(text, '|');
        if union.len() > 1 {
            return first_non_none(&union);
        }

        let (head, args) = match text.find('[') {
            Some(open) if text.ends_with(']') => {
                let inner = &text[open + 1..text.len() - 1];
                (text[..open].trim(), split_top_level(inner, ','))
            }
            _ => (text, vec![]),
        };
        let head = head.strip_prefix("typing.").unwrap_or(head);

        match head {
            "int" => TypeTag::Int,
            "float" => TypeTag::Float,
            "str" => TypeTag::Str,
            "bool" => TypeTag::Bool,
            "list" | "List" => TypeTag::List(Box::new(
                args.first()
                    .map(|a| TypeTag::parse(a))
                    .unwrap_or(TypeTag::Unknown),
            )),
            "dict" | "Dict" => TypeTag::Dict(Box::new(
                args.get(1)
                    .map(|a| TypeTag::parse(a))
                    .unwrap_or(TypeTag::Unknown),
            )),
            "tuple" | "Tuple" => {
                if args.iter().any(|a| a.trim() == "...") {
                    TypeTag::Tuple(vec![])
                } else {
                    TypeTag::Tuple(args.iter().map(|a| TypeTag::parse(a)).collect())
                }
            }
            "Optional" => args
                .first()
                .map(|a| TypeTag::parse(a))
                .unwrap_or(TypeTag::Unknown),
            "Union" => first_non_none(&args),
            _ => TypeTag::Unknown,
        }
    }

    /// Name in the output type table, if this tag has one
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            TypeTag::Int => Some("int"),
            TypeTag::Float => Some("float"),
            TypeTag::Str => Some("str"),
            TypeTag::Bool => Some("bool"),
            TypeTag::List(_) => Some("list"),
            TypeTag::Dict(_) => Some("dict"),
            TypeTag::Tuple(_) => Some("tuple"),
            TypeTag::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TypeTag::Unknown)
    }
}

/// Map an annotation to one of `dict/list/str/int/float/bool/tuple`
pub fn normalize_type_name(annotation: &str) -> Option<&'static str> {
    TypeTag::parse(annotation).type_name()
}

/// Whether the annotation admits `None` (`Optional[..]`, `Union[.., None]` or `X | None`)
pub fn is_optional_annotation(annotation: &str) -> bool {
    let text = annotation.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    let union = split_top_level(text, '|');
    if union.len() > 1 {
        return union.iter().any(|m| is_none_name(m));
    }
    let Some(open) = text.find('[') else {
        return false;
    };
    if !text.ends_with(']') {
        return false;
    }
    let head = text[..open].trim();
    match head.strip_prefix("typing.").unwrap_or(head) {
        "Optional" => true,
        "Union" => split_top_level(&text[open + 1..text.len() - 1], ',')
            .iter()
            .any(|m| is_none_name(m)),
        _ => false,
    }
}

fn is_none_name(member: &str) -> bool {
    matches!(member.trim(), "None" | "NoneType")
}

fn first_non_none(members: &[String]) -> TypeTag {
    members
        .iter()
        .map(|m| m.trim())
        .find(|m| !is_none_name(m))
        .map(TypeTag::parse)
        .unwrap_or(TypeTag::Unknown)
}

/// Split on `separator` outside any brackets
fn split_top_level(text: &str, separator: char) -> Vec<String> {
    let mut parts = vec![];
    let mut depth = 0i32;
    let mut current = String::new();

    for c in text.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth -= 1,
            _ => {}
        }
        if c == separator && depth == 0 {
            parts.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(TypeTag::parse("int"), TypeTag::Int);
        assert_eq!(TypeTag::parse(" float "), TypeTag::Float);
        assert_eq!(TypeTag::parse("str"), TypeTag::Str);
        assert_eq!(TypeTag::parse("bool"), TypeTag::Bool);
        assert_eq!(TypeTag::parse("MyClass"), TypeTag::Unknown);
    }

    #[test]
    fn test_generics() {
        assert_eq!(
            TypeTag::parse("List[int]"),
            TypeTag::List(Box::new(TypeTag::Int))
        );
        assert_eq!(
            TypeTag::parse("typing.List[str]"),
            TypeTag::List(Box::new(TypeTag::Str))
        );
        assert_eq!(
            TypeTag::parse("list"),
            TypeTag::List(Box::new(TypeTag::Unknown))
        );
        assert_eq!(
            TypeTag::parse("Dict[str, List[int]]"),
            TypeTag::Dict(Box::new(TypeTag::List(Box::new(TypeTag::Int))))
        );
        assert_eq!(
            TypeTag::parse("Tuple[int, str]"),
            TypeTag::Tuple(vec![TypeTag::Int, TypeTag::Str])
        );
        assert_eq!(TypeTag::parse("tuple[int, ...]"), TypeTag::Tuple(vec![]));
    }

    #[test]
    fn test_optional_and_unions() {
        assert_eq!(TypeTag::parse("Optional[int]"), TypeTag::Int);
        assert_eq!(TypeTag::parse("Union[None, str]"), TypeTag::Str);
        assert_eq!(
            TypeTag::parse("list[int] | None"),
            TypeTag::List(Box::new(TypeTag::Int))
        );
        assert_eq!(TypeTag::parse("'int'"), TypeTag::Int);
    }

    #[test]
    fn test_normalize_type_name() {
        assert_eq!(normalize_type_name("List[int]"), Some("list"));
        assert_eq!(normalize_type_name("Dict[str, int]"), Some("dict"));
        assert_eq!(normalize_type_name("Optional[float]"), Some("float"));
        assert_eq!(normalize_type_name("Any"), None);
    }

    #[test]
    fn test_optional_annotations() {
        assert!(is_optional_annotation("Optional[dict]"));
        assert!(is_optional_annotation("typing.Optional[List[int]]"));
        assert!(is_optional_annotation("dict | None"));
        assert!(is_optional_annotation("Union[str, None]"));
        assert!(!is_optional_annotation("Union[str, int]"));
        assert!(!is_optional_annotation("List[Optional[int]]"));
        assert!(!is_optional_annotation("dict"));
    }
}
