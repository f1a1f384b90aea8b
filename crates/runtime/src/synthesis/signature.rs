//! Signature extraction
//!
//! Parses candidate source with tree-sitter and reads the first top-level
//! function definition. The source is never executed. tree-sitter recovers
//! from syntax errors, so broken candidates still yield whatever parameters
//! are readable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tree_sitter::{Node, Parser, Tree};

use super::type_tag::TypeTag;
use crate::types::SynthesisError;

/// One parameter of the candidate's entry function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    /// Annotation source text
    pub annotation: Option<String>,
    pub type_tag: TypeTag,
    /// Default source text
    pub default_source: Option<String>,
    /// Default converted to a value, when it is a plain literal
    pub default_value: Option<Value>,
    /// Has a default or follows a parameter that has one
    pub optional: bool,
}

impl ParameterDescriptor {
    pub fn has_default(&self) -> bool {
        self.default_source.is_some()
    }
}

/// First top-level function of a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub parameters: Vec<ParameterDescriptor>,
    pub return_annotation: Option<String>,
}

fn parse_tree(code: &str) -> Result<Tree, SynthesisError> {
    let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| SynthesisError::ParserInit(e.to_string()))?;
    parser.parse(code, None).ok_or(SynthesisError::ParseFailed)
}

/// Signature of the first top-level function, if the module defines one
pub fn first_function(code: &str) -> Result<Option<FunctionSignature>, SynthesisError> {
    let tree = parse_tree(code)?;
    let root = tree.root_node();
    let source = code.as_bytes();

    let mut cursor = root.walk();
    let children: Vec<Node> = root.named_children(&mut cursor).collect();
    for child in children {
        let function = match child.kind() {
            "function_definition" => Some(child),
            "decorated_definition" => child
                .child_by_field_name("definition")
                .filter(|d| d.kind() == "function_definition"),
            _ => None,
        };
        if let Some(function) = function {
            return Ok(Some(read_function(function, source)));
        }
    }
    Ok(None)
}

/// Name of the function the harness should call
pub fn entry_point_name(code: &str) -> Option<String> {
    first_function(code).ok().flatten().map(|f| f.name)
}

fn read_function(function: Node, source: &[u8]) -> FunctionSignature {
    let name = function
        .child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok())
        .unwrap_or("")
        .to_string();
    let return_annotation = function
        .child_by_field_name("return_type")
        .and_then(|n| n.utf8_text(source).ok())
        .map(str::to_string);

    let mut parameters = vec![];
    if let Some(params) = function.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        let nodes: Vec<Node> = params.named_children(&mut cursor).collect();
        let mut seen_default = false;
        for node in nodes {
            if let Some(mut descriptor) = read_parameter(node, source) {
                seen_default |= descriptor.has_default();
                descriptor.optional = descriptor.has_default() || seen_default;
                parameters.push(descriptor);
            }
        }
    }

    FunctionSignature {
        name,
        parameters,
        return_annotation,
    }
}

fn text(node: Node, source: &[u8]) -> Option<String> {
    node.utf8_text(source).ok().map(str::to_string)
}

fn read_parameter(node: Node, source: &[u8]) -> Option<ParameterDescriptor> {
    let (name, annotation, default) = match node.kind() {
        "identifier" => (text(node, source)?, None, None),
        "typed_parameter" => {
            let inner = node.named_child(0)?;
            if inner.kind() != "identifier" {
                // *args: T and **kwargs: T
                return None;
            }
            let annotation = node.child_by_field_name("type").and_then(|t| text(t, source));
            (text(inner, source)?, annotation, None)
        }
        "default_parameter" => (
            text(node.child_by_field_name("name")?, source)?,
            None,
            node.child_by_field_name("value"),
        ),
        "typed_default_parameter" => (
            text(node.child_by_field_name("name")?, source)?,
            node.child_by_field_name("type").and_then(|t| text(t, source)),
            node.child_by_field_name("value"),
        ),
        _ => return None,
    };

    let type_tag = annotation
        .as_deref()
        .map(TypeTag::parse)
        .unwrap_or(TypeTag::Unknown);

    Some(ParameterDescriptor {
        name,
        annotation,
        type_tag,
        default_source: default.and_then(|d| text(d, source)),
        default_value: default.and_then(|d| literal_value(d, source)),
        optional: false,
    })
}

/// Convert a literal expression to a value; anything else is `None`
fn literal_value(node: Node, source: &[u8]) -> Option<Value> {
    match node.kind() {
        "integer" => parse_int(node.utf8_text(source).ok()?).map(Value::from),
        "float" => {
            let raw = node.utf8_text(source).ok()?.replace('_', "");
            Number::from_f64(raw.parse::<f64>().ok()?).map(Value::Number)
        }
        "string" => parse_string_literal(node.utf8_text(source).ok()?).map(Value::String),
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "none" => Some(Value::Null),
        "list" | "tuple" => {
            let mut cursor = node.walk();
            let items: Vec<Node> = node
                .named_children(&mut cursor)
                .filter(|c| c.kind() != "comment")
                .collect();
            items
                .into_iter()
                .map(|item| literal_value(item, source))
                .collect::<Option<Vec<Value>>>()
                .map(Value::Array)
        }
        "dictionary" => {
            let mut cursor = node.walk();
            let pairs: Vec<Node> = node
                .named_children(&mut cursor)
                .filter(|c| c.kind() != "comment")
                .collect();
            let mut map = Map::new();
            for pair in pairs {
                if pair.kind() != "pair" {
                    return None;
                }
                let key = match literal_value(pair.child_by_field_name("key")?, source)? {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => if b { "True" } else { "False" }.to_string(),
                    _ => return None,
                };
                let value = literal_value(pair.child_by_field_name("value")?, source)?;
                map.insert(key, value);
            }
            Some(Value::Object(map))
        }
        "parenthesized_expression" => literal_value(node.named_child(0)?, source),
        "unary_operator" => {
            let operator = node.child_by_field_name("operator")?.utf8_text(source).ok()?;
            let value = literal_value(node.child_by_field_name("argument")?, source)?;
            match (operator, value) {
                ("-", Value::Number(n)) => {
                    if let Some(i) = n.as_i64() {
                        i.checked_neg().map(Value::from)
                    } else {
                        n.as_f64()
                            .and_then(|f| Number::from_f64(-f))
                            .map(Value::Number)
                    }
                }
                ("+", Value::Number(n)) => Some(Value::Number(n)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    let raw = raw.replace('_', "");
    let lower = raw.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse().ok()
    }
}

/// Plain (optionally raw) string literal to its value; f-strings and bytes are rejected
fn parse_string_literal(raw: &str) -> Option<String> {
    let quote_start = raw.find(['"', '\''])?;
    let prefix = raw[..quote_start].to_ascii_lowercase();
    if prefix.contains('f') || prefix.contains('b') {
        return None;
    }
    let is_raw = prefix.contains('r');
    let body = &raw[quote_start..];

    let inner = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|q| {
            body.strip_prefix(q)
                .and_then(|rest| rest.strip_suffix(q))
        })?;

    if is_raw {
        return Some(inner.to_string());
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(code: &str) -> Vec<ParameterDescriptor> {
        first_function(code).unwrap().unwrap().parameters
    }

    #[test]
    fn test_reads_first_function_only() {
        let code = "import math\n\ndef first(a, b):\n    return a\n\ndef second(c):\n    return c\n";
        let signature = first_function(code).unwrap().unwrap();
        assert_eq!(signature.name, "first");
        let names: Vec<&str> = signature.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_nested_function_ignored() {
        let code = "class Helper:\n    def method(self, x):\n        pass\n\ndef solve(n: int):\n    return n\n";
        let signature = first_function(code).unwrap().unwrap();
        assert_eq!(signature.name, "solve");
    }

    #[test]
    fn test_decorated_and_async() {
        let code = "@cache\nasync def fetch(url: str) -> dict:\n    return {}\n";
        let signature = first_function(code).unwrap().unwrap();
        assert_eq!(signature.name, "fetch");
        assert_eq!(signature.parameters[0].type_tag, TypeTag::Str);
        assert_eq!(signature.return_annotation.as_deref(), Some("dict"));
    }

    #[test]
    fn test_annotations_defaults_and_optionality() {
        let code = "def f(a: int, b: List[str], c=3, d: float = -1.5, e: str = 'x'):\n    pass\n";
        let p = params(code);
        assert_eq!(p.len(), 5);

        assert_eq!(p[0].type_tag, TypeTag::Int);
        assert!(!p[0].optional);
        assert_eq!(p[1].type_tag, TypeTag::List(Box::new(TypeTag::Str)));
        assert!(!p[1].optional);

        assert_eq!(p[2].default_value, Some(json!(3)));
        assert_eq!(p[2].type_tag, TypeTag::Unknown);
        assert!(p[2].optional);

        assert_eq!(p[3].default_value, Some(json!(-1.5)));
        assert_eq!(p[4].default_value, Some(json!("x")));
    }

    #[test]
    fn test_keyword_only_after_default_is_optional() {
        let p = params("def f(a=1, *, b):\n    pass\n");
        assert_eq!(p.len(), 2);
        assert!(!p[1].has_default());
        assert!(p[1].optional);
    }

    #[test]
    fn test_splats_skipped() {
        let p = params("def f(a, *args, b: int = 2, **kwargs):\n    pass\n");
        let names: Vec<&str> = p.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_literal_defaults() {
        let code = "def f(a=None, b=True, c=[1, 2], d={'k': 'v'}, e=(1, 'x'), g=0x10, h=SOME_CONST):\n    pass\n";
        let p = params(code);
        assert_eq!(p[0].default_value, Some(Value::Null));
        assert_eq!(p[1].default_value, Some(json!(true)));
        assert_eq!(p[2].default_value, Some(json!([1, 2])));
        assert_eq!(p[3].default_value, Some(json!({"k": "v"})));
        assert_eq!(p[4].default_value, Some(json!([1, "x"])));
        assert_eq!(p[5].default_value, Some(json!(16)));
        assert_eq!(p[6].default_value, None);
        assert_eq!(p[6].default_source.as_deref(), Some("SOME_CONST"));
    }

    #[test]
    fn test_no_function() {
        assert!(first_function("x = 1\nprint(x)\n").unwrap().is_none());
        assert!(entry_point_name("").is_none());
    }

    #[test]
    fn test_string_literal_parsing() {
        assert_eq!(parse_string_literal("'a\\nb'"), Some("a\nb".to_string()));
        assert_eq!(parse_string_literal("r'a\\nb'"), Some("a\\nb".to_string()));
        assert_eq!(parse_string_literal("\"\"\"doc\"\"\""), Some("doc".to_string()));
        assert_eq!(parse_string_literal("f'{x}'"), None);
        assert_eq!(parse_string_literal("b'raw'"), None);
    }
}
