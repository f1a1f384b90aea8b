//! Input synthesizer
//!
//! Produces input variants for a candidate from its declared signature. The
//! candidate is parsed, never executed.

pub mod signature;
pub mod type_tag;
pub mod values;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{InputMap, SynthesisError};

pub use signature::{FunctionSignature, ParameterDescriptor};
pub use type_tag::TypeTag;

use values::{empty_value, large_value, ValueGenerator};

/// Which edge case a variant exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCaseKind {
    /// Empty collections and zero scalars
    Empty,
    /// Oversized collections, strings and numbers
    Large,
    /// Every required parameter set to null
    Null,
}

impl std::fmt::Display for EdgeCaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EdgeCaseKind::Empty => "empty",
            EdgeCaseKind::Large => "large",
            EdgeCaseKind::Null => "null",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCaseVariant {
    pub kind: EdgeCaseKind,
    pub inputs: InputMap,
}

/// Signature-driven input generation
#[derive(Debug, Clone, Default)]
pub struct InputSynthesizer {
    seed: Option<u64>,
}

impl InputSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed seed; identical code and variant counts then give identical inputs
    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Parameters of the first top-level function, empty when there is none
    pub fn extract_parameters(&self, code: &str) -> Result<Vec<ParameterDescriptor>, SynthesisError> {
        Ok(signature::first_function(code)?
            .map(|f| f.parameters)
            .unwrap_or_default())
    }

    /// `num_variants` input maps; a function without parameters gets one empty map
    pub fn generate_test_inputs(
        &self,
        code: &str,
        num_variants: usize,
    ) -> Result<Vec<InputMap>, SynthesisError> {
        let parameters = self.extract_parameters(code)?;
        if parameters.is_empty() {
            return Ok(vec![InputMap::new()]);
        }

        let seed = self.seed.unwrap_or_else(rand::random);
        let mut generator = ValueGenerator::new(seed);

        let variants = (0..num_variants)
            .map(|variant| {
                parameters
                    .iter()
                    .map(|param| {
                        let value = match &param.default_value {
                            Some(default) if param.optional && variant % 2 == 0 => {
                                default.clone()
                            }
                            _ => generator.sample(&param.type_tag, variant),
                        };
                        (param.name.clone(), value)
                    })
                    .collect::<InputMap>()
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "Synthesized {} variant(s) for {} parameter(s)",
            variants.len(),
            parameters.len()
        );
        Ok(variants)
    }

    /// Empty, large and (when something is required) null variants
    pub fn generate_edge_case_inputs(
        &self,
        code: &str,
    ) -> Result<Vec<EdgeCaseVariant>, SynthesisError> {
        let parameters = self.extract_parameters(code)?;
        if parameters.is_empty() {
            return Ok(vec![]);
        }

        let mut variants = vec![
            EdgeCaseVariant {
                kind: EdgeCaseKind::Empty,
                inputs: parameters
                    .iter()
                    .map(|p| (p.name.clone(), empty_value(&p.type_tag)))
                    .collect(),
            },
            EdgeCaseVariant {
                kind: EdgeCaseKind::Large,
                inputs: parameters
                    .iter()
                    .map(|p| (p.name.clone(), large_value(&p.type_tag)))
                    .collect(),
            },
        ];

        if parameters.iter().any(|p| !p.optional) {
            variants.push(EdgeCaseVariant {
                kind: EdgeCaseKind::Null,
                inputs: parameters
                    .iter()
                    .filter(|p| !p.optional)
                    .map(|p| (p.name.clone(), Value::Null))
                    .collect(),
            });
        }

        Ok(variants)
    }

    /// Normalized return annotation of the first top-level function.
    ///
    /// An annotation that admits `None` comes back as `Optional[<name>]`.
    pub fn get_expected_output_type(&self, code: &str) -> Option<String> {
        let annotation = signature::first_function(code)
            .ok()
            .flatten()
            .and_then(|f| f.return_annotation)?;
        let name = type_tag::normalize_type_name(&annotation)?;
        if type_tag::is_optional_annotation(&annotation) {
            Some(format!("Optional[{}]", name))
        } else {
            Some(name.to_string())
        }
    }
}
