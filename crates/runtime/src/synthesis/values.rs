//! Sample tables and value generation

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};

use super::type_tag::TypeTag;

pub const INT_SAMPLES: [i64; 6] = [0, 1, -1, 42, 1000, -1000];
#[allow(clippy::approx_constant)]
pub const FLOAT_SAMPLES: [f64; 6] = [0.0, 1.0, -1.0, 3.14159, 1e6, -0.5];
pub const BOOL_SAMPLES: [bool; 2] = [true, false];

/// Value given to parameters with no usable annotation
pub const FALLBACK_VALUE: &str = "test";

pub const LARGE_LIST_LEN: usize = 10_000;
pub const LARGE_STR_LEN: usize = 100_000;
pub const LARGE_DICT_LEN: usize = 1_000;
pub const LARGE_FLOAT: f64 = 1e308;

const STR_SAMPLE_COUNT: usize = 6;

/// String sample `index` of the cycling table
pub fn str_sample(index: usize) -> String {
    match index % STR_SAMPLE_COUNT {
        0 => "test".to_string(),
        1 => String::new(),
        2 => "hello world".to_string(),
        3 => "a".repeat(50),
        4 => "special!@#$%".to_string(),
        _ => "unicode_ñ".to_string(),
    }
}

/// Seeded generator for type-driven values
pub struct ValueGenerator {
    rng: StdRng,
}

impl ValueGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Value for variant `variant` of a parameter tagged `tag`
    pub fn sample(&mut self, tag: &TypeTag, variant: usize) -> Value {
        match tag {
            TypeTag::Int => json!(INT_SAMPLES[variant % INT_SAMPLES.len()]),
            TypeTag::Float => json!(FLOAT_SAMPLES[variant % FLOAT_SAMPLES.len()]),
            TypeTag::Str => json!(str_sample(variant)),
            TypeTag::Bool => json!(BOOL_SAMPLES[variant % BOOL_SAMPLES.len()]),
            TypeTag::List(element) => {
                let size = (variant % 5).max(1);
                Value::Array((0..size).map(|_| self.element(element)).collect())
            }
            TypeTag::Dict(value) => {
                let size = (variant % 3).max(1);
                let mut map = Map::new();
                for k in 0..size {
                    map.insert(format!("key_{}", k), self.element(value));
                }
                Value::Object(map)
            }
            TypeTag::Tuple(elements) if elements.is_empty() => {
                json!([variant as i64, variant as i64 + 1])
            }
            TypeTag::Tuple(elements) => Value::Array(
                elements
                    .iter()
                    .map(|element| self.sample(element, variant))
                    .collect(),
            ),
            TypeTag::Unknown => json!(FALLBACK_VALUE),
        }
    }

    /// Random collection element drawn from the sample tables
    fn element(&mut self, tag: &TypeTag) -> Value {
        match tag {
            TypeTag::Int | TypeTag::Unknown => {
                json!(INT_SAMPLES[self.rng.gen_range(0..INT_SAMPLES.len())])
            }
            TypeTag::Float => json!(FLOAT_SAMPLES[self.rng.gen_range(0..FLOAT_SAMPLES.len())]),
            TypeTag::Str => json!(str_sample(self.rng.gen_range(0..STR_SAMPLE_COUNT))),
            TypeTag::Bool => json!(self.rng.gen_bool(0.5)),
            nested => {
                let variant = self.rng.gen_range(0..5);
                self.sample(nested, variant)
            }
        }
    }
}

/// Empty or zero value for a tag
pub fn empty_value(tag: &TypeTag) -> Value {
    match tag {
        TypeTag::Int => json!(0),
        TypeTag::Float => json!(0.0),
        TypeTag::Str => json!(""),
        TypeTag::Bool => json!(false),
        TypeTag::List(_) | TypeTag::Tuple(_) => json!([]),
        TypeTag::Dict(_) => json!({}),
        TypeTag::Unknown => Value::Null,
    }
}

/// Oversized value for a tag
pub fn large_value(tag: &TypeTag) -> Value {
    match tag {
        TypeTag::Int => json!(i64::MAX),
        TypeTag::Float => json!(LARGE_FLOAT),
        TypeTag::Str | TypeTag::Unknown => json!("a".repeat(LARGE_STR_LEN)),
        TypeTag::Bool => json!(true),
        TypeTag::List(element) => Value::Array(
            (0..LARGE_LIST_LEN)
                .map(|i| large_element(element, i))
                .collect(),
        ),
        TypeTag::Dict(value) => {
            let mut map = Map::new();
            for k in 0..LARGE_DICT_LEN {
                map.insert(format!("key_{}", k), large_element(value, k));
            }
            Value::Object(map)
        }
        TypeTag::Tuple(elements) if elements.is_empty() => {
            Value::Array((0..LARGE_LIST_LEN).map(|i| json!(i)).collect())
        }
        TypeTag::Tuple(elements) => Value::Array(elements.iter().map(large_value).collect()),
    }
}

fn large_element(tag: &TypeTag, index: usize) -> Value {
    match tag {
        TypeTag::Float => json!(index as f64),
        TypeTag::Str => json!(str_sample(index)),
        TypeTag::Bool => json!(index % 2 == 0),
        _ => json!(index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::approx_constant)]
    fn test_scalar_tables_cycle() {
        let mut generator = ValueGenerator::new(7);
        assert_eq!(generator.sample(&TypeTag::Int, 3), json!(42));
        assert_eq!(generator.sample(&TypeTag::Int, 9), json!(42));
        assert_eq!(generator.sample(&TypeTag::Float, 3), json!(3.14159));
        assert_eq!(generator.sample(&TypeTag::Str, 1), json!(""));
        assert_eq!(generator.sample(&TypeTag::Str, 3), json!("a".repeat(50)));
        assert_eq!(generator.sample(&TypeTag::Bool, 1), json!(false));
        assert_eq!(generator.sample(&TypeTag::Unknown, 4), json!(FALLBACK_VALUE));
    }

    #[test]
    fn test_collection_sizes() {
        let mut generator = ValueGenerator::new(7);
        let list = TypeTag::List(Box::new(TypeTag::Int));
        assert_eq!(generator.sample(&list, 0).as_array().unwrap().len(), 1);
        assert_eq!(generator.sample(&list, 3).as_array().unwrap().len(), 3);
        assert_eq!(generator.sample(&list, 5).as_array().unwrap().len(), 1);

        let dict = TypeTag::Dict(Box::new(TypeTag::Str));
        let value = generator.sample(&dict, 2);
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("key_0") && map.contains_key("key_1"));
    }

    #[test]
    fn test_tuples() {
        let mut generator = ValueGenerator::new(7);
        assert_eq!(generator.sample(&TypeTag::Tuple(vec![]), 4), json!([4, 5]));
        let typed = TypeTag::Tuple(vec![TypeTag::Int, TypeTag::Bool]);
        assert_eq!(generator.sample(&typed, 1), json!([1, false]));
    }

    #[test]
    fn test_same_seed_same_values() {
        let tag = TypeTag::List(Box::new(TypeTag::Str));
        let a: Vec<Value> = {
            let mut g = ValueGenerator::new(99);
            (0..10).map(|i| g.sample(&tag, i)).collect()
        };
        let b: Vec<Value> = {
            let mut g = ValueGenerator::new(99);
            (0..10).map(|i| g.sample(&tag, i)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_and_large() {
        assert_eq!(empty_value(&TypeTag::List(Box::new(TypeTag::Int))), json!([]));
        assert_eq!(empty_value(&TypeTag::Unknown), Value::Null);

        let big_list = large_value(&TypeTag::List(Box::new(TypeTag::Int)));
        assert_eq!(big_list.as_array().unwrap().len(), LARGE_LIST_LEN);
        assert_eq!(
            large_value(&TypeTag::Str).as_str().unwrap().len(),
            LARGE_STR_LEN
        );
        assert_eq!(large_value(&TypeTag::Int), json!(i64::MAX));
        assert_eq!(
            large_value(&TypeTag::Dict(Box::new(TypeTag::Int)))
                .as_object()
                .unwrap()
                .len(),
            LARGE_DICT_LEN
        );
    }
}
