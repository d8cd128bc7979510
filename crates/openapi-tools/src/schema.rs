//! `OpenAPI` schema → JSON Schema conversion for tool input schemas.

use crate::resolver::RefResolver;
use openapiv3::{ParameterSchemaOrContent, ReferenceOr, Schema, SchemaKind, Type};
use serde_json::{Map, Value, json};

/// Nested `$ref`s are inlined up to this depth and left as `{"$ref": ...}` below it.
const MAX_INLINE_DEPTH: usize = 6;

/// Convert a schema, inlining local refs.
#[must_use]
pub fn schema_to_json(schema: &Schema, resolver: &RefResolver) -> Value {
    convert(schema, resolver, 0)
}

/// Convert a (possibly referenced) schema.
#[must_use]
pub fn schema_ref_to_json(schema: &ReferenceOr<Schema>, resolver: &RefResolver) -> Value {
    match schema {
        ReferenceOr::Item(s) => convert(s, resolver, 0),
        ReferenceOr::Reference { reference } => match resolver.schema(schema) {
            Ok(s) => convert(&s, resolver, 1),
            Err(_) => json!({ "$ref": reference }),
        },
    }
}

/// Convert an object property schema.
#[must_use]
pub fn property_to_json(schema: &ReferenceOr<Box<Schema>>, resolver: &RefResolver) -> Value {
    boxed_to_json(schema, resolver, 0)
}

/// Schema of a parameter; content-encoded parameters are treated as strings.
#[must_use]
pub fn parameter_schema(format: &ParameterSchemaOrContent, resolver: &RefResolver) -> Value {
    match format {
        ParameterSchemaOrContent::Schema(schema) => schema_ref_to_json(schema, resolver),
        ParameterSchemaOrContent::Content(_) => json!({ "type": "string" }),
    }
}

fn boxed_to_json(schema: &ReferenceOr<Box<Schema>>, resolver: &RefResolver, depth: usize) -> Value {
    match schema {
        ReferenceOr::Item(s) => convert(s, resolver, depth + 1),
        ReferenceOr::Reference { reference } if depth >= MAX_INLINE_DEPTH => {
            json!({ "$ref": reference })
        }
        ReferenceOr::Reference { reference } => match resolver.boxed_schema(schema) {
            Ok(s) => convert(&s, resolver, depth + 1),
            Err(_) => json!({ "$ref": reference }),
        },
    }
}

fn unboxed_to_json(schema: &ReferenceOr<Schema>, resolver: &RefResolver, depth: usize) -> Value {
    match schema {
        ReferenceOr::Item(s) => convert(s, resolver, depth + 1),
        ReferenceOr::Reference { reference } if depth >= MAX_INLINE_DEPTH => {
            json!({ "$ref": reference })
        }
        ReferenceOr::Reference { reference } => match resolver.schema(schema) {
            Ok(s) => convert(&s, resolver, depth + 1),
            Err(_) => json!({ "$ref": reference }),
        },
    }
}

fn convert(schema: &Schema, resolver: &RefResolver, depth: usize) -> Value {
    let mut out = Map::new();

    match &schema.schema_kind {
        SchemaKind::Type(Type::String(s)) => {
            out.insert("type".into(), json!("string"));
            let values: Vec<&String> = s.enumeration.iter().flatten().collect();
            if !values.is_empty() {
                out.insert("enum".into(), json!(values));
            }
        }
        SchemaKind::Type(Type::Number(_)) => {
            out.insert("type".into(), json!("number"));
        }
        SchemaKind::Type(Type::Integer(_)) => {
            out.insert("type".into(), json!("integer"));
        }
        SchemaKind::Type(Type::Boolean(_)) => {
            out.insert("type".into(), json!("boolean"));
        }
        SchemaKind::Type(Type::Array(a)) => {
            out.insert("type".into(), json!("array"));
            if let Some(items) = &a.items {
                out.insert("items".into(), boxed_to_json(items, resolver, depth));
            }
        }
        SchemaKind::Type(Type::Object(o)) => {
            out.insert("type".into(), json!("object"));
            if !o.properties.is_empty() {
                let props: Map<String, Value> = o
                    .properties
                    .iter()
                    .map(|(name, prop)| (name.clone(), boxed_to_json(prop, resolver, depth)))
                    .collect();
                out.insert("properties".into(), Value::Object(props));
            }
            if !o.required.is_empty() {
                out.insert("required".into(), json!(o.required));
            }
        }
        SchemaKind::AllOf { all_of } => {
            let parts: Vec<Value> = all_of
                .iter()
                .map(|s| unboxed_to_json(s, resolver, depth))
                .collect();
            if let [single] = parts.as_slice() {
                merge_into(&mut out, single);
            } else {
                out.insert("allOf".into(), Value::Array(parts));
            }
        }
        SchemaKind::AnyOf { any_of: variants } | SchemaKind::OneOf { one_of: variants } => {
            // `Optional[T]` comes out as `anyOf: [T, {type: null}]`; collapse it to `T`.
            let parts: Vec<Value> = variants
                .iter()
                .map(|s| unboxed_to_json(s, resolver, depth))
                .filter(|v| v.get("type").and_then(Value::as_str) != Some("null"))
                .collect();
            match parts.as_slice() {
                [] => {}
                [single] => merge_into(&mut out, single),
                _ => {
                    out.insert("anyOf".into(), Value::Array(parts));
                }
            }
        }
        SchemaKind::Not { .. } => {}
        SchemaKind::Any(any) => {
            if let Some(typ) = &any.typ {
                out.insert("type".into(), json!(typ));
            }
        }
    }

    if let Some(desc) = &schema.schema_data.description {
        out.insert("description".into(), json!(desc));
    } else if let Some(title) = &schema.schema_data.title {
        out.entry("description").or_insert_with(|| json!(title));
    }
    if let Some(default) = &schema.schema_data.default {
        out.insert("default".into(), default.clone());
    }

    Value::Object(out)
}

fn merge_into(out: &mut Map<String, Value>, value: &Value) {
    if let Some(obj) = value.as_object() {
        for (k, v) in obj {
            out.insert(k.clone(), v.clone());
        }
    }
}

/// Render a JSON value for a URL, header or form field.
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}
