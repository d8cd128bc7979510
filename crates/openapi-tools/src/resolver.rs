//! Local `$ref` resolution.
//!
//! `openapiv3` models references as `ReferenceOr<T>` without resolving them. R2R publishes a single
//! self-contained document, so only in-document refs (`#/components/...`) are followed; anything
//! else is reported as unsupported.

use crate::error::{OpenApiToolsError, Result};
use openapiv3::{OpenAPI, Parameter, PathItem, ReferenceOr, RequestBody, Schema};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct RefResolver {
    root: Value,
}

impl RefResolver {
    #[must_use]
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// # Errors
    ///
    /// Returns an error if the document cannot be converted to JSON.
    pub fn from_spec(spec: &OpenAPI) -> Result<Self> {
        let root =
            serde_json::to_value(spec).map_err(|e| OpenApiToolsError::OpenApi(e.to_string()))?;
        Ok(Self::from_value(root))
    }

    /// # Errors
    ///
    /// Returns an error if the reference is external, dangling, cyclic or of the wrong type.
    pub fn parameter(&self, param: &ReferenceOr<Parameter>) -> Result<Parameter> {
        self.resolve(param)
    }

    /// # Errors
    ///
    /// As [`Self::parameter`].
    pub fn path_item(&self, item: &ReferenceOr<PathItem>) -> Result<PathItem> {
        self.resolve(item)
    }

    /// # Errors
    ///
    /// As [`Self::parameter`].
    pub fn request_body(&self, body: &ReferenceOr<RequestBody>) -> Result<RequestBody> {
        self.resolve(body)
    }

    /// # Errors
    ///
    /// As [`Self::parameter`].
    pub fn schema(&self, schema: &ReferenceOr<Schema>) -> Result<Schema> {
        self.resolve(schema)
    }

    /// Boxed-schema variant used by object properties and array items.
    ///
    /// # Errors
    ///
    /// As [`Self::parameter`].
    pub fn boxed_schema(&self, schema: &ReferenceOr<Box<Schema>>) -> Result<Schema> {
        match schema {
            ReferenceOr::Item(s) => Ok((**s).clone()),
            ReferenceOr::Reference { reference } => self.resolve(&ReferenceOr::<Schema>::Reference {
                reference: reference.clone(),
            }),
        }
    }

    fn resolve<T>(&self, r: &ReferenceOr<T>) -> Result<T>
    where
        T: Clone + DeserializeOwned,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut cur = r.clone();

        loop {
            match cur {
                ReferenceOr::Item(item) => return Ok(item),
                ReferenceOr::Reference { reference } => {
                    if !seen.insert(reference.clone()) {
                        return Err(OpenApiToolsError::OpenApi(format!(
                            "Cyclic $ref detected while resolving: {reference}"
                        )));
                    }
                    let value = self.lookup(&reference)?;
                    cur = serde_json::from_value(value).map_err(|e| {
                        OpenApiToolsError::OpenApi(format!(
                            "Referenced value '{reference}' has an unexpected shape: {e}"
                        ))
                    })?;
                }
            }
        }
    }

    fn lookup(&self, reference: &str) -> Result<Value> {
        let pointer = reference.strip_prefix('#').ok_or_else(|| {
            OpenApiToolsError::OpenApi(format!(
                "External $ref '{reference}' is not supported; only '#/...' refs are resolved"
            ))
        })?;
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(OpenApiToolsError::OpenApi(format!(
                "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}"
            )));
        }
        self.root.pointer(pointer).cloned().ok_or_else(|| {
            OpenApiToolsError::OpenApi(format!("Unresolved $ref '{reference}'"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver() -> RefResolver {
        RefResolver::from_value(json!({
            "components": {
                "parameters": {
                    "DocumentId": {"name": "id", "in": "path", "required": true, "schema": {"type": "string"}},
                    "Alias": {"$ref": "#/components/parameters/DocumentId"},
                    "LoopA": {"$ref": "#/components/parameters/LoopB"},
                    "LoopB": {"$ref": "#/components/parameters/LoopA"}
                }
            }
        }))
    }

    fn reference(r: &str) -> ReferenceOr<Parameter> {
        ReferenceOr::Reference {
            reference: r.to_string(),
        }
    }

    #[test]
    fn follows_chained_local_refs() {
        let p = resolver()
            .parameter(&reference("#/components/parameters/Alias"))
            .expect("resolve");
        assert_eq!(p.parameter_data_ref().name, "id");
    }

    #[test]
    fn detects_cycles() {
        let err = resolver()
            .parameter(&reference("#/components/parameters/LoopA"))
            .unwrap_err();
        assert!(err.to_string().contains("Cyclic"), "{err}");
    }

    #[test]
    fn rejects_external_and_dangling_refs() {
        let r = resolver();
        assert!(r.parameter(&reference("common.yaml#/Param")).is_err());
        let err = r
            .parameter(&reference("#/components/parameters/Missing"))
            .unwrap_err();
        assert!(err.to_string().contains("Unresolved"), "{err}");
    }
}
