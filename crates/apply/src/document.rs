//! The YAML document type and its decoded, schema-unknown form.

use kube::core::GroupVersionKind;
use serde_json::Value as Json;

use crate::error::ApplyError;

/// Exactly one YAML document, as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YamlDocument(Vec<u8>);

impl YamlDocument {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for YamlDocument {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for YamlDocument {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for YamlDocument {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl std::fmt::Display for YamlDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// A decoded manifest: the `apiVersion`/`kind`/`metadata.name` envelope is
/// interpreted, the rest of the object tree stays opaque. Lives for one
/// apply call.
pub(crate) struct GenericResource {
    body: Json,
    gvk: GroupVersionKind,
    name: String,
}

impl GenericResource {
    pub(crate) fn decode(doc: &YamlDocument) -> Result<Self, ApplyError> {
        let body: Json = serde_yaml::from_slice(doc.as_bytes()).map_err(ApplyError::Decode)?;
        if !body.is_object() {
            return Err(ApplyError::NotAMapping);
        }
        let api_version = body
            .get("apiVersion")
            .and_then(Json::as_str)
            .ok_or(ApplyError::MissingField { field: "apiVersion" })?;
        let kind = body
            .get("kind")
            .and_then(Json::as_str)
            .ok_or(ApplyError::MissingField { field: "kind" })?
            .to_string();
        let name = body
            .get("metadata")
            .and_then(|meta| meta.get("name"))
            .and_then(Json::as_str)
            .ok_or(ApplyError::MissingField { field: "metadata.name" })?
            .to_string();
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), api_version.to_string()),
        };
        let gvk = GroupVersionKind { group, version, kind };
        Ok(Self { body, gvk, name })
    }

    pub(crate) fn gvk(&self) -> &GroupVersionKind {
        &self.gvk
    }

    pub(crate) fn kind(&self) -> &str {
        &self.gvk.kind
    }

    pub(crate) fn api_version(&self) -> String {
        if self.gvk.group.is_empty() {
            self.gvk.version.clone()
        } else {
            format!("{}/{}", self.gvk.group, self.gvk.version)
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Stamp the target namespace. The caller-supplied namespace always
    /// wins over whatever the document declared.
    pub(crate) fn set_namespace(&mut self, namespace: &str) {
        if let Some(meta) = self.metadata_mut() {
            meta.insert(
                "namespace".to_string(),
                Json::String(namespace.to_string()),
            );
        }
    }

    /// Install `reference` as the sole entry of `metadata.ownerReferences`.
    pub(crate) fn set_owner_reference(&mut self, reference: Json) {
        if let Some(meta) = self.metadata_mut() {
            meta.insert(
                "ownerReferences".to_string(),
                Json::Array(vec![reference]),
            );
        }
    }

    pub(crate) fn as_value(&self) -> &Json {
        &self.body
    }

    fn metadata_mut(&mut self) -> Option<&mut serde_json::Map<String, Json>> {
        self.body
            .as_object_mut()
            .and_then(|obj| obj.get_mut("metadata"))
            .and_then(Json::as_object_mut)
    }
}
