//! The host's service configuration graph.
//!
//! These types model the slice of the service manifest that selection cares
//! about: the stack's resource definitions and the provider's access-policy
//! statements. Everything else in the manifest is opaque and carried through
//! untouched via flattened maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tokio::io::AsyncWriteExt;

use crate::{
    CreateFileSnafu, ManifestParseSnafu, ManifestReadSnafu, Result, TemplateSerializeSnafu,
    WriteFileSnafu,
};

/// An optional allow-list narrowing which deployment targets include a
/// resource along one dimension (region or stage).
///
/// Validated once, at parse time: absent, `null`, an empty sequence or any
/// non-sequence value all mean the resource is unrestricted along this
/// dimension. A non-empty sequence restricts the resource to the sequence's
/// string elements. Non-string elements are dropped from the allow-list but
/// the restriction stays in force, so a sequence with no string elements
/// matches no target at all.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Restriction {
    #[default]
    Unrestricted,
    Only(Vec<String>),
}

impl Restriction {
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Restriction::Unrestricted)
    }

    /// Whether the given deployment target passes this restriction.
    ///
    /// An unknown target never filters: selection along a dimension only
    /// activates when the deployment target for that dimension is known.
    pub fn allows(&self, target: Option<&str>) -> bool {
        match (self, target) {
            (Restriction::Unrestricted, _) => true,
            (Restriction::Only(_), None) => true,
            (Restriction::Only(list), Some(target)) => list.iter().any(|t| t == target),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Restriction {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Array(items) if !items.is_empty() => Restriction::Only(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        serde_json::Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => Restriction::Unrestricted,
        })
    }
}

impl serde::Serialize for Restriction {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Restriction::Unrestricted => serializer.serialize_none(),
            Restriction::Only(list) => list.serialize(serializer),
        }
    }
}

/// One declared infrastructure resource.
///
/// Only the `regions` and `stages` restriction lists are interpreted. The
/// rest of the definition (`Type`, `Properties`, ...) is the resource's
/// template body and is preserved verbatim unless the whole resource is
/// dropped.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResourceDef {
    #[serde(default, skip_serializing_if = "Restriction::is_unrestricted")]
    pub regions: Restriction,
    #[serde(default, skip_serializing_if = "Restriction::is_unrestricted")]
    pub stages: Restriction,
    #[serde(flatten)]
    pub body: serde_json::Map<String, serde_json::Value>,
}

/// Resource definitions, keyed by resource name.
pub type ResourceMap = BTreeMap<String, ResourceDef>;

/// The stack section of the manifest: the declared resources plus any
/// sibling template sections (outputs, conditions, ...).
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Stack {
    #[serde(rename = "Resources", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: ResourceMap,
    #[serde(flatten)]
    pub sections: serde_json::Map<String, serde_json::Value>,
}

impl Stack {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.sections.is_empty()
    }
}

/// One entry of the provider's access-policy statement list.
///
/// The `Resource` collection accepts either a single reference or a
/// sequence of references and is normalized to a sequence. Each reference
/// is an opaque value: a literal string naming a resource directly, or a
/// structured reference that embeds the resource name somewhere inside.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PolicyStatement {
    #[serde(
        rename = "Resource",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub resource: Vec<serde_json::Value>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

fn one_or_many<'de, D>(deserializer: D) -> core::result::Result<Vec<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => Vec::new(),
        value => vec![value],
    })
}

/// The provider section of the manifest.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Provider {
    #[serde(
        rename = "iamRoleStatements",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub iam_role_statements: Vec<PolicyStatement>,
    #[serde(flatten)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl Provider {
    pub fn is_empty(&self) -> bool {
        self.iam_role_statements.is_empty() && self.settings.is_empty()
    }
}

/// The host's live service configuration.
///
/// Owns the resource map and the statement list that selection mutates in
/// place. A manifest without a `resources` section deserializes to an empty
/// stack; no further validation is performed here.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Service {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Provider::is_empty")]
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Stack::is_empty")]
    pub resources: Stack,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl Service {
    /// Read a service manifest from a YAML file.
    pub fn read_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("reading service manifest {path:?}");
        let contents = std::fs::read_to_string(path).context(ManifestReadSnafu { path })?;
        let service: Service =
            serde_yaml::from_str(&contents).context(ManifestParseSnafu { path })?;
        log::trace!(
            "manifest declares {} resources",
            service.resources.resources.len()
        );
        Ok(service)
    }

    /// Render the stack as a pretty-printed JSON deployment template.
    pub fn template_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.resources).context(TemplateSerializeSnafu {
            service: self.service.clone().unwrap_or_else(|| "service".to_owned()),
        })
    }

    /// Write the deployment template to a file.
    pub async fn write_template(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = self.template_json()?;
        log::info!("writing deployment template to {path:?}");

        // Ensure the parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(&parent)
                .await
                .context(CreateFileSnafu { path: parent })?;
        }

        let mut file = tokio::fs::File::create(&path)
            .await
            .context(CreateFileSnafu { path })?;
        file.write_all(contents.as_bytes())
            .await
            .context(WriteFileSnafu { path })?;
        Ok(())
    }
}
