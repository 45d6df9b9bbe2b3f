use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Default wake-up interval written into every manifest, in seconds.
pub const DEFAULT_WAKE_UP_INTERVAL: u32 = 3600;

/// Canonical driver manifest synthesized from one catalog record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalManifest {
    pub id: String,
    pub class: String,
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub localized_name: Option<LocalizedText>,
    pub capabilities: Vec<String>,
    pub images: ImageSet,
    #[serde(rename = "zwave")]
    pub device: DeviceProfile,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settings: Vec<SettingSpec>,
}

impl CanonicalManifest {
    pub fn identity(&self) -> Identity {
        self.device.identity
    }

    pub fn source_id(&self) -> u32 {
        self.device.source_alliance_id
    }

    /// English display name, if the catalog had one.
    pub fn display_name(&self) -> Option<&str> {
        self.localized_name.as_ref().map(|name| name.en.as_str())
    }
}

/// Protocol-level device identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub manufacturer_id: u64,
    pub product_type_id: u64,
    pub product_id: u64,
}

/// Protocol section of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    #[serde(flatten)]
    pub identity: Identity,
    pub wake_up_interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learnmode: Option<Instruction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlearnmode: Option<Instruction>,
    #[serde(rename = "productDocumentation", default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(rename = "zwaveAllianceProductId")]
    pub source_alliance_id: u32,
    #[serde(rename = "imageRemotePath", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub association_groups: BTreeSet<u32>,
    #[serde(rename = "associationGroupsOptions", default)]
    pub association_group_hints: BTreeMap<u32, AssociationHint>,
}

/// Localized string. The catalog only publishes English text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub en: String,
}

impl LocalizedText {
    pub fn en(text: impl Into<String>) -> Self {
        Self { en: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub instruction: LocalizedText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationHint {
    pub hint: LocalizedText,
}

/// Asset paths handed to the image collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSet {
    pub large: String,
    pub small: String,
}

impl ImageSet {
    pub fn for_driver(driver_id: &str) -> Self {
        Self {
            large: format!("/drivers/{driver_id}/assets/images/large.png"),
            small: format!("/drivers/{driver_id}/assets/images/small.png"),
        }
    }
}

/// Target driver SDK generation. Only changes how settings are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolGeneration {
    /// SDK 1: settings carry a flat `_size`.
    Legacy,
    /// SDK 2: settings carry a `zwave: { index, size }` binding.
    #[default]
    Current,
}

impl ProtocolGeneration {
    pub fn from_sdk_version(version: u8) -> Self {
        match version {
            1 => Self::Legacy,
            _ => Self::Current,
        }
    }
}

/// One configurable device parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingSpec {
    pub id: u32,
    #[serde(flatten)]
    pub kind: SettingKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<LocalizedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<LocalizedText>,
    #[serde(flatten)]
    pub binding: SettingBinding,
}

impl SettingSpec {
    pub fn byte_size(&self) -> u8 {
        match &self.binding {
            SettingBinding::Indexed { zwave } => zwave.size,
            SettingBinding::Sized { size } => *size,
        }
    }
}

/// Inferred value type of a setting, with its typed default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SettingKind {
    #[serde(rename = "checkbox")]
    Boolean { value: bool },
    #[serde(rename = "dropdown")]
    Enumerated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        values: Vec<SettingOption>,
    },
    #[serde(rename = "number")]
    Numeric {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<i64>,
        attr: NumericBounds,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signed: Option<bool>,
    },
}

impl SettingKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean { .. } => "checkbox",
            Self::Enumerated { .. } => "dropdown",
            Self::Numeric { .. } => "number",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingOption {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<LocalizedText>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NumericBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

/// How a setting is addressed on the device, per [`ProtocolGeneration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingBinding {
    Indexed { zwave: ParameterBinding },
    Sized {
        #[serde(rename = "_size")]
        size: u8,
    },
}

impl SettingBinding {
    pub fn new(generation: ProtocolGeneration, index: u32, size: u8) -> Self {
        match generation {
            ProtocolGeneration::Current => Self::Indexed {
                zwave: ParameterBinding { index, size },
            },
            ProtocolGeneration::Legacy => Self::Sized { size },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterBinding {
    pub index: u32,
    pub size: u8,
}

/// One row of the aggregate catalog index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogIndexEntry {
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "zwaveAllianceProductId")]
    pub source_id: u32,
    pub path: PathBuf,
}
