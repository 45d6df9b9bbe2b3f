//! Raw catalog record → [`CanonicalManifest`].
//!
//! Synthesis is a pure construction step. It never touches the filesystem or
//! the network; persisting the result is the harvest queue's job.

use tracing::debug;

use crate::harvest::record::{RawAssociationGroup, RawCatalogRecord};
use crate::harvest::settings::build_setting;
use crate::harvest::traits::RejectionReason;
use crate::model::{
    AssociationHint, CanonicalManifest, DeviceProfile, Identity, ImageSet, Instruction,
    LocalizedText, ProtocolGeneration, DEFAULT_WAKE_UP_INTERVAL,
};
use crate::normalize::{parse_signed, parse_unknown_value};

/// Caller-chosen fields that are not read from the catalog record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisParams {
    pub id: String,
    pub class: String,
    pub capabilities: Vec<String>,
    pub generation: ProtocolGeneration,
    /// Catalog ID the record was fetched with.
    pub source_id: u32,
}

impl SynthesisParams {
    pub fn new(id: impl Into<String>, class: impl Into<String>, source_id: u32) -> Self {
        Self {
            id: id.into(),
            class: class.into(),
            capabilities: Vec::new(),
            generation: ProtocolGeneration::default(),
            source_id,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_generation(mut self, generation: ProtocolGeneration) -> Self {
        self.generation = generation;
        self
    }
}

/// Parses `raw` and builds a manifest from it.
///
/// # Errors
///
/// - [`RejectionReason::MalformedPayload`] if `raw` is not a JSON object
/// - [`RejectionReason::UnresolvableIdentity`] if any identity field does not
///   normalize to an integer
pub fn synthesize(raw: &str, params: &SynthesisParams) -> Result<CanonicalManifest, RejectionReason> {
    let record = RawCatalogRecord::parse(raw)
        .map_err(|e| RejectionReason::MalformedPayload(e.to_string()))?;
    synthesize_record(&record, params)
}

/// Builds a manifest from an already parsed record.
pub fn synthesize_record(
    record: &RawCatalogRecord,
    params: &SynthesisParams,
) -> Result<CanonicalManifest, RejectionReason> {
    let identity = resolve_identity(record)?;

    let mut device = DeviceProfile {
        identity,
        wake_up_interval: DEFAULT_WAKE_UP_INTERVAL,
        learnmode: instruction(record.inclusion_description.as_deref()),
        unlearnmode: instruction(record.exclusion_description.as_deref()),
        documentation_url: non_empty(record.manual_url.as_deref()).map(str::to_string),
        source_alliance_id: params.source_id,
        image_url: non_empty(record.image.as_deref()).map(str::to_string),
        association_groups: Default::default(),
        association_group_hints: Default::default(),
    };

    for group in &record.association_groups {
        let Some(number) = group_number(group) else {
            debug!(group = %group.group_number, "Skipping association group without a number");
            continue;
        };
        device.association_groups.insert(number);
        if let Some(description) = non_empty(group.description.as_deref()) {
            device.association_group_hints.insert(
                number,
                AssociationHint {
                    hint: LocalizedText::en(description),
                },
            );
        }
    }

    let settings = record
        .configuration_parameters
        .iter()
        .filter_map(|parameter| build_setting(parameter, params.generation))
        .collect();

    Ok(CanonicalManifest {
        id: params.id.clone(),
        class: params.class.clone(),
        localized_name: record.name.as_deref().map(LocalizedText::en),
        capabilities: params.capabilities.clone(),
        images: ImageSet::for_driver(&params.id),
        device,
        settings,
    })
}

/// Normalizes the identity triple of a record.
pub fn resolve_identity(record: &RawCatalogRecord) -> Result<Identity, RejectionReason> {
    let resolve = |value: &serde_json::Value, field: &'static str| {
        parse_unknown_value(value).ok_or(RejectionReason::UnresolvableIdentity { field })
    };

    Ok(Identity {
        manufacturer_id: resolve(&record.manufacturer_id, "ManufacturerId")?,
        product_type_id: resolve(&record.product_type_id, "ProductTypeId")?,
        product_id: resolve(&record.product_id, "ProductId")?,
    })
}

fn group_number(group: &RawAssociationGroup) -> Option<u32> {
    parse_signed(&group.group_number).and_then(|n| u32::try_from(n).ok())
}

fn instruction(text: Option<&str>) -> Option<Instruction> {
    non_empty(text).map(|text| Instruction {
        instruction: LocalizedText::en(text),
    })
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.filter(|text| !text.trim().is_empty())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SettingBinding, SettingKind};
    use serde_json::{json, Value};

    fn sample() -> Value {
        json!({
            "ManufacturerId": "0x0086",
            "ProductTypeId": "0x0002",
            "ProductId": "0x0064",
            "Name": "Multisensor 6",
            "ManualUrl": "https://catalog.example/manual.pdf",
            "InclusionDescription": "Press the action button once.",
            "ExclusionDescription": "",
            "Image": "https://catalog.example/image.png",
            "FrequencyName": "Europe",
            "AssociationGroups": [
                { "GroupNumber": "1", "Description": "Lifeline" },
                { "GroupNumber": "two", "Description": "Broken" },
                { "GroupNumber": 2, "Description": "" },
                { "GroupNumber": "3" }
            ],
            "ConfigurationParameters": [
                {
                    "ParameterNumber": 4,
                    "Size": 1,
                    "DefaultValue": 1,
                    "Name": "Motion sensor",
                    "Description": "Enable the PIR sensor",
                    "ConfigurationParameterValues": [
                        { "From": "0", "To": "0", "Description": "Disabled" },
                        { "From": "1", "To": "1", "Description": "Enabled" }
                    ]
                },
                {
                    "ParameterNumber": 5,
                    "Size": 1,
                    "DefaultValue": 1,
                    "Name": "Command type",
                    "ConfigurationParameterValues": [
                        { "From": "1", "To": "1", "Description": "Basic set" },
                        { "From": "2", "To": "2", "Description": "Binary report" },
                        { "From": "3", "To": "3", "Description": "Both" }
                    ]
                },
                {
                    "ParameterNumber": 3,
                    "Size": 2,
                    "DefaultValue": 240,
                    "Name": "Timeout",
                    "ConfigurationParameterValues": [{ "From": "10", "To": "3600" }]
                }
            ]
        })
    }

    fn params() -> SynthesisParams {
        SynthesisParams::new("multisensor_6", "sensor", 42)
            .with_capabilities(vec!["alarm_motion".to_string(), "measure_temperature".to_string()])
    }

    #[test]
    fn test_full_manifest() {
        let manifest = synthesize(&sample().to_string(), &params()).unwrap();

        assert_eq!(
            manifest.identity(),
            Identity {
                manufacturer_id: 134,
                product_type_id: 2,
                product_id: 100,
            }
        );
        assert_eq!(manifest.id, "multisensor_6");
        assert_eq!(manifest.class, "sensor");
        assert_eq!(manifest.capabilities, ["alarm_motion", "measure_temperature"]);
        assert_eq!(manifest.display_name(), Some("Multisensor 6"));
        assert_eq!(manifest.source_id(), 42);
        assert_eq!(
            manifest.device.documentation_url.as_deref(),
            Some("https://catalog.example/manual.pdf")
        );
        assert!(manifest.device.learnmode.is_some());
        assert!(manifest.device.unlearnmode.is_none());
        assert_eq!(manifest.images.large, "/drivers/multisensor_6/assets/images/large.png");

        let kinds: Vec<_> = manifest.settings.iter().map(|s| s.kind.type_name()).collect();
        assert_eq!(kinds, ["checkbox", "dropdown", "number"]);
        assert_eq!(manifest.settings[0].kind, SettingKind::Boolean { value: true });
        assert!(matches!(manifest.settings[2].binding, SettingBinding::Indexed { .. }));
    }

    #[test]
    fn test_association_groups() {
        let manifest = synthesize(&sample().to_string(), &params()).unwrap();

        let groups: Vec<_> = manifest.device.association_groups.iter().copied().collect();
        assert_eq!(groups, [1, 2, 3]);
        assert_eq!(manifest.device.association_group_hints.len(), 1);
        assert_eq!(
            manifest.device.association_group_hints[&1u32].hint,
            LocalizedText::en("Lifeline")
        );
    }

    #[test]
    fn test_unlearnmode_only_when_described() {
        let mut raw = sample();
        raw["ExclusionDescription"] = json!("Press the action button twice.");
        let manifest = synthesize(&raw.to_string(), &params()).unwrap();
        assert_eq!(
            manifest.device.unlearnmode.unwrap().instruction,
            LocalizedText::en("Press the action button twice.")
        );

        let value = serde_json::to_value(synthesize(&sample().to_string(), &params()).unwrap()).unwrap();
        assert!(value["zwave"].get("unlearnmode").is_none());
    }

    #[test]
    fn test_identity_resolution() {
        let mut raw = sample();
        raw["ManufacturerId"] = json!("134");
        let manifest = synthesize(&raw.to_string(), &params()).unwrap();
        assert_eq!(manifest.identity().manufacturer_id, 134);

        raw["ManufacturerId"] = json!("garbage");
        let err = synthesize(&raw.to_string(), &params()).unwrap_err();
        assert_eq!(
            err,
            RejectionReason::UnresolvableIdentity {
                field: "ManufacturerId"
            }
        );

        let mut raw = sample();
        raw.as_object_mut().unwrap().remove("ProductId");
        let err = synthesize(&raw.to_string(), &params()).unwrap_err();
        assert_eq!(err, RejectionReason::UnresolvableIdentity { field: "ProductId" });
    }

    #[test]
    fn test_malformed_payload() {
        let err = synthesize("{ not json", &params()).unwrap_err();
        assert!(matches!(err, RejectionReason::MalformedPayload(_)));

        let err = synthesize("null", &params()).unwrap_err();
        assert!(matches!(err, RejectionReason::MalformedPayload(_)));

        let err = synthesize(r#"[134, 2, 100, "Name"]"#, &params()).unwrap_err();
        assert!(matches!(err, RejectionReason::MalformedPayload(_)));
    }

    #[test]
    fn test_synthesis_is_pure() {
        let raw = sample().to_string();
        let first = serde_json::to_string_pretty(&synthesize(&raw, &params()).unwrap()).unwrap();
        let second = serde_json::to_string_pretty(&synthesize(&raw, &params()).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_minimal_record() {
        let raw = json!({ "ManufacturerId": 1, "ProductTypeId": 2, "ProductId": 3 }).to_string();
        let manifest = synthesize(&raw, &params()).unwrap();

        assert!(manifest.localized_name.is_none());
        assert!(manifest.settings.is_empty());
        assert!(manifest.device.association_groups.is_empty());

        let value = serde_json::to_value(&manifest).unwrap();
        assert!(value.get("name").is_none());
        assert!(value["zwave"].get("productDocumentation").is_none());
        assert_eq!(value["zwave"]["wakeUpInterval"], 3600);
    }

    #[test]
    fn test_legacy_generation_keys_settings_by_size() {
        let params = params().with_generation(ProtocolGeneration::Legacy);
        let manifest = synthesize(&sample().to_string(), &params).unwrap();
        assert!(manifest
            .settings
            .iter()
            .all(|s| matches!(s.binding, SettingBinding::Sized { .. })));
    }
}
