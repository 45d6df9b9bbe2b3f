//! Setting type inference.
//!
//! The catalog never says what kind of value a configuration parameter holds,
//! so the kind is guessed from the shape of its value ranges. [`SETTING_RULES`]
//! lists the guesses in precedence order; the first match wins:
//!
//! 1. [`BooleanRule`]: exactly two ranges whose bounds are all the strings
//!    `"0"` or `"1"`.
//! 2. [`EnumeratedRule`]: three or more ranges, one option per range.
//! 3. [`NumericRule`]: everything else, bounded by the first range.
//!
//! The boolean rule has to run before the enumerated one so that an on/off
//! parameter never ends up as a two-entry dropdown.

use serde_json::Value;
use tracing::{debug, warn};

use crate::harvest::record::{scalar_text, RawParameter};
use crate::harvest::traits::SettingRule;
use crate::model::{
    LocalizedText, NumericBounds, ProtocolGeneration, SettingBinding, SettingKind, SettingOption,
    SettingSpec,
};
use crate::normalize::parse_signed;

/// Byte widths a device parameter can be encoded in.
pub const VALID_SIZES: [u8; 3] = [1, 2, 4];

/// Inference rules in precedence order.
pub static SETTING_RULES: &[&dyn SettingRule] = &[&BooleanRule, &EnumeratedRule, &NumericRule];

/// Two ranges, every bound literally the string `"0"` or `"1"`.
pub struct BooleanRule;

impl SettingRule for BooleanRule {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn matches(&self, parameter: &RawParameter) -> bool {
        let ranges = parameter.ranges();
        ranges.len() == 2
            && ranges
                .iter()
                .all(|range| is_binary_literal(&range.from) && is_binary_literal(&range.to))
    }

    fn build(&self, parameter: &RawParameter) -> SettingKind {
        let value = parse_signed(&parameter.default_value).is_some_and(|v| v != 0);
        SettingKind::Boolean { value }
    }
}

/// Three or more ranges, each one an option.
pub struct EnumeratedRule;

impl SettingRule for EnumeratedRule {
    fn name(&self) -> &'static str {
        "enumerated"
    }

    fn matches(&self, parameter: &RawParameter) -> bool {
        parameter.ranges().len() >= 3
    }

    fn build(&self, parameter: &RawParameter) -> SettingKind {
        let values = parameter
            .ranges()
            .iter()
            .map(|range| SettingOption {
                id: scalar_text(&range.from)
                    .filter(|id| !id.is_empty())
                    .or_else(|| scalar_text(&range.to))
                    .unwrap_or_default(),
                label: localized(range.description.as_deref()),
            })
            .collect();

        SettingKind::Enumerated {
            value: scalar_text(&parameter.default_value),
            values,
        }
    }
}

/// Fallback: a number, bounded by the first range when it has bounds.
pub struct NumericRule;

impl SettingRule for NumericRule {
    fn name(&self) -> &'static str {
        "numeric"
    }

    fn matches(&self, _parameter: &RawParameter) -> bool {
        true
    }

    fn build(&self, parameter: &RawParameter) -> SettingKind {
        let attr = parameter
            .ranges()
            .first()
            .map(|range| NumericBounds {
                min: parse_signed(&range.from),
                max: parse_signed(&range.to),
            })
            .unwrap_or_default();

        let size = parse_size(&parameter.size);
        let signed = match (size, attr.max) {
            (Some(size), Some(max)) if is_unsigned_encoding(size, max) => Some(false),
            _ => None,
        };

        SettingKind::Numeric {
            value: parse_signed(&parameter.default_value),
            attr,
            signed,
        }
    }
}

/// Whether `max` only fits `size` bytes as an unsigned value.
///
/// Upper bounds are exclusive: a 1-byte parameter with max exactly 255 stays
/// signed.
pub fn is_unsigned_encoding(size: u8, max: i64) -> bool {
    match size {
        1 => max > 127 && max < 255,
        2 => max > 32_767 && max < 65_535,
        4 => max > 2_147_483_647 && max < 4_294_967_295,
        _ => false,
    }
}

/// Runs the rules in order and builds the kind from the first match.
pub fn classify(parameter: &RawParameter) -> SettingKind {
    let rule = SETTING_RULES
        .iter()
        .copied()
        .find(|rule| rule.matches(parameter))
        .unwrap_or(&NumericRule as &dyn SettingRule);

    debug!(
        parameter = %parameter.parameter_number,
        ranges = parameter.ranges().len(),
        rule = rule.name(),
        "Classified setting"
    );
    rule.build(parameter)
}

/// Builds a full setting from a parameter descriptor.
///
/// Returns `None` for descriptors without a usable parameter number or byte
/// size; those cannot be addressed on the device.
pub fn build_setting(parameter: &RawParameter, generation: ProtocolGeneration) -> Option<SettingSpec> {
    let id = parse_signed(&parameter.parameter_number).and_then(|n| u32::try_from(n).ok());
    let size = parse_size(&parameter.size);

    let (Some(id), Some(size)) = (id, size) else {
        warn!(
            parameter = %parameter.parameter_number,
            size = %parameter.size,
            "Skipping unaddressable parameter"
        );
        return None;
    };

    Some(SettingSpec {
        id,
        kind: classify(parameter),
        label: localized(parameter.name.as_deref()),
        hint: localized(parameter.description.as_deref()),
        binding: SettingBinding::new(generation, id, size),
    })
}

fn parse_size(value: &Value) -> Option<u8> {
    parse_signed(value)
        .and_then(|n| u8::try_from(n).ok())
        .filter(|size| VALID_SIZES.contains(size))
}

/// Only the strings `"0"` and `"1"`; numeric bounds never make a checkbox.
fn is_binary_literal(value: &Value) -> bool {
    matches!(value.as_str(), Some("0" | "1"))
}

fn localized(text: Option<&str>) -> Option<LocalizedText> {
    text.map(LocalizedText::en)
}

// ============================================================================
// Tests
// ============================================================================
