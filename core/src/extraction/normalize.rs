use super::tags::hex_key;
use crate::types::TagValue;
use dicom_core::value::{PrimitiveValue, Value};
use dicom_core::VR;

/// Normalizes a decoded element value into a comparable form
///
/// Returns `None` when the value must be left out of the tag map:
/// sequences, encapsulated pixel data, binary payloads, and anything that
/// fails to convert. Multi-valued elements become [`TagValue::List`], with
/// unconvertible members dropped.
///
/// # Arguments
///
/// * `vr` - Value representation from the element header
/// * `value` - Decoded element value
pub fn normalize<I, P>(vr: VR, value: &Value<I, P>) -> Option<TagValue> {
    match value {
        Value::Primitive(primitive) => normalize_primitive(vr, primitive),
        // sequences and pixel fragments
        _ => None,
    }
}

/// Normalizes a primitive value
pub fn normalize_primitive(vr: VR, value: &PrimitiveValue) -> Option<TagValue> {
    if is_binary_vr(vr) {
        return None;
    }

    let members: Vec<Option<TagValue>> = match value {
        PrimitiveValue::Empty => return empty_value(vr),
        PrimitiveValue::Str(s) => vec![normalize_str(vr, s)],
        PrimitiveValue::Strs(values) => values.iter().map(|s| normalize_str(vr, s)).collect(),
        PrimitiveValue::Tags(values) => values
            .iter()
            .map(|t| Some(TagValue::Text(hex_key(*t))))
            .collect(),
        PrimitiveValue::U8(_) => return None,
        PrimitiveValue::I16(values) => ints(values.iter().map(|v| i64::from(*v))),
        PrimitiveValue::U16(values) => ints(values.iter().map(|v| i64::from(*v))),
        PrimitiveValue::I32(values) => ints(values.iter().map(|v| i64::from(*v))),
        PrimitiveValue::U32(values) => ints(values.iter().map(|v| i64::from(*v))),
        PrimitiveValue::I64(values) => ints(values.iter().copied()),
        PrimitiveValue::U64(values) => values
            .iter()
            .map(|v| i64::try_from(*v).ok().map(TagValue::Int))
            .collect(),
        PrimitiveValue::F32(values) => values
            .iter()
            .map(|v| TagValue::float(f64::from(*v)))
            .collect(),
        PrimitiveValue::F64(values) => values.iter().map(|v| TagValue::float(*v)).collect(),
        // dates and times
        other => other
            .to_multi_str()
            .iter()
            .map(|s| normalize_str(vr, s))
            .collect(),
    };

    match members.len() {
        0 => empty_value(vr),
        1 => members.into_iter().next().flatten(),
        _ => Some(TagValue::List(members.into_iter().flatten().collect())),
    }
}

fn ints<I: Iterator<Item = i64>>(values: I) -> Vec<Option<TagValue>> {
    values.map(|v| Some(TagValue::Int(v))).collect()
}

/// Converts one textual member, honoring numeric string VRs
fn normalize_str(vr: VR, raw: &str) -> Option<TagValue> {
    let text = trim_padding(vr, raw);
    match vr {
        VR::IS => text.parse::<i64>().ok().map(TagValue::Int),
        VR::DS => text.parse::<f64>().ok().and_then(TagValue::float),
        // person names keep their component separators
        _ => Some(TagValue::Text(text.to_string())),
    }
}

fn trim_padding(vr: VR, raw: &str) -> &str {
    let is_padding = |c: char| c == ' ' || c == '\0';
    match vr {
        VR::LT | VR::ST | VR::UT | VR::UC | VR::UR => raw.trim_end_matches(is_padding),
        _ => raw.trim_matches(is_padding),
    }
}

/// Value of an element without content
///
/// Numeric strings are omitted, as an empty `IS` or `DS` string fails to
/// parse.
fn empty_value(vr: VR) -> Option<TagValue> {
    if is_string_vr(vr) && !matches!(vr, VR::IS | VR::DS) {
        Some(TagValue::Text(String::new()))
    } else {
        None
    }
}

fn is_binary_vr(vr: VR) -> bool {
    matches!(
        vr,
        VR::OB | VR::OD | VR::OF | VR::OL | VR::OW | VR::UN | VR::SQ
    )
}

fn is_string_vr(vr: VR) -> bool {
    matches!(
        vr,
        VR::AE
            | VR::AS
            | VR::CS
            | VR::DA
            | VR::DS
            | VR::DT
            | VR::IS
            | VR::LO
            | VR::LT
            | VR::PN
            | VR::SH
            | VR::ST
            | VR::TM
            | VR::UC
            | VR::UI
            | VR::UR
            | VR::UT
    )
}
