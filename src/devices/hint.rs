//! Device hint resolution
//!
//! Gateways identify devices loosely: `"MoistureSensor"`, `"soil"`,
//! `"ESP32-1"`, `"esp1"` or a bare `"1"`. Name fragments are tried first as
//! case-insensitive substrings; failing that, the trailing digit run of the
//! hint is read as the slot index.

use super::registry::DeviceId;

const NAME_FRAGMENTS: [(&str, DeviceId); 4] = [
    ("soil", DeviceId::A),
    ("moisture", DeviceId::A),
    ("light", DeviceId::B),
    ("temp", DeviceId::C),
];

/// Resolve a device hint to a slot, or `None` when nothing matches
pub fn resolve_hint(hint: &str) -> Option<DeviceId> {
    let lowered = hint.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    if let Some((_, id)) = NAME_FRAGMENTS
        .iter()
        .find(|(fragment, _)| lowered.contains(fragment))
    {
        return Some(*id);
    }

    let digits_start = lowered
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;

    match &lowered[digits_start..] {
        "1" => Some(DeviceId::A),
        "2" => Some(DeviceId::B),
        "3" => Some(DeviceId::C),
        _ => None,
    }
}
