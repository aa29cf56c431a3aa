//! WhatsApp number normalization for Brazilian numbers.
//!
//! Stored numbers are `55` + two-digit area code + nine-digit mobile number.
//! Older eight-digit mobile numbers get the leading `9` that Anatel added.

use crate::core::shared::utils::digits_only;

const COUNTRY_CODE: &str = "55";

/// Returns the canonical 13-digit (or 12-digit landline) form, or `None`
/// when the input cannot be a Brazilian number.
pub fn normalize_whatsapp(raw: &str) -> Option<String> {
    let mut digits = digits_only(raw);

    // trunk prefix, e.g. "011 98765-4321"
    if digits.len() == 12 && digits.starts_with('0') && !digits.starts_with(COUNTRY_CODE) {
        digits.remove(0);
    }

    let national = match digits.len() {
        10 | 11 => digits,
        12 | 13 if digits.starts_with(COUNTRY_CODE) => digits[COUNTRY_CODE.len()..].to_string(),
        _ => return None,
    };

    let (area, local) = national.split_at(2);
    if area.starts_with('0') {
        return None;
    }

    let local = match local.len() {
        9 if local.starts_with('9') => local.to_string(),
        8 if is_mobile_prefix(local) => format!("9{local}"),
        8 => local.to_string(),
        _ => return None,
    };

    Some(format!("{COUNTRY_CODE}{area}{local}"))
}

fn is_mobile_prefix(local: &str) -> bool {
    matches!(local.as_bytes().first(), Some(b'6'..=b'9'))
}

/// `+55 (11) 98765-4321` style rendering for display.
pub fn format_whatsapp(normalized: &str) -> Option<String> {
    if !normalized.starts_with(COUNTRY_CODE) {
        return None;
    }
    let national = &normalized[COUNTRY_CODE.len()..];
    match national.len() {
        11 => Some(format!("+55 ({}) {}-{}", &national[..2], &national[2..7], &national[7..])),
        10 => Some(format!("+55 ({}) {}-{}", &national[..2], &national[2..6], &national[6..])),
        _ => None,
    }
}
