//! Text normalization for task assets
//!
//! Scripts and SQL files in older task trees are often Shift_JIS. Assets are
//! decoded with the first encoding that accepts the bytes without
//! replacement characters.

use encoding_rs::Encoding;
use tracing::warn;

/// Encodings tried when none are configured
pub fn default_encodings() -> Vec<&'static Encoding> {
    vec![encoding_rs::UTF_8, encoding_rs::SHIFT_JIS]
}

/// Resolve WHATWG labels, dropping (and logging) unknown ones
pub fn resolve_encodings<S: AsRef<str>>(labels: &[S]) -> Vec<&'static Encoding> {
    let resolved: Vec<&'static Encoding> = labels
        .iter()
        .filter_map(|label| {
            let label = label.as_ref();
            let encoding = Encoding::for_label(label.trim().as_bytes());
            if encoding.is_none() {
                warn!("Ignoring unknown asset encoding label: {}", label);
            }
            encoding
        })
        .collect();

    if resolved.is_empty() {
        default_encodings()
    } else {
        resolved
    }
}

/// Decode `bytes` with the first encoding that accepts them.
///
/// Returns an empty string when every encoding rejects the input.
pub fn decode_first(bytes: &[u8], encodings: &[&'static Encoding]) -> String {
    encodings
        .iter()
        .find_map(|encoding| encoding.decode_without_bom_handling_and_without_replacement(bytes))
        .map(|text| text.into_owned())
        .unwrap_or_default()
}
