//! Query normalization applied to addresses before the primary lookup.
//!
//! The normalized form is only ever used as a cache key or geocoder
//! query; the original text is what ends up in the output table.

/// Ordered substitution table applied to lowercased addresses.
///
/// The order is a quality-tuning artifact: earlier patterns may consume
/// input that later patterns would otherwise match, and the hit rate
/// against Nominatim was tuned with exactly this sequence. Do not sort
/// or dedupe.
const REPLACEMENTS: &[(&str, &str)] = &[
    // English street-type abbreviations, longest spellings first.
    ("blvd.", "boulevard"),
    ("blvd ", "boulevard "),
    ("ave.", "avenue"),
    ("ave ", "avenue "),
    ("st.", "street"),
    ("st ", "street "),
    ("rd.", "road"),
    ("rd ", "road "),
    ("dr.", "drive"),
    ("dr ", "drive "),
    ("ln.", "lane"),
    ("ln ", "lane "),
    ("ct.", "court"),
    ("ct ", "court "),
    // Spanish address-component words that tend to confuse Nominatim
    // when combined with an already-specific street name.
    ("calle ", ""),
    ("avenida ", ""),
    ("av. ", ""),
    ("col. ", ""),
    ("colonia ", ""),
    ("no. ", ""),
];

/// Normalize a raw address into the form sent to the primary provider.
///
/// Pure function: trim, lowercase, apply [`REPLACEMENTS`] left to right
/// in a single pass each, then collapse runs of whitespace.
#[must_use]
pub fn normalize_address(raw: &str) -> String {
    let mut text = raw.trim().to_lowercase();

    for (pattern, replacement) in REPLACEMENTS {
        if text.contains(pattern) {
            text = text.replace(pattern, replacement);
        }
    }

    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
