//! Address canonicalization used for cache keys and lookup queries.

/// Canonical cache key for `address`: trimmed, lowercased and suffixed with
/// the default country unless the country already appears in the text.
pub fn normalize_address(address: &str, default_country: &str) -> String {
    let normalized = address.trim().to_lowercase();
    let country = default_country.trim().to_lowercase();
    if country.is_empty() || normalized.contains(&country) {
        return normalized;
    }
    format!("{normalized}, {country}")
}

/// Address sent to the external resolver. Keeps the caller's casing and only
/// appends the country when it is missing.
pub fn qualify_address(address: &str, default_country: &str) -> String {
    let trimmed = address.trim();
    let country = default_country.trim();
    if country.is_empty() || trimmed.to_lowercase().contains(&country.to_lowercase()) {
        return trimmed.to_string();
    }
    format!("{trimmed}, {country}")
}
