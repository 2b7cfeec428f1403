/// Canonical column names shared by the normalizer, the history file and the model.
/// Every persisted row uses exactly these lower-case names.
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const AREA: &str = "area";
pub const BEDROOMS: &str = "bedrooms";
pub const BATHROOMS: &str = "bathrooms";
pub const PARKING_SPACES: &str = "parking_spaces";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const CREATED_DATE: &str = "created_date";
pub const NEIGHBORHOOD: &str = "neighborhood";
pub const PRICE: &str = "price";

/// Free-text address column, only present in raw uploads
pub const ADDRESS: &str = "address";

/// Placeholder used when an address cannot be decomposed
pub const NOT_INFORMED: &str = "Not Informed";

/// Fill value for missing categorical features
pub const MISSING_CATEGORY: &str = "missing";

pub const NUMERIC_FEATURES: [&str; 7] = [
    AREA,
    BEDROOMS,
    BATHROOMS,
    PARKING_SPACES,
    LATITUDE,
    LONGITUDE,
    CREATED_DATE,
];

pub const CATEGORICAL_FEATURES: [&str; 1] = [NEIGHBORHOOD];

pub const TARGET: &str = PRICE;

/// Canonical schema in persisted column order
pub const CANONICAL_SCHEMA: [&str; 9] = [
    AREA,
    BEDROOMS,
    BATHROOMS,
    PARKING_SPACES,
    LATITUDE,
    LONGITUDE,
    CREATED_DATE,
    NEIGHBORHOOD,
    PRICE,
];

// Source spellings seen in listing exports, keyed by lower-cased name.
static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for name in CANONICAL_SCHEMA {
        m.insert(name, name);
    }
    m.insert("bedroom", BEDROOMS);
    m.insert("rooms", BEDROOMS);
    m.insert("bathroom", BATHROOMS);
    m.insert("parking_space", PARKING_SPACES);
    m.insert("lat", LATITUDE);
    m.insert("lng", LONGITUDE);
    m.insert("lon", LONGITUDE);
    m.insert("bairro", NEIGHBORHOOD);
    m.insert(ADDRESS, ADDRESS);
    m.insert("adress", ADDRESS);
    m
});

/// Map a source column name onto its canonical name, if it is recognized.
/// Matching ignores case and surrounding whitespace.
pub fn canonical_name(source: &str) -> Option<&'static str> {
    let key = source.trim().to_lowercase();
    ALIASES.get(key.as_str()).copied()
}

/// Whether a canonical column belongs to the persisted schema
pub fn is_schema_column(name: &str) -> bool {
    CANONICAL_SCHEMA.contains(&name)
}

/// Position of a column in the canonical schema, used for ordering
pub fn schema_position(name: &str) -> usize {
    CANONICAL_SCHEMA
        .iter()
        .position(|c| *c == name)
        .unwrap_or(CANONICAL_SCHEMA.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name_ignores_case_and_aliases() {
        assert_eq!(canonical_name("Parking_Spaces"), Some(PARKING_SPACES));
        assert_eq!(canonical_name("PRICE"), Some(PRICE));
        assert_eq!(canonical_name("rooms"), Some(BEDROOMS));
        assert_eq!(canonical_name("Adress"), Some(ADDRESS));
        assert_eq!(canonical_name("Created_Date"), Some(CREATED_DATE));
        assert_eq!(canonical_name("extract_date"), None);
    }

    #[test]
    fn test_address_is_not_part_of_schema() {
        assert!(!is_schema_column(ADDRESS));
        assert!(is_schema_column(NEIGHBORHOOD));
    }
}
