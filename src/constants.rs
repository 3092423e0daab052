/// Column names the cleaning step depends on
pub const PRICE: &str = "price";
pub const LAST_REVIEW: &str = "last_review";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";

pub const REQUIRED_COLUMNS: [&str; 4] = [PRICE, LAST_REVIEW, LATITUDE, LONGITUDE];

// Bounding box around New York City, inclusive on both ends
pub const MIN_LATITUDE: f64 = 40.5;
pub const MAX_LATITUDE: f64 = 41.2;
pub const MIN_LONGITUDE: f64 = -74.25;
pub const MAX_LONGITUDE: f64 = -73.50;

/// Whole-field tokens read as a missing value
pub const NA_TOKENS: [&str; 19] = [
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "<NA>", "#N/A",
    "#NA", "#N/A N/A", "-1.#IND", "-1.#QNAN", "1.#IND", "1.#QNAN",
];

// Run tracking defaults
pub const DEFAULT_PROJECT: &str = "nyc_airbnb";
pub const DEFAULT_GROUP: &str = "basic_cleaning";
pub const DEFAULT_JOB_TYPE: &str = "basic_cleaning";

pub const OUTPUT_FILE_NAME: &str = "clean_sample.csv";
pub const DEFAULT_CONFIG_FILE: &str = "basic_cleaning.toml";
pub const DEFAULT_STORE_ROOT: &str = "artifacts-store";

/// Bearer key for the HTTP artifact store
pub const STORE_KEY_ENV: &str = "ARTIFACT_STORE_KEY";

/// Returns true when a raw field should be read as a missing value
pub fn is_na_token(field: &str) -> bool {
    NA_TOKENS.contains(&field)
}
