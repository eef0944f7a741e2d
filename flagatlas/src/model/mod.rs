use crate::error::{FlagAtlasError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A continent grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

/// Writable region fields. A blank slug is derived from the name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionFields {
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

impl RegionFields {
    pub fn normalized(mut self) -> Result<Self> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(FlagAtlasError::Validation("Region name is required".into()));
        }
        if self.slug.trim().is_empty() {
            self.slug = crate::text::slugify(&self.name);
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionWithCount {
    #[serde(flatten)]
    pub region: Region,
    pub country_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

/// A country or territory that holds an ISO 3166-1 code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Country {
    pub id: i64,
    #[serde(flatten)]
    pub fields: CountryFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::ops::Deref for Country {
    type Target = CountryFields;

    fn deref(&self) -> &CountryFields {
        &self.fields
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.flag_emoji, self.name_common)
    }
}

/// Everything about a country except its row id and timestamps.
/// Used for upserts from ingestion and for admin create/update bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryFields {
    pub name_common: String,
    #[serde(default)]
    pub name_official: String,
    pub cca2: String,
    pub cca3: String,
    #[serde(default)]
    pub capital: String,
    #[serde(default)]
    pub region_id: Option<i64>,
    #[serde(default)]
    pub subregion: String,
    #[serde(default)]
    pub population: i64,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub flag_svg: String,
    #[serde(default)]
    pub flag_png: String,
    #[serde(default)]
    pub flag_emoji: String,
    #[serde(default)]
    pub coat_of_arms_svg: String,
    #[serde(default)]
    pub coat_of_arms_png: String,
    #[serde(default)]
    pub currencies: BTreeMap<String, Currency>,
    #[serde(default)]
    pub languages: BTreeMap<String, String>,
    #[serde(default)]
    pub timezones: Vec<String>,
    #[serde(default)]
    pub continents: Vec<String>,
    #[serde(default)]
    pub borders: Vec<String>,
    #[serde(default = "default_true")]
    pub independent: bool,
    #[serde(default)]
    pub un_member: bool,
}

fn default_true() -> bool {
    true
}

impl CountryFields {
    /// Minimal record; callers fill in the rest with struct update syntax.
    pub fn new(name: &str, cca2: &str, cca3: &str) -> Self {
        CountryFields {
            name_common: name.to_string(),
            name_official: name.to_string(),
            cca2: cca2.to_string(),
            cca3: cca3.to_string(),
            capital: String::new(),
            region_id: None,
            subregion: String::new(),
            population: 0,
            area: None,
            latitude: None,
            longitude: None,
            flag_svg: String::new(),
            flag_png: String::new(),
            flag_emoji: String::new(),
            coat_of_arms_svg: String::new(),
            coat_of_arms_png: String::new(),
            currencies: BTreeMap::new(),
            languages: BTreeMap::new(),
            timezones: Vec::new(),
            continents: Vec::new(),
            borders: Vec::new(),
            independent: true,
            un_member: false,
        }
    }

    /// Trim and upper-case the codes, then check the code invariants.
    pub fn normalized(mut self) -> Result<Self> {
        self.name_common = self.name_common.trim().to_string();
        self.cca2 = self.cca2.trim().to_ascii_uppercase();
        self.cca3 = self.cca3.trim().to_ascii_uppercase();
        self.borders = self
            .borders
            .iter()
            .map(|b| b.trim().to_ascii_uppercase())
            .filter(|b| !b.is_empty())
            .collect();

        if self.name_common.is_empty() {
            return Err(FlagAtlasError::Validation(
                "Country name_common is required".into(),
            ));
        }
        if !is_code(&self.cca2, 2) {
            return Err(FlagAtlasError::Validation(format!(
                "cca2 must be 2 letters, got '{}'",
                self.cca2
            )));
        }
        if !is_code(&self.cca3, 3) {
            return Err(FlagAtlasError::Validation(format!(
                "cca3 must be 3 letters, got '{}'",
                self.cca3
            )));
        }
        if self.name_official.trim().is_empty() {
            self.name_official = self.name_common.clone();
        }
        Ok(self)
    }

    pub fn currencies_display(&self) -> String {
        if self.currencies.is_empty() {
            return "N/A".into();
        }
        self.currencies
            .iter()
            .map(|(code, c)| format!("{} ({code})", c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn languages_display(&self) -> String {
        if self.languages.is_empty() {
            return "N/A".into();
        }
        self.languages
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn is_code(code: &str, len: usize) -> bool {
    code.len() == len && code.chars().all(|c| c.is_ascii_alphabetic())
}

/// Category of a non-country flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagCategory {
    Territory,
    Historical,
    State,
    City,
    International,
    Region,
    Other,
}

impl FlagCategory {
    pub const ALL: [FlagCategory; 7] = [
        FlagCategory::Territory,
        FlagCategory::Historical,
        FlagCategory::State,
        FlagCategory::City,
        FlagCategory::International,
        FlagCategory::Region,
        FlagCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlagCategory::Territory => "territory",
            FlagCategory::Historical => "historical",
            FlagCategory::State => "state",
            FlagCategory::City => "city",
            FlagCategory::International => "international",
            FlagCategory::Region => "region",
            FlagCategory::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FlagCategory::Territory => "Territory",
            FlagCategory::Historical => "Historical",
            FlagCategory::State => "State/Province",
            FlagCategory::City => "City / Municipality",
            FlagCategory::International => "International Organization",
            FlagCategory::Region => "Region / Subdivision",
            FlagCategory::Other => "Other",
        }
    }
}

impl fmt::Display for FlagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlagCategory {
    type Err = FlagAtlasError;

    fn from_str(s: &str) -> Result<Self> {
        FlagCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FlagAtlasError::Validation(format!("Unknown flag category '{s}'")))
    }
}

/// A row of the flag collection: every flag that is not a country's own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flag {
    pub id: i64,
    #[serde(flatten)]
    pub fields: FlagFields,
    pub created_at: DateTime<Utc>,
}

impl std::ops::Deref for Flag {
    type Target = FlagFields;

    fn deref(&self) -> &FlagFields {
        &self.fields
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.category.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagFields {
    pub name: String,
    pub category: FlagCategory,
    #[serde(default)]
    pub description: String,
    pub flag_image: String,
    /// Wikidata QID, the dedup key.
    #[serde(default)]
    pub wikidata_id: Option<String>,
    #[serde(default)]
    pub country_id: Option<i64>,
}

impl FlagFields {
    pub fn new(name: &str, category: FlagCategory, flag_image: &str) -> Self {
        FlagFields {
            name: name.to_string(),
            category,
            description: String::new(),
            flag_image: flag_image.to_string(),
            wikidata_id: None,
            country_id: None,
        }
    }

    pub fn normalized(mut self) -> Result<Self> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(FlagAtlasError::Validation("Flag name is required".into()));
        }
        if self.flag_image.trim().is_empty() {
            return Err(FlagAtlasError::Validation("flag_image is required".into()));
        }
        self.wikidata_id = self
            .wikidata_id
            .take()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        Ok(self)
    }
}

/// Where a gallery card comes from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlagCardSource {
    Country { cca3: String },
    Collection { id: i64, category: FlagCategory },
}

/// One tile of the flag gallery, either a country flag or a collection flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagCard {
    pub name: String,
    pub image: String,
    #[serde(flatten)]
    pub source: FlagCardSource,
}

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

impl Upsert {
    pub fn created(&self) -> bool {
        matches!(self, Upsert::Created)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DbStats {
    pub regions: usize,
    pub countries: usize,
    pub flags: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_country_fields_normalized_uppercases_codes() {
        let mut fields = CountryFields::new("Slovakia", "sk", " svk ");
        fields.borders = vec!["cze".into(), "".into(), "AUT".into()];
        let fields = fields.normalized().unwrap();
        assert_eq!(fields.cca2, "SK");
        assert_eq!(fields.cca3, "SVK");
        assert_eq!(fields.borders, vec!["CZE".to_string(), "AUT".to_string()]);
    }

    #[test]
    fn test_country_fields_rejects_bad_cca3() {
        assert!(CountryFields::new("Nowhere", "NW", "NOWH").normalized().is_err());
        assert!(CountryFields::new("Nowhere", "NW", "N1W").normalized().is_err());
        assert!(CountryFields::new("", "NW", "NOW").normalized().is_err());
    }

    #[test]
    fn test_official_name_defaults_to_common() {
        let mut fields = CountryFields::new("Chad", "TD", "TCD");
        fields.name_official = "  ".into();
        assert_eq!(fields.normalized().unwrap().name_official, "Chad");
    }

    #[test]
    fn test_displays() {
        let mut fields = CountryFields::new("Switzerland", "CH", "CHE");
        assert_eq!(fields.currencies_display(), "N/A");
        assert_eq!(fields.languages_display(), "N/A");

        fields.currencies.insert(
            "CHF".into(),
            Currency {
                name: "Swiss franc".into(),
                symbol: Some("Fr.".into()),
            },
        );
        fields.languages.insert("fra".into(), "French".into());
        fields.languages.insert("gsw".into(), "Swiss German".into());
        assert_eq!(fields.currencies_display(), "Swiss franc (CHF)");
        assert_eq!(fields.languages_display(), "French, Swiss German");
    }

    #[test]
    fn test_flag_category_round_trip_and_labels() {
        for category in FlagCategory::ALL {
            assert_eq!(category.as_str().parse::<FlagCategory>().unwrap(), category);
        }
        assert_eq!("HISTORICAL".parse::<FlagCategory>().unwrap(), FlagCategory::Historical);
        assert!("country".parse::<FlagCategory>().is_err());
        assert_eq!(FlagCategory::State.label(), "State/Province");
    }

    #[test]
    fn test_flag_fields_blank_wikidata_id_becomes_none() {
        let mut fields = FlagFields::new("Bavaria", FlagCategory::State, "https://x/bavaria.png");
        fields.wikidata_id = Some("  ".into());
        assert_eq!(fields.normalized().unwrap().wikidata_id, None);
    }

    #[test]
    fn test_country_fields_deserialize_defaults() {
        let fields: CountryFields = serde_json::from_value(serde_json::json!({
            "name_common": "Monaco",
            "cca2": "MC",
            "cca3": "MCO"
        }))
        .unwrap();
        assert!(fields.independent);
        assert!(!fields.un_member);
        assert_eq!(fields.population, 0);
    }
}
