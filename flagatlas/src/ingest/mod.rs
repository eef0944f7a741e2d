//! Ingestion commands: countries from a local mledoze dataset or from
//! Wikidata, extra flag catalogues, and the cleanup pass.
//!
//! Commands write row by row with no surrounding transaction, so a network
//! or parse error aborts the run but keeps the rows already written.

pub mod mapping;
pub mod queries;
pub mod sparql;

mod countries;
mod extras;

pub use countries::{populate_countries, populate_wikidata, CountriesReport, WikidataReport};
pub use extras::{populate_extra, ExtraReport, FlagsReport};

use crate::error::{FlagAtlasError, Result};
use crate::model::{FlagCategory, FlagFields};
use crate::store::Store;
use crate::text;
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

/// Which part of `populate_wikidata` to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    All,
    Countries,
    Extras,
}

impl Phase {
    /// 0 = both phases, 1 = countries, 2 = extra flags.
    pub fn from_number(n: u8) -> Result<Self> {
        match n {
            0 => Ok(Phase::All),
            1 => Ok(Phase::Countries),
            2 => Ok(Phase::Extras),
            other => Err(FlagAtlasError::Validation(format!(
                "phase must be 0, 1 or 2, got {other}"
            ))),
        }
    }

    fn countries(self) -> bool {
        matches!(self, Phase::All | Phase::Countries)
    }

    fn extras(self) -> bool {
        matches!(self, Phase::All | Phase::Extras)
    }
}

#[derive(Debug, Clone)]
pub struct WikidataOptions {
    pub clear: bool,
    pub phase: Phase,
    /// Pause after each country batch query.
    pub batch_pause: Duration,
    /// Pause between the phase 2 query groups.
    pub group_pause: Duration,
}

impl Default for WikidataOptions {
    fn default() -> Self {
        WikidataOptions {
            clear: false,
            phase: Phase::All,
            batch_pause: Duration::from_secs(2),
            group_pause: Duration::from_secs(3),
        }
    }
}

/// Catalogue selection for `populate_extra`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtraCategory {
    #[default]
    All,
    Historical,
    International,
    Territory,
}

impl ExtraCategory {
    pub fn includes(self, category: FlagCategory) -> bool {
        match self {
            ExtraCategory::All => true,
            ExtraCategory::Historical => category == FlagCategory::Historical,
            ExtraCategory::International => category == FlagCategory::International,
            ExtraCategory::Territory => category == FlagCategory::Territory,
        }
    }
}

impl FromStr for ExtraCategory {
    type Err = FlagAtlasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ExtraCategory::All),
            "historical" => Ok(ExtraCategory::Historical),
            "international" => Ok(ExtraCategory::International),
            "territory" => Ok(ExtraCategory::Territory),
            other => Err(FlagAtlasError::Validation(format!(
                "category must be all, historical, international or territory, got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtraOptions {
    pub category: ExtraCategory,
    /// Pause after each query.
    pub pause: Duration,
}

impl Default for ExtraOptions {
    fn default() -> Self {
        ExtraOptions {
            category: ExtraCategory::All,
            pause: Duration::from_secs(3),
        }
    }
}

pub(crate) fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

/// A flag as it comes off a query row, before any filtering.
#[derive(Debug, Clone, Default)]
pub struct FlagCandidate {
    pub name: String,
    pub flag_url: String,
    pub category: Option<FlagCategory>,
    /// Empty when the row has no identifier.
    pub wikidata_id: String,
    pub country_id: Option<i64>,
    pub description: String,
}

/// Writes flag candidates for one ingestion run, skipping repeats.
pub struct FlagSink<'a> {
    store: &'a Store,
    seen: HashSet<String>,
    country_names: Option<HashSet<String>>,
}

impl<'a> FlagSink<'a> {
    pub fn new(store: &'a Store) -> Self {
        FlagSink {
            store,
            seen: HashSet::new(),
            country_names: None,
        }
    }

    /// Treat these keys as already handled.
    pub fn with_seen(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.seen.extend(keys);
        self
    }

    /// Skip candidates whose name is a stored country's name (any case).
    pub fn skip_country_names(mut self) -> Result<Self> {
        self.country_names = Some(self.store.country_names()?);
        Ok(self)
    }

    /// Save one candidate. Returns true when a new row was created.
    pub fn save_flag(&mut self, candidate: FlagCandidate) -> Result<bool> {
        let name = candidate.name.trim();
        if name.is_empty() || candidate.flag_url.is_empty() || text::is_qid_label(name) {
            return Ok(false);
        }
        let key = if candidate.wikidata_id.is_empty() {
            name.to_string()
        } else {
            candidate.wikidata_id.clone()
        };
        if !self.seen.insert(key) {
            return Ok(false);
        }
        if let Some(names) = &self.country_names {
            if names.contains(&name.to_lowercase()) {
                return Ok(false);
            }
        }

        let category = candidate
            .category
            .unwrap_or_else(|| mapping::classify_name(name));
        let fields = FlagFields {
            name: text::truncate_chars(name, mapping::NAME_MAX_CHARS),
            category,
            description: text::truncate_chars(&candidate.description, mapping::DESCRIPTION_MAX_CHARS),
            flag_image: mapping::flag_image_url(&candidate.flag_url),
            wikidata_id: Some(candidate.wikidata_id).filter(|q| !q.is_empty()),
            country_id: candidate.country_id,
        };

        if fields.wikidata_id.is_some() {
            let (_, outcome) = self.store.upsert_flag_by_wikidata_id(&fields)?;
            Ok(outcome.created())
        } else {
            let (_, created) = self.store.get_or_create_flag(&fields)?;
            Ok(created)
        }
    }
}

/// Name fragments that mark sports teams and other non-flag noise.
pub const NOISE_KEYWORDS: [&str; 25] = [
    "football team",
    "basketball team",
    "handball team",
    "volleyball team",
    "hockey team",
    "rugby team",
    "cricket team",
    "baseball team",
    "olympic",
    "paralympic",
    "under-17",
    "under-18",
    "under-19",
    "under-20",
    "under-21",
    "under-23",
    "women's national",
    "men's national",
    "national team",
    "at the 20",
    "at the 19",
    "grand prix",
    "marine corps",
    "coast guard",
    "national guard",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub duplicate_ids: usize,
    pub country_flag_copies: usize,
    pub noise: usize,
    pub shared_images: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.duplicate_ids + self.country_flag_copies + self.noise + self.shared_images
    }
}

/// Dedup and noise removal over the flag collection.
pub fn cleanup(store: &Store) -> Result<CleanupReport> {
    let mut report = CleanupReport {
        duplicate_ids: store.delete_duplicate_wikidata_ids()?,
        country_flag_copies: store.delete_flags_matching_country_images()?,
        ..Default::default()
    };
    if report.duplicate_ids > 0 {
        log::info!("Removed {} rows sharing a wikidata id", report.duplicate_ids);
    }
    if report.country_flag_copies > 0 {
        log::info!(
            "Removed {} rows duplicating country flags",
            report.country_flag_copies
        );
    }

    for keyword in NOISE_KEYWORDS {
        report.noise += store.delete_flags_named_like(keyword)?;
    }
    if report.noise > 0 {
        log::info!("Removed {} sports/noise rows", report.noise);
    }

    report.shared_images = store.delete_flags_sharing_image()?;
    log::info!("Cleanup removed {} rows in total", report.total());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CountryFields;
    use pretty_assertions::assert_eq;

    fn candidate(name: &str, qid: &str) -> FlagCandidate {
        FlagCandidate {
            name: name.into(),
            flag_url: format!("http://commons.wikimedia.org/wiki/Special:FilePath/{name}.svg"),
            category: Some(FlagCategory::Historical),
            wikidata_id: qid.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_save_flag_skips_invalid_and_seen() {
        let store = Store::open_in_memory().unwrap();
        let mut sink = FlagSink::new(&store);

        assert!(sink.save_flag(candidate("Prussia", "Q27306")).unwrap());
        assert!(!sink.save_flag(candidate("Prussia again", "Q27306")).unwrap());
        assert!(!sink.save_flag(candidate("Q12345", "Q12345")).unwrap());
        assert!(!sink.save_flag(candidate("", "Q1")).unwrap());
        let mut no_image = candidate("Saxony", "Q1202");
        no_image.flag_url.clear();
        assert!(!sink.save_flag(no_image).unwrap());

        assert_eq!(store.stats().unwrap().flags, 1);
        let flag = store.get_flag(1).unwrap().unwrap();
        assert!(flag.flag_image.ends_with("Prussia.svg?width=320"));
    }

    #[test]
    fn test_save_flag_without_id_uses_name_and_category() {
        let store = Store::open_in_memory().unwrap();
        let mut sink = FlagSink::new(&store);
        let mut c = candidate("Bavaria", "");
        c.category = None;
        assert!(sink.save_flag(c.clone()).unwrap());

        // A second run sees the same row again.
        let mut sink = FlagSink::new(&store);
        assert!(!sink.save_flag(c).unwrap());
        let flag = store.get_flag(1).unwrap().unwrap();
        assert_eq!(flag.category, FlagCategory::Region);
        assert_eq!(flag.wikidata_id, None);
    }

    #[test]
    fn test_save_flag_seeded_and_country_names() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_country(&CountryFields::new("Germany", "DE", "DEU"))
            .unwrap();

        let mut sink = FlagSink::new(&store)
            .with_seen(["Q27306".to_string()])
            .skip_country_names()
            .unwrap();
        assert!(!sink.save_flag(candidate("Prussia", "Q27306")).unwrap());
        assert!(!sink.save_flag(candidate("GERMANY", "Q183")).unwrap());
        assert_eq!(store.stats().unwrap().flags, 0);
    }

    #[test]
    fn test_save_flag_truncates_long_names() {
        let store = Store::open_in_memory().unwrap();
        let mut sink = FlagSink::new(&store);
        let long = "Ž".repeat(250);
        let mut c = candidate(&long, "Q5");
        c.description = "d".repeat(600);
        sink.save_flag(c).unwrap();

        let flag = store.get_flag(1).unwrap().unwrap();
        assert_eq!(flag.name.chars().count(), 200);
        assert_eq!(flag.description.len(), 500);
    }

    #[test]
    fn test_cleanup_steps() {
        let store = Store::open_in_memory().unwrap();
        let country = CountryFields {
            flag_png: "https://flagcdn.com/w320/de.png".into(),
            ..CountryFields::new("Germany", "DE", "DEU")
        };
        store.upsert_country(&country).unwrap();

        let insert = |name: &str, image: &str, qid: Option<&str>| {
            store
                .insert_flag(&FlagFields {
                    wikidata_id: qid.map(String::from),
                    ..FlagFields::new(name, FlagCategory::Historical, image)
                })
                .unwrap()
        };
        let prussia = insert("Prussia", "https://img/prussia.png", Some("Q27306"));
        insert("Prussia copy", "https://img/prussia-2.png", Some("Q27306"));
        insert("German flag copy", "https://flagcdn.com/w320/de.png", None);
        insert("Germany national football team", "https://img/team.png", None);
        insert("Olympic flag", "https://img/olympic.png", None);
        let bavaria = insert("Bavaria", "https://img/bavaria.png", None);
        insert("Free State of Bavaria", "https://img/bavaria.png", None);

        let report = cleanup(&store).unwrap();
        assert_eq!(
            report,
            CleanupReport {
                duplicate_ids: 1,
                country_flag_copies: 1,
                noise: 2,
                shared_images: 1,
            }
        );
        assert_eq!(report.total(), 5);

        let left: Vec<i64> = store
            .search_flags(&Default::default(), 100, 0)
            .unwrap()
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(left, vec![bavaria.id, prussia.id]);

        let ids = store.existing_wikidata_ids().unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_phase_and_category_parsing() {
        assert_eq!(Phase::from_number(0).unwrap(), Phase::All);
        assert_eq!(Phase::from_number(2).unwrap(), Phase::Extras);
        assert!(Phase::from_number(3).is_err());

        assert_eq!("Territory".parse::<ExtraCategory>().unwrap(), ExtraCategory::Territory);
        assert!("city".parse::<ExtraCategory>().is_err());
        assert!(ExtraCategory::Historical.includes(FlagCategory::Historical));
        assert!(!ExtraCategory::Historical.includes(FlagCategory::Territory));
        assert!(ExtraCategory::All.includes(FlagCategory::Territory));
    }
}
