use super::mapping::{self, REGIONS};
use super::queries;
use super::sparql::SparqlSource;
use super::{pause, FlagCandidate, FlagSink, WikidataOptions};
use crate::error::{FlagAtlasError, Result};
use crate::model::{CountryFields, Currency, DbStats, FlagCategory, Upsert};
use crate::store::Store;
use crate::text;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountriesReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub total: usize,
}

impl CountriesReport {
    fn record(&mut self, outcome: Upsert) {
        match outcome {
            Upsert::Created => self.created += 1,
            Upsert::Updated => self.updated += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WikidataReport {
    pub countries: Option<CountriesReport>,
    pub extras: Option<super::FlagsReport>,
    pub totals: DbStats,
}

/// Create the six regions if missing. Keyed by region name.
fn ensure_regions(store: &Store) -> Result<HashMap<&'static str, i64>> {
    let mut ids = HashMap::new();
    for (name, description) in REGIONS {
        ids.insert(name, store.ensure_region(name, description)?.id);
    }
    log::info!("Regions ready ({})", ids.len());
    Ok(ids)
}

/// Upsert and count, skipping records the store refuses.
fn save_country(store: &Store, fields: &CountryFields, report: &mut CountriesReport) -> Result<()> {
    match store.upsert_country(fields) {
        Ok((_, outcome)) => report.record(outcome),
        Err(e @ (FlagAtlasError::Validation(_) | FlagAtlasError::Conflict(_))) => {
            log::warn!("[{}] {}: {e}", fields.cca2, fields.name_common);
            report.skipped += 1;
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

// ── mledoze/countries dataset ────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct MledozeName {
    #[serde(default)]
    common: String,
    #[serde(default)]
    official: String,
}

#[derive(Debug, Deserialize)]
struct MledozeEntry {
    #[serde(default)]
    name: MledozeName,
    #[serde(default)]
    cca2: String,
    #[serde(default)]
    cca3: String,
    #[serde(default)]
    capital: Vec<String>,
    #[serde(default)]
    region: String,
    #[serde(default)]
    subregion: Option<String>,
    #[serde(default)]
    latlng: Vec<f64>,
    #[serde(default)]
    area: Option<f64>,
    #[serde(default)]
    flag: String,
    #[serde(default)]
    currencies: Option<BTreeMap<String, Currency>>,
    #[serde(default)]
    languages: Option<BTreeMap<String, String>>,
    #[serde(default)]
    borders: Option<Vec<String>>,
    /// Missing means independent, an explicit null means not.
    #[serde(default = "independent_default")]
    independent: Option<bool>,
    #[serde(rename = "unMember", default)]
    un_member: bool,
}

fn independent_default() -> Option<bool> {
    Some(true)
}

impl MledozeEntry {
    fn into_fields(self, regions: &HashMap<&'static str, i64>) -> Option<CountryFields> {
        if self.cca2.is_empty() || self.cca3.is_empty() {
            return None;
        }
        let name_common = if self.name.common.is_empty() {
            "Unknown".to_string()
        } else {
            self.name.common
        };
        let name_official = if self.name.official.is_empty() {
            name_common.clone()
        } else {
            self.name.official
        };

        Some(CountryFields {
            name_official,
            capital: self.capital.into_iter().next().unwrap_or_default(),
            region_id: regions.get(self.region.as_str()).copied(),
            subregion: self.subregion.unwrap_or_default(),
            population: 0,
            area: self.area,
            latitude: self.latlng.first().copied(),
            longitude: self.latlng.get(1).copied(),
            flag_svg: text::flagcdn_svg(&self.cca2),
            flag_png: text::flagcdn_png(&self.cca2),
            flag_emoji: self.flag,
            currencies: self.currencies.unwrap_or_default(),
            languages: self.languages.unwrap_or_default(),
            continents: if self.region.is_empty() {
                Vec::new()
            } else {
                vec![self.region]
            },
            borders: self.borders.unwrap_or_default(),
            independent: self.independent.unwrap_or(false),
            un_member: self.un_member,
            ..CountryFields::new(&name_common, &self.cca2, &self.cca3)
        })
    }
}

/// Load countries from a mledoze/countries JSON file.
pub fn populate_countries(store: &Store, data_file: &Path, clear: bool) -> Result<CountriesReport> {
    if !data_file.exists() {
        return Err(FlagAtlasError::DataFile(format!(
            "country data file not found at {} (download countries.json from \
             https://github.com/mledoze/countries)",
            data_file.display()
        )));
    }
    let raw = std::fs::read_to_string(data_file)?;
    let entries: Vec<serde_json::Value> = serde_json::from_str(&raw).map_err(|e| {
        FlagAtlasError::DataFile(format!("{}: expected a JSON array ({e})", data_file.display()))
    })?;
    log::info!("Loaded {} countries from {}", entries.len(), data_file.display());

    if clear {
        log::info!("Clearing existing data");
        store.clear_all()?;
    }
    let regions = ensure_regions(store)?;

    let mut report = CountriesReport::default();
    let count = entries.len();
    for (i, value) in entries.into_iter().enumerate() {
        let entry: MledozeEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping malformed entry #{}: {e}", i + 1);
                report.skipped += 1;
                continue;
            }
        };
        match entry.into_fields(&regions) {
            Some(fields) => save_country(store, &fields, &mut report)?,
            None => report.skipped += 1,
        }
        if (i + 1) % 50 == 0 {
            log::info!("  … {}/{count}", i + 1);
        }
    }

    report.total = store.stats()?.countries;
    log::info!(
        "Done. Created: {} | Updated: {} | Skipped: {} | Total in DB: {}",
        report.created,
        report.updated,
        report.skipped,
        report.total
    );
    Ok(report)
}

// ── Wikidata ─────────────────────────────────────────────────────────

/// Countries and extra flags from Wikidata.
pub fn populate_wikidata(
    store: &Store,
    source: &dyn SparqlSource,
    opts: &WikidataOptions,
) -> Result<WikidataReport> {
    if opts.clear {
        log::info!("Clearing all data");
        store.clear_all()?;
    }
    let regions = ensure_regions(store)?;

    let mut report = WikidataReport::default();
    if opts.phase.countries() {
        report.countries = Some(wikidata_countries(store, source, &regions)?);
    }
    if opts.phase.extras() {
        report.extras = Some(wikidata_extras(store, source, opts)?);
    }

    report.totals = store.stats()?;
    log::info!(
        "Grand total flags: {} ({} countries, {} extra flags)",
        report.totals.countries + report.totals.flags,
        report.totals.countries,
        report.totals.flags
    );
    Ok(report)
}

fn wikidata_countries(
    store: &Store,
    source: &dyn SparqlSource,
    regions: &HashMap<&'static str, i64>,
) -> Result<CountriesReport> {
    log::info!("Phase 1: countries");
    let rows = source.select(queries::COUNTRIES)?;
    log::info!("  Got {} rows", rows.len());

    let mut report = CountriesReport::default();
    for (i, row) in rows.iter().enumerate() {
        let Some(mapped) = mapping::country_from_binding(row) else {
            report.skipped += 1;
            continue;
        };
        let mut fields = mapped.fields;
        fields.region_id = mapped.region.and_then(|r| regions.get(r).copied());
        // Keep dataset-only columns from an earlier mledoze import.
        if let Some(existing) = store.country_by_cca3(&fields.cca3)? {
            fields = merge_wikidata(existing.fields, fields);
        }
        save_country(store, &fields, &mut report)?;

        if (i + 1) % 50 == 0 {
            log::info!("  … {}/{}", i + 1, rows.len());
        }
    }

    report.total = store.stats()?.countries;
    log::info!(
        "  Phase 1 done: created {}, updated {}, skipped {}, total in DB: {}",
        report.created,
        report.updated,
        report.skipped,
        report.total
    );
    Ok(report)
}

/// Wikidata supplies names, codes, capital, population, flags and
/// region. A missing area keeps the stored one.
fn merge_wikidata(stored: CountryFields, fresh: CountryFields) -> CountryFields {
    CountryFields {
        name_common: fresh.name_common,
        name_official: fresh.name_official,
        cca2: fresh.cca2,
        cca3: fresh.cca3,
        capital: fresh.capital,
        region_id: fresh.region_id,
        population: fresh.population,
        area: fresh.area.or(stored.area),
        flag_svg: fresh.flag_svg,
        flag_png: fresh.flag_png,
        flag_emoji: fresh.flag_emoji,
        ..stored
    }
}

/// Shape shared by the phase 2 query groups.
struct FlagQuery {
    label: String,
    sparql: String,
    /// `None` classifies each row by its label.
    category: Option<FlagCategory>,
    /// Rows carry `?countryISO` linking them to a stored country.
    by_country: bool,
}

fn wikidata_extras(
    store: &Store,
    source: &dyn SparqlSource,
    opts: &WikidataOptions,
) -> Result<super::FlagsReport> {
    log::info!("Phase 2: extra flags");
    let country_ids = store.country_codes_by_cca2()?;
    let mut sink = FlagSink::new(store).skip_country_names()?;
    let mut report = super::FlagsReport::default();

    let mut run = |query: FlagQuery, report: &mut super::FlagsReport| -> Result<()> {
        log::info!("  [{}] …", query.label);
        let rows = source.select(&query.sparql)?;
        let mut created = 0;
        for row in &rows {
            let country_id = if query.by_country {
                let iso2 = row.value("countryISO").trim().to_ascii_uppercase();
                country_ids.get(&iso2).copied()
            } else {
                None
            };
            let new = sink.save_flag(FlagCandidate {
                name: row.value("itemLabel").trim().to_string(),
                flag_url: row.value("flag").to_string(),
                category: query.category,
                wikidata_id: text::qid_from_uri(row.value("item")).to_string(),
                country_id,
                description: String::new(),
            })?;
            if new {
                created += 1;
            }
        }
        log::info!("    -> {} rows, {created} new", rows.len());
        report.queries += 1;
        report.rows += rows.len();
        report.created += created;
        Ok(())
    };

    for (idx, batch) in queries::COUNTRY_BATCHES.iter().enumerate() {
        run(
            FlagQuery {
                label: format!(
                    "Batch {}/{} ({})",
                    idx + 1,
                    queries::COUNTRY_BATCHES.len(),
                    batch.join(", ")
                ),
                sparql: queries::flags_by_countries(batch),
                category: None,
                by_country: true,
            },
            &mut report,
        )?;
        pause(opts.batch_pause);
    }

    let groups = [
        (queries::HISTORICAL_STATES, FlagCategory::Historical),
        (queries::INTERNATIONAL_ORGANISATIONS, FlagCategory::International),
    ];
    for (def, category) in groups {
        pause(opts.group_pause);
        run(
            FlagQuery {
                label: def.label.to_string(),
                sparql: def.to_sparql(),
                category: Some(category),
                by_country: false,
            },
            &mut report,
        )?;
    }

    report.total = store.stats()?.flags;
    log::info!(
        "  Phase 2 done: {} new flags, {} in the collection",
        report.created,
        report.total
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::sparql::Binding;
    use crate::ingest::Phase;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const MLEDOZE: &str = r#"[
      {
        "name": {"common": "Slovakia", "official": "Slovak Republic"},
        "cca2": "SK", "cca3": "SVK",
        "capital": ["Bratislava"],
        "region": "Europe", "subregion": "Central Europe",
        "latlng": [48.66666666, 19.5],
        "area": 49037,
        "flag": "🇸🇰",
        "currencies": {"EUR": {"name": "Euro", "symbol": "€"}},
        "languages": {"slk": "Slovak"},
        "borders": ["AUT", "CZE", "HUN", "POL", "UKR"],
        "independent": true,
        "unMember": true
      },
      {
        "name": {"common": "Antarctica", "official": "Antarctica"},
        "cca2": "AQ", "cca3": "ATA",
        "capital": [],
        "region": "Antarctic",
        "latlng": [-90, 0],
        "independent": null
      },
      {"name": {"common": "No codes"}},
      {"name": "not an object", "cca2": 7}
    ]"#;

    fn data_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_populate_countries_from_mledoze() {
        let store = Store::open_in_memory().unwrap();
        let file = data_file(MLEDOZE);

        let report = populate_countries(&store, file.path(), false).unwrap();
        assert_eq!(
            report,
            CountriesReport {
                created: 2,
                updated: 0,
                skipped: 2,
                total: 2,
            }
        );
        assert_eq!(store.list_regions().unwrap().len(), 6);

        let sk = store.country_by_cca3("SVK").unwrap().unwrap();
        assert_eq!(sk.name_official, "Slovak Republic");
        assert_eq!(sk.capital, "Bratislava");
        assert_eq!(sk.flag_png, "https://flagcdn.com/w320/sk.png");
        assert_eq!(sk.currencies_display(), "Euro (EUR)");
        assert_eq!(sk.borders.len(), 5);
        assert_eq!(sk.continents, vec!["Europe".to_string()]);
        assert!(sk.un_member);
        let europe = store.region_by_slug("europe").unwrap().unwrap();
        assert_eq!(sk.region_id, Some(europe.id));

        let aq = store.country_by_cca3("ATA").unwrap().unwrap();
        assert!(!aq.independent);
        assert_eq!(aq.capital, "");
        assert_eq!(aq.latitude, Some(-90.0));
    }

    #[test]
    fn test_populate_countries_twice_does_not_grow() {
        let store = Store::open_in_memory().unwrap();
        let file = data_file(MLEDOZE);
        populate_countries(&store, file.path(), false).unwrap();
        let report = populate_countries(&store, file.path(), false).unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.updated, 2);
        assert_eq!(store.stats().unwrap().countries, 2);
    }

    #[test]
    fn test_populate_countries_clear() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_country(&CountryFields::new("Atlantis", "AX", "ATL"))
            .unwrap();
        let file = data_file(MLEDOZE);
        let report = populate_countries(&store, file.path(), true).unwrap();
        assert_eq!(report.total, 2);
        assert!(store.country_by_cca3("ATL").unwrap().is_none());
    }

    #[test]
    fn test_populate_countries_missing_or_bad_file() {
        let store = Store::open_in_memory().unwrap();
        let err = populate_countries(&store, Path::new("/nonexistent/countries.json"), false)
            .unwrap_err();
        assert!(matches!(err, FlagAtlasError::DataFile(_)));

        let file = data_file("{\"not\": \"a list\"}");
        let err = populate_countries(&store, file.path(), false).unwrap_err();
        assert!(matches!(err, FlagAtlasError::DataFile(_)));
    }

    /// Answers each query with the bindings of the first matching needle.
    struct FakeSource {
        answers: Vec<(&'static str, Vec<Binding>)>,
        queries: RefCell<Vec<String>>,
    }

    impl SparqlSource for FakeSource {
        fn select(&self, query: &str) -> Result<Vec<Binding>> {
            self.queries.borrow_mut().push(query.to_string());
            Ok(self
                .answers
                .iter()
                .find(|(needle, _)| query.contains(needle))
                .map(|(_, rows)| rows.clone())
                .unwrap_or_default())
        }
    }

    fn country_row(iso2: &str, iso3: &str, name: &str, continent: &str) -> Binding {
        Binding::from_pairs([
            ("isoA2", iso2),
            ("isoA3", iso3),
            ("nameEn", name),
            ("population", "1000.0"),
            ("continentQID", continent),
        ])
    }

    fn flag_row(qid: &str, label: &str, iso2: &str) -> Binding {
        let item = format!("http://www.wikidata.org/entity/{qid}");
        let flag = format!("http://commons.wikimedia.org/wiki/Special:FilePath/{qid}.svg");
        Binding::from_pairs([
            ("item", item.as_str()),
            ("itemLabel", label),
            ("flag", flag.as_str()),
            ("countryISO", iso2),
        ])
    }

    fn fake() -> FakeSource {
        FakeSource {
            answers: vec![
                (
                    "?isoA3_",
                    vec![
                        country_row("SK", "SVK", "Slovakia", "http://www.wikidata.org/entity/Q46"),
                        country_row("DE", "DEU", "Germany", "http://www.wikidata.org/entity/Q46"),
                        country_row("XX", "", "Q99999", ""),
                    ],
                ),
                (
                    "\"SK\"",
                    vec![
                        flag_row("Q192089", "Žilina Region", "SK"),
                        flag_row("Q1780", "Bratislava City", "SK"),
                        flag_row("Q214", "Slovakia", "SK"),
                    ],
                ),
                ("wd:Q3024240", vec![flag_row("Q27306", "Prussia", "")]),
                ("wd:Q484652", vec![flag_row("Q458", "European Union", "")]),
            ],
            queries: RefCell::new(Vec::new()),
        }
    }

    fn quick(phase: Phase) -> WikidataOptions {
        WikidataOptions {
            clear: false,
            phase,
            batch_pause: Duration::ZERO,
            group_pause: Duration::ZERO,
        }
    }

    #[test]
    fn test_populate_wikidata_both_phases() {
        let store = Store::open_in_memory().unwrap();
        let source = fake();
        let report = populate_wikidata(&store, &source, &quick(Phase::All)).unwrap();

        let countries = report.countries.unwrap();
        assert_eq!(countries.created, 2);
        assert_eq!(countries.skipped, 1);

        let extras = report.extras.unwrap();
        assert_eq!(extras.queries, 24);
        assert_eq!(extras.created, 4);
        assert_eq!(report.totals.flags, 4);
        assert_eq!(source.queries.borrow().len(), 25);

        let sk = store.country_by_cca3("SVK").unwrap().unwrap();
        assert_eq!(sk.flag_emoji, "🇸🇰");
        let zilina = store
            .search_flags(
                &crate::store::FlagFilter {
                    search: Some("zilina".into()),
                    ..Default::default()
                },
                10,
                0,
            )
            .unwrap();
        assert_eq!(zilina[0].country_id, Some(sk.id));
        assert_eq!(zilina[0].category, FlagCategory::Region);

        let counts = store.count_flags_by_category().unwrap();
        assert_eq!(counts[&FlagCategory::City], 1);
        assert_eq!(counts[&FlagCategory::Historical], 1);
        assert_eq!(counts[&FlagCategory::International], 1);
    }

    #[test]
    fn test_populate_wikidata_rerun_does_not_grow() {
        let store = Store::open_in_memory().unwrap();
        let source = fake();
        populate_wikidata(&store, &source, &quick(Phase::All)).unwrap();
        let before = store.stats().unwrap();

        let report = populate_wikidata(&store, &source, &quick(Phase::All)).unwrap();
        assert_eq!(report.totals, before);
        assert_eq!(report.countries.unwrap().updated, 2);
        assert_eq!(report.extras.unwrap().created, 0);
    }

    #[test]
    fn test_phase_one_only_keeps_mledoze_columns() {
        let store = Store::open_in_memory().unwrap();
        let file = data_file(MLEDOZE);
        populate_countries(&store, file.path(), false).unwrap();

        let source = fake();
        let report = populate_wikidata(&store, &source, &quick(Phase::Countries)).unwrap();
        assert!(report.extras.is_none());
        assert_eq!(source.queries.borrow().len(), 1);

        let sk = store.country_by_cca3("SVK").unwrap().unwrap();
        assert_eq!(sk.population, 1000);
        assert_eq!(sk.currencies_display(), "Euro (EUR)");
        assert_eq!(sk.area, Some(49037.0));
    }

    struct FailingSource;

    impl SparqlSource for FailingSource {
        fn select(&self, _query: &str) -> Result<Vec<Binding>> {
            Err(FlagAtlasError::Sparql("endpoint unavailable".into()))
        }
    }

    #[test]
    fn test_populate_wikidata_aborts_on_error() {
        let store = Store::open_in_memory().unwrap();
        let err = populate_wikidata(&store, &FailingSource, &quick(Phase::All)).unwrap_err();
        assert!(matches!(err, FlagAtlasError::Sparql(_)));
        // Regions were written before the failure and stay.
        assert_eq!(store.stats().unwrap().regions, 6);
    }
}
