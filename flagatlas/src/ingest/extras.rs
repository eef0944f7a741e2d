use super::queries::{self, QuerySpec};
use super::sparql::SparqlSource;
use super::{cleanup, pause, CleanupReport, ExtraOptions, FlagCandidate, FlagSink};
use crate::error::Result;
use crate::model::{DbStats, FlagCategory};
use crate::store::Store;
use crate::text;
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts from a run of flag queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlagsReport {
    pub queries: usize,
    pub rows: usize,
    pub created: usize,
    /// Collection size after the run.
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtraReport {
    pub categories: BTreeMap<FlagCategory, FlagsReport>,
    pub created: usize,
    pub cleanup: CleanupReport,
    pub totals: DbStats,
}

fn catalogue() -> [(FlagCategory, Vec<QuerySpec>); 3] {
    [
        (FlagCategory::Historical, queries::historical()),
        (FlagCategory::International, queries::international()),
        (FlagCategory::Territory, queries::territory()),
    ]
}

/// Historical, international and territory flags, followed by cleanup.
pub fn populate_extra(
    store: &Store,
    source: &dyn SparqlSource,
    opts: &ExtraOptions,
) -> Result<ExtraReport> {
    let existing = store.existing_wikidata_ids()?;
    log::info!("{} wikidata ids already stored", existing.len());
    let mut sink = FlagSink::new(store)
        .with_seen(existing)
        .skip_country_names()?;

    let mut report = ExtraReport::default();
    for (category, defs) in catalogue() {
        if !opts.category.includes(category) {
            continue;
        }
        let flags = run_category(store, source, &mut sink, category, &defs, opts)?;
        report.created += flags.created;
        report.categories.insert(category, flags);
    }

    log::info!("Deduplication and cleanup");
    report.cleanup = cleanup(store)?;
    report.totals = store.stats()?;

    let counts = store.count_flags_by_category()?;
    log::info!(
        "Done: {} new flags. Historical: {}, International: {}, Territory: {}, total {} + {} countries",
        report.created,
        counts.get(&FlagCategory::Historical).unwrap_or(&0),
        counts.get(&FlagCategory::International).unwrap_or(&0),
        counts.get(&FlagCategory::Territory).unwrap_or(&0),
        report.totals.flags,
        report.totals.countries
    );
    Ok(report)
}

fn run_category(
    store: &Store,
    source: &dyn SparqlSource,
    sink: &mut FlagSink<'_>,
    category: FlagCategory,
    defs: &[QuerySpec],
    opts: &ExtraOptions,
) -> Result<FlagsReport> {
    log::info!("Category: {}", category.as_str().to_uppercase());
    let mut report = FlagsReport::default();

    for def in defs {
        log::info!("  [{}] …", def.label);
        let rows = source.select(&def.to_sparql())?;
        let mut created = 0;
        for row in &rows {
            let new = sink.save_flag(FlagCandidate {
                name: row.value("itemLabel").trim().to_string(),
                flag_url: row.value("flag").to_string(),
                category: Some(category),
                wikidata_id: text::qid_from_uri(row.value("item")).to_string(),
                ..Default::default()
            })?;
            if new {
                created += 1;
            }
        }
        log::info!("    -> {} results, {created} new flags", rows.len());
        report.queries += 1;
        report.rows += rows.len();
        report.created += created;
        pause(opts.pause);
    }

    report.total = store.count_flags(&crate::store::FlagFilter {
        category: Some(category),
        ..Default::default()
    })?;
    log::info!("  {}: {} new, total in DB: {}", category, report.created, report.total);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlagAtlasError;
    use crate::ingest::sparql::Binding;
    use crate::ingest::ExtraCategory;
    use crate::model::{CountryFields, FlagFields};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::time::Duration;

    /// Returns rows keyed by a needle found in the query text.
    struct CannedSource {
        answers: Vec<(&'static str, Vec<Binding>)>,
        calls: Cell<usize>,
    }

    impl SparqlSource for CannedSource {
        fn select(&self, query: &str) -> Result<Vec<Binding>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self
                .answers
                .iter()
                .filter(|(needle, _)| query.contains(needle))
                .flat_map(|(_, rows)| rows.clone())
                .collect())
        }
    }

    fn row(qid: &str, label: &str, image: &str) -> Binding {
        let item = format!("http://www.wikidata.org/entity/{qid}");
        Binding::from_pairs([("item", item.as_str()), ("itemLabel", label), ("flag", image)])
    }

    fn source() -> CannedSource {
        CannedSource {
            answers: vec![
                (
                    "wd:Q3024240",
                    vec![
                        row("Q27306", "Kingdom of Prussia", "https://img/prussia.png"),
                        row("Q15180", "Soviet Union", "https://img/ussr.png"),
                    ],
                ),
                // Same entity from a second historical query.
                ("wd:Q1790360", vec![row("Q15180", "USSR", "https://img/ussr.png")]),
                (
                    "wd:Q484652",
                    vec![
                        row("Q458", "European Union", "https://img/eu.png"),
                        row("Q1", "Olympic Council", "https://img/oc.png"),
                    ],
                ),
                ("wd:Q161243", vec![row("Q25228", "Bermuda", "https://img/bermuda.png")]),
                ("wd:Q783733", vec![row("Q5765", "Germany", "https://img/de.png")]),
            ],
            calls: Cell::new(0),
        }
    }

    fn opts(category: ExtraCategory) -> ExtraOptions {
        ExtraOptions {
            category,
            pause: Duration::ZERO,
        }
    }

    #[test]
    fn test_populate_extra_all_categories() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_country(&CountryFields::new("Germany", "DE", "DEU"))
            .unwrap();
        let source = source();

        let report = populate_extra(&store, &source, &opts(ExtraCategory::All)).unwrap();

        let total_queries =
            queries::historical().len() + queries::international().len() + queries::territory().len();
        assert_eq!(source.calls.get(), total_queries);
        assert_eq!(report.categories[&FlagCategory::Historical].created, 2);
        assert_eq!(report.categories[&FlagCategory::International].created, 2);
        assert_eq!(report.categories[&FlagCategory::Territory].created, 1);
        assert_eq!(report.created, 5);
        assert_eq!(report.cleanup.noise, 1);
        assert_eq!(report.totals.flags, 4);
    }

    #[test]
    fn test_populate_extra_single_category_and_rerun() {
        let store = Store::open_in_memory().unwrap();
        let source = source();

        let first = populate_extra(&store, &source, &opts(ExtraCategory::Historical)).unwrap();
        assert_eq!(source.calls.get(), queries::historical().len());
        assert_eq!(first.categories.len(), 1);
        assert_eq!(first.totals.flags, 2);

        let second = populate_extra(&store, &source, &opts(ExtraCategory::Historical)).unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.totals.flags, 2);
    }

    #[test]
    fn test_populate_extra_cleans_preexisting_duplicates() {
        let store = Store::open_in_memory().unwrap();
        for name in ["Bermuda", "Bermuda (old)"] {
            store
                .insert_flag(&FlagFields {
                    wikidata_id: Some("Q25228".into()),
                    ..FlagFields::new(name, FlagCategory::Territory, &format!("https://img/{name}.png"))
                })
                .unwrap();
        }

        let report = populate_extra(&store, &source(), &opts(ExtraCategory::Territory)).unwrap();
        // Only Q5765 is new; Q25228 was already stored.
        assert_eq!(report.created, 1);
        assert_eq!(report.cleanup.duplicate_ids, 1);
        let bermuda = store
            .search_flags(
                &crate::store::FlagFilter {
                    search: Some("Q25228".into()),
                    ..Default::default()
                },
                10,
                0,
            )
            .unwrap();
        assert_eq!(bermuda.len(), 1);
        assert_eq!(bermuda[0].name, "Bermuda");
    }

    struct DownSource;

    impl SparqlSource for DownSource {
        fn select(&self, _query: &str) -> Result<Vec<Binding>> {
            Err(FlagAtlasError::Sparql("503 Service Unavailable".into()))
        }
    }

    #[test]
    fn test_populate_extra_propagates_errors() {
        let store = Store::open_in_memory().unwrap();
        let err = populate_extra(&store, &DownSource, &opts(ExtraCategory::All)).unwrap_err();
        assert!(matches!(err, FlagAtlasError::Sparql(_)));
    }
}
