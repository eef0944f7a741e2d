use clap::{Parser, Subcommand, ValueEnum};
use flagatlas::ingest::sparql::{SparqlClient, SparqlConfig};
use flagatlas::ingest::{self, ExtraCategory, ExtraOptions, Phase, WikidataOptions};
use flagatlas::store::{CountryFilter, FlagFilter};
use flagatlas::view::{self, CountryListQuery, GalleryQuery};
use flagatlas::Store;
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// FlagAtlas CLI: populate and inspect a flag catalogue database
#[derive(Parser)]
#[command(name = "flagatlas", version, about)]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true, env = "FLAGATLAS_DATABASE", default_value = "flagatlas.db")]
    database: PathBuf,

    /// Output format
    #[arg(long, global = true, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Table {
    Countries,
    Regions,
    Flags,
}

#[derive(Subcommand)]
enum Command {
    /// Load countries from a local mledoze-format countries.json
    PopulateCountries {
        /// Wipe regions, countries and flags first
        #[arg(long)]
        clear: bool,
        /// Path to the dataset
        #[arg(long, default_value = "data/countries.json")]
        data_file: PathBuf,
    },

    /// Load countries and subdivision flags from Wikidata
    PopulateWikidata {
        /// Wipe regions, countries and flags first
        #[arg(long)]
        clear: bool,
        /// 0 = everything, 1 = countries only, 2 = extra flags only
        #[arg(long, default_value_t = 0)]
        phase: u8,
        /// Attempts per SPARQL query
        #[arg(long, default_value_t = 1)]
        retries: u32,
        /// Pause between queries in milliseconds
        #[arg(long)]
        pause_ms: Option<u64>,
    },

    /// Load historical, international and territory flags from Wikidata
    PopulateExtra {
        /// all, historical, international or territory
        #[arg(long, default_value = "all")]
        category: String,
        /// Attempts per SPARQL query
        #[arg(long, default_value_t = 1)]
        retries: u32,
        /// Pause between queries in milliseconds
        #[arg(long)]
        pause_ms: Option<u64>,
    },

    /// Run the dedup and noise cleanup pass
    Cleanup,

    /// Row counts
    Stats,

    /// Show one country by cca2 or cca3 code
    Country {
        code: String,
    },

    /// Search countries by name, official name or capital
    Search {
        query: String,
        /// Only countries in this region (slug)
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        page: Option<String>,
    },

    /// One page of the flag gallery
    Flags {
        /// all, country or a flag category
        #[arg(long)]
        category: Option<String>,
        /// Search text
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        page: Option<String>,
    },

    /// Dump a whole table
    Export {
        #[arg(value_enum)]
        table: Table,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(&cli.database)?;
    log::debug!("Opened {}", cli.database.display());

    match cli.command {
        Command::PopulateCountries { clear, data_file } => {
            let report = ingest::populate_countries(&store, &data_file, clear)?;
            print_output(&report, &cli.format)?;
        }

        Command::PopulateWikidata {
            clear,
            phase,
            retries,
            pause_ms,
        } => {
            let source = sparql_client(retries)?;
            let mut opts = WikidataOptions {
                clear,
                phase: Phase::from_number(phase)?,
                ..Default::default()
            };
            if let Some(ms) = pause_ms {
                opts.batch_pause = Duration::from_millis(ms);
                opts.group_pause = Duration::from_millis(ms);
            }
            let report = ingest::populate_wikidata(&store, &source, &opts)?;
            print_output(&report, &cli.format)?;
        }

        Command::PopulateExtra {
            category,
            retries,
            pause_ms,
        } => {
            let source = sparql_client(retries)?;
            let mut opts = ExtraOptions {
                category: category.parse::<ExtraCategory>()?,
                ..Default::default()
            };
            if let Some(ms) = pause_ms {
                opts.pause = Duration::from_millis(ms);
            }
            let report = ingest::populate_extra(&store, &source, &opts)?;
            print_output(&report, &cli.format)?;
        }

        Command::Cleanup => {
            let report = ingest::cleanup(&store)?;
            print_output(&report, &cli.format)?;
        }

        Command::Stats => {
            print_output(&store.stats()?, &cli.format)?;
        }

        Command::Country { code } => {
            let code = code.trim().to_uppercase();
            let cca3 = match code.len() {
                2 => store.country_by_cca2(&code)?.map(|c| c.cca3.clone()),
                _ => Some(code.clone()),
            };
            let detail = match cca3 {
                Some(cca3) => view::country_detail(&store, &cca3)?,
                None => None,
            };
            let detail = detail.ok_or_else(|| flagatlas::FlagAtlasError::not_found("country", &code))?;
            print_output(&detail, &cli.format)?;
        }

        Command::Search {
            query,
            region,
            page,
        } => {
            let context = view::countries_list(
                &store,
                &CountryListQuery {
                    search: Some(query),
                    region,
                    page,
                    ..Default::default()
                },
            )?;
            print_output(&context, &cli.format)?;
        }

        Command::Flags { category, q, page } => {
            let context = view::flags_gallery(&store, &GalleryQuery { category, q, page })?;
            print_output(&context, &cli.format)?;
        }

        Command::Export { table } => match table {
            Table::Regions => print_output(&store.list_regions()?, &cli.format)?,
            Table::Countries => {
                let filter = CountryFilter::default();
                let total = store.count_countries(&filter)?;
                print_output(&store.search_countries(&filter, total, 0)?, &cli.format)?;
            }
            Table::Flags => {
                let filter = FlagFilter::default();
                let total = store.count_flags(&filter)?;
                print_output(&store.search_flags(&filter, total, 0)?, &cli.format)?;
            }
        },
    }

    Ok(())
}

fn sparql_client(retries: u32) -> Result<SparqlClient, flagatlas::FlagAtlasError> {
    SparqlClient::new(SparqlConfig {
        max_attempts: retries.max(1),
        ..Default::default()
    })
}

fn print_output<T: Serialize>(value: &T, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_populate_wikidata() {
        let cli = Cli::try_parse_from([
            "flagatlas",
            "--database",
            "/tmp/x.db",
            "populate-wikidata",
            "--clear",
            "--phase",
            "2",
            "--pause-ms",
            "0",
        ])
        .unwrap();
        assert_eq!(cli.database, PathBuf::from("/tmp/x.db"));
        match cli.command {
            Command::PopulateWikidata {
                clear,
                phase,
                retries,
                pause_ms,
            } => {
                assert!(clear);
                assert_eq!(phase, 2);
                assert_eq!(retries, 1);
                assert_eq!(pause_ms, Some(0));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_parse_export_rejects_unknown_table() {
        assert!(Cli::try_parse_from(["flagatlas", "export", "planets"]).is_err());
        assert!(Cli::try_parse_from(["flagatlas", "export", "flags", "--format", "json"]).is_ok());
    }

    #[test]
    fn test_search_and_country_against_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("atlas.db");
        {
            let store = Store::open(&db).unwrap();
            store
                .upsert_country(&flagatlas::CountryFields::new("Slovakia", "SK", "SVK"))
                .unwrap();
        }

        for args in [
            vec!["flagatlas", "search", "slov"],
            vec!["flagatlas", "country", "sk"],
            vec!["flagatlas", "--format", "json", "stats"],
        ] {
            let mut cli = Cli::try_parse_from(args).unwrap();
            cli.database = db.clone();
            run(cli).unwrap();
        }

        let mut cli = Cli::try_parse_from(["flagatlas", "country", "ZZZ"]).unwrap();
        cli.database = db.clone();
        assert!(run(cli).unwrap_err().to_string().contains("ZZZ"));
    }
}
