use crate::error::{FlagAtlasError, Result};
use crate::model::{
    Country, CountryFields, DbStats, Flag, FlagCard, FlagCardSource, FlagCategory, FlagFields,
    Region, RegionFields, RegionWithCount, Upsert,
};
use crate::text;
use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

const COUNTRY_COLUMNS: &str = "id, name_common, name_official, cca2, cca3, capital, region_id, \
     subregion, population, area, latitude, longitude, flag_svg, flag_png, flag_emoji, \
     coat_of_arms_svg, coat_of_arms_png, currencies, languages, timezones, continents, borders, \
     independent, un_member, created_at, updated_at";

const FLAG_COLUMNS: &str =
    "id, name, category, description, flag_image, wikidata_id, country_id, created_at";

/// Filter for country listings. Empty search text means no search.
#[derive(Debug, Clone, Default)]
pub struct CountryFilter {
    pub search: Option<String>,
    pub region_id: Option<i64>,
    /// Search text also matches cca2/cca3 exactly (admin search).
    pub codes: bool,
}

/// Filter for flag collection listings. Search text matches the name,
/// the description or the wikidata id.
#[derive(Debug, Clone, Default)]
pub struct FlagFilter {
    pub search: Option<String>,
    pub category: Option<FlagCategory>,
    pub country_id: Option<i64>,
}

/// Which half of the gallery union to page over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GalleryScope {
    #[default]
    All,
    Countries,
    Category(FlagCategory),
}

#[derive(Debug, Clone, Default)]
pub struct GalleryFilter {
    pub scope: GalleryScope,
    pub search: Option<String>,
}

/// SQLite-backed store for regions, countries and the flag collection.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        register_fold(&conn)?;
        let store = Store { conn };
        store.initialize_tables()?;
        Ok(store)
    }

    fn initialize_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS regions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                slug TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS countries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name_common TEXT NOT NULL,
                name_official TEXT NOT NULL DEFAULT '',
                cca2 TEXT NOT NULL UNIQUE,
                cca3 TEXT NOT NULL UNIQUE,
                capital TEXT NOT NULL DEFAULT '',
                region_id INTEGER REFERENCES regions(id) ON DELETE SET NULL,
                subregion TEXT NOT NULL DEFAULT '',
                population INTEGER NOT NULL DEFAULT 0,
                area REAL,
                latitude REAL,
                longitude REAL,
                flag_svg TEXT NOT NULL DEFAULT '',
                flag_png TEXT NOT NULL DEFAULT '',
                flag_emoji TEXT NOT NULL DEFAULT '',
                coat_of_arms_svg TEXT NOT NULL DEFAULT '',
                coat_of_arms_png TEXT NOT NULL DEFAULT '',
                currencies TEXT NOT NULL DEFAULT '{}',
                languages TEXT NOT NULL DEFAULT '{}',
                timezones TEXT NOT NULL DEFAULT '[]',
                continents TEXT NOT NULL DEFAULT '[]',
                borders TEXT NOT NULL DEFAULT '[]',
                independent INTEGER NOT NULL DEFAULT 1,
                un_member INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_countries_name ON countries(name_common);
            CREATE INDEX IF NOT EXISTS idx_countries_region ON countries(region_id);

            CREATE TABLE IF NOT EXISTS flag_collection (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                flag_image TEXT NOT NULL,
                wikidata_id TEXT,
                country_id INTEGER REFERENCES countries(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_flags_wikidata ON flag_collection(wikidata_id);
            CREATE INDEX IF NOT EXISTS idx_flags_category ON flag_collection(category);
            CREATE INDEX IF NOT EXISTS idx_flags_country ON flag_collection(country_id);
            ",
        )?;
        Ok(())
    }

    // ── Regions ──────────────────────────────────────────────────────

    /// Get a region by name, creating it (slug derived from the name) if missing.
    /// An existing region keeps its description.
    pub fn ensure_region(&self, name: &str, description: &str) -> Result<Region> {
        let existing = self
            .conn
            .query_row(
                "SELECT id, name, slug, description FROM regions WHERE name = ?1",
                params![name],
                row_to_region,
            )
            .optional()?;
        if let Some(region) = existing {
            return Ok(region);
        }
        self.insert_region(RegionFields {
            name: name.to_string(),
            slug: String::new(),
            description: description.to_string(),
        })
    }

    pub fn list_regions(&self) -> Result<Vec<Region>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, slug, description FROM regions ORDER BY name, id")?;
        let rows = stmt.query_map([], row_to_region)?;

        let mut regions = Vec::new();
        for row in rows {
            regions.push(row?);
        }
        Ok(regions)
    }

    /// Regions with their country counts, most populated (by country count) first.
    pub fn regions_with_counts(&self) -> Result<Vec<RegionWithCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.name, r.slug, r.description, COUNT(c.id) AS n
             FROM regions r LEFT JOIN countries c ON c.region_id = r.id
             GROUP BY r.id
             ORDER BY n DESC, r.name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RegionWithCount {
                region: row_to_region(row)?,
                country_count: row.get(4)?,
            })
        })?;

        let mut regions = Vec::new();
        for row in rows {
            regions.push(row?);
        }
        Ok(regions)
    }

    pub fn get_region(&self, id: i64) -> Result<Option<Region>> {
        let result = self
            .conn
            .query_row(
                "SELECT id, name, slug, description FROM regions WHERE id = ?1",
                params![id],
                row_to_region,
            )
            .optional()?;
        Ok(result)
    }

    pub fn region_by_slug(&self, slug: &str) -> Result<Option<Region>> {
        let result = self
            .conn
            .query_row(
                "SELECT id, name, slug, description FROM regions WHERE slug = ?1",
                params![slug],
                row_to_region,
            )
            .optional()?;
        Ok(result)
    }

    pub fn insert_region(&self, fields: RegionFields) -> Result<Region> {
        let fields = fields.normalized()?;
        self.conn
            .execute(
                "INSERT INTO regions (name, slug, description) VALUES (?1, ?2, ?3)",
                params![fields.name, fields.slug, fields.description],
            )
            .map_err(|e| constraint_error(e, || format!("region '{}'", fields.name)))?;
        Ok(Region {
            id: self.conn.last_insert_rowid(),
            name: fields.name,
            slug: fields.slug,
            description: fields.description,
        })
    }

    pub fn update_region(&self, id: i64, fields: RegionFields) -> Result<Region> {
        let fields = fields.normalized()?;
        let changed = self
            .conn
            .execute(
                "UPDATE regions SET name = ?1, slug = ?2, description = ?3 WHERE id = ?4",
                params![fields.name, fields.slug, fields.description, id],
            )
            .map_err(|e| constraint_error(e, || format!("region '{}'", fields.name)))?;
        if changed == 0 {
            return Err(FlagAtlasError::not_found("Region", id));
        }
        Ok(Region {
            id,
            name: fields.name,
            slug: fields.slug,
            description: fields.description,
        })
    }

    /// Delete a region. Its countries stay, with no region.
    pub fn delete_region(&self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM regions WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(FlagAtlasError::not_found("Region", id));
        }
        Ok(())
    }

    // ── Countries ────────────────────────────────────────────────────

    /// Insert or update a country keyed by its cca3 code.
    pub fn upsert_country(&self, fields: &CountryFields) -> Result<(Country, Upsert)> {
        let fields = fields.clone().normalized()?;
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM countries WHERE cca3 = ?1",
                params![fields.cca3],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => Ok((self.write_country_update(id, fields)?, Upsert::Updated)),
            None => Ok((self.write_country_insert(fields)?, Upsert::Created)),
        }
    }

    /// Insert a new country. Fails with a conflict if its codes are taken.
    pub fn insert_country(&self, fields: &CountryFields) -> Result<Country> {
        self.write_country_insert(fields.clone().normalized()?)
    }

    pub fn update_country(&self, id: i64, fields: &CountryFields) -> Result<Country> {
        self.write_country_update(id, fields.clone().normalized()?)
    }

    fn write_country_insert(&self, fields: CountryFields) -> Result<Country> {
        let now = Utc::now();
        let json = CountryJson::encode(&fields)?;
        self.conn
            .execute(
                "INSERT INTO countries (name_common, name_official, cca2, cca3, capital, region_id,
                    subregion, population, area, latitude, longitude, flag_svg, flag_png,
                    flag_emoji, coat_of_arms_svg, coat_of_arms_png, currencies, languages,
                    timezones, continents, borders, independent, un_member, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?24)",
                params![
                    fields.name_common,
                    fields.name_official,
                    fields.cca2,
                    fields.cca3,
                    fields.capital,
                    fields.region_id,
                    fields.subregion,
                    fields.population,
                    fields.area,
                    fields.latitude,
                    fields.longitude,
                    fields.flag_svg,
                    fields.flag_png,
                    fields.flag_emoji,
                    fields.coat_of_arms_svg,
                    fields.coat_of_arms_png,
                    json.currencies,
                    json.languages,
                    json.timezones,
                    json.continents,
                    json.borders,
                    fields.independent,
                    fields.un_member,
                    now,
                ],
            )
            .map_err(|e| constraint_error(e, || format!("country {}/{}", fields.cca2, fields.cca3)))?;
        Ok(Country {
            id: self.conn.last_insert_rowid(),
            fields,
            created_at: now,
            updated_at: now,
        })
    }

    fn write_country_update(&self, id: i64, fields: CountryFields) -> Result<Country> {
        let now = Utc::now();
        let json = CountryJson::encode(&fields)?;
        let changed = self
            .conn
            .execute(
                "UPDATE countries SET name_common = ?1, name_official = ?2, cca2 = ?3, cca3 = ?4,
                    capital = ?5, region_id = ?6, subregion = ?7, population = ?8, area = ?9,
                    latitude = ?10, longitude = ?11, flag_svg = ?12, flag_png = ?13,
                    flag_emoji = ?14, coat_of_arms_svg = ?15, coat_of_arms_png = ?16,
                    currencies = ?17, languages = ?18, timezones = ?19, continents = ?20,
                    borders = ?21, independent = ?22, un_member = ?23, updated_at = ?24
                 WHERE id = ?25",
                params![
                    fields.name_common,
                    fields.name_official,
                    fields.cca2,
                    fields.cca3,
                    fields.capital,
                    fields.region_id,
                    fields.subregion,
                    fields.population,
                    fields.area,
                    fields.latitude,
                    fields.longitude,
                    fields.flag_svg,
                    fields.flag_png,
                    fields.flag_emoji,
                    fields.coat_of_arms_svg,
                    fields.coat_of_arms_png,
                    json.currencies,
                    json.languages,
                    json.timezones,
                    json.continents,
                    json.borders,
                    fields.independent,
                    fields.un_member,
                    now,
                    id,
                ],
            )
            .map_err(|e| constraint_error(e, || format!("country {}/{}", fields.cca2, fields.cca3)))?;
        if changed == 0 {
            return Err(FlagAtlasError::not_found("Country", id));
        }
        self.get_country(id)?
            .ok_or_else(|| FlagAtlasError::not_found("Country", id))
    }

    pub fn get_country(&self, id: i64) -> Result<Option<Country>> {
        let sql = format!("SELECT {COUNTRY_COLUMNS} FROM countries WHERE id = ?1");
        let result = self
            .conn
            .query_row(&sql, params![id], row_to_country)
            .optional()?;
        Ok(result)
    }

    /// Look up a country by cca3, case-insensitively.
    pub fn country_by_cca3(&self, cca3: &str) -> Result<Option<Country>> {
        let sql = format!("SELECT {COUNTRY_COLUMNS} FROM countries WHERE cca3 = ?1");
        let result = self
            .conn
            .query_row(&sql, params![cca3.trim().to_ascii_uppercase()], row_to_country)
            .optional()?;
        Ok(result)
    }

    pub fn country_by_cca2(&self, cca2: &str) -> Result<Option<Country>> {
        let sql = format!("SELECT {COUNTRY_COLUMNS} FROM countries WHERE cca2 = ?1");
        let result = self
            .conn
            .query_row(&sql, params![cca2.trim().to_ascii_uppercase()], row_to_country)
            .optional()?;
        Ok(result)
    }

    /// Countries whose cca3 is in `codes`, ordered by name.
    pub fn countries_by_cca3(&self, codes: &[String]) -> Result<Vec<Country>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; codes.len()].join(", ");
        let sql = format!(
            "SELECT {COUNTRY_COLUMNS} FROM countries WHERE cca3 IN ({placeholders})
             ORDER BY name_common, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(codes.iter().map(|c| c.to_ascii_uppercase())),
            row_to_country,
        )?;

        let mut countries = Vec::new();
        for row in rows {
            countries.push(row?);
        }
        Ok(countries)
    }

    /// Map of cca2 code to country id.
    pub fn country_codes_by_cca2(&self) -> Result<HashMap<String, i64>> {
        let mut stmt = self.conn.prepare("SELECT cca2, id FROM countries")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut codes = HashMap::new();
        for row in rows {
            let (cca2, id): (String, i64) = row?;
            codes.insert(cca2, id);
        }
        Ok(codes)
    }

    /// Lower-cased common names of every stored country.
    pub fn country_names(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT name_common FROM countries")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut names = HashSet::new();
        for row in rows {
            names.insert(row?.to_lowercase());
        }
        Ok(names)
    }

    pub fn country_flag_pngs(&self) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT flag_png FROM countries WHERE flag_png != ''")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut urls = HashSet::new();
        for row in rows {
            urls.insert(row?);
        }
        Ok(urls)
    }

    /// The `n` most populous countries.
    pub fn featured_countries(&self, n: usize) -> Result<Vec<Country>> {
        let sql = format!(
            "SELECT {COUNTRY_COLUMNS} FROM countries
             ORDER BY population DESC, name_common, id LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![n as i64], row_to_country)?;

        let mut countries = Vec::new();
        for row in rows {
            countries.push(row?);
        }
        Ok(countries)
    }

    pub fn search_countries(
        &self,
        filter: &CountryFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Country>> {
        let mut clauses = country_clauses(filter);
        let sql = format!(
            "SELECT {COUNTRY_COLUMNS} FROM countries{} ORDER BY name_common, id LIMIT ? OFFSET ?",
            clauses.where_sql()
        );
        clauses.push_page(limit, offset);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(clauses.values.iter()), row_to_country)?;

        let mut countries = Vec::new();
        for row in rows {
            countries.push(row?);
        }
        Ok(countries)
    }

    pub fn count_countries(&self, filter: &CountryFilter) -> Result<usize> {
        let clauses = country_clauses(filter);
        let sql = format!("SELECT COUNT(*) FROM countries{}", clauses.where_sql());
        let count: i64 = self.conn.query_row(
            &sql,
            params_from_iter(clauses.values.iter()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn delete_country(&self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM countries WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(FlagAtlasError::not_found("Country", id));
        }
        Ok(())
    }

    // ── Flag collection ──────────────────────────────────────────────

    /// Insert or update the flag keyed by its wikidata id. When duplicates
    /// already exist the lowest id is updated.
    pub fn upsert_flag_by_wikidata_id(&self, fields: &FlagFields) -> Result<(Flag, Upsert)> {
        let fields = fields.clone().normalized()?;
        let qid = fields.wikidata_id.clone().ok_or_else(|| {
            FlagAtlasError::Validation(format!("Flag '{}' has no wikidata_id", fields.name))
        })?;
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT MIN(id) FROM flag_collection WHERE wikidata_id = ?1",
                params![qid],
                |row| row.get(0),
            )?;

        let Some(id) = existing else {
            return Ok((self.insert_flag(&fields)?, Upsert::Created));
        };

        // Blank description and missing country keep what is stored.
        self.conn
            .execute(
                "UPDATE flag_collection SET name = ?1, category = ?2,
                    description = CASE WHEN ?3 = '' THEN description ELSE ?3 END,
                    flag_image = ?4, country_id = COALESCE(?5, country_id)
                 WHERE id = ?6",
                params![
                    fields.name,
                    fields.category,
                    fields.description,
                    fields.flag_image,
                    fields.country_id,
                    id,
                ],
            )
            .map_err(|e| constraint_error(e, || format!("flag '{}'", fields.name)))?;
        let flag = self
            .get_flag(id)?
            .ok_or_else(|| FlagAtlasError::not_found("Flag", id))?;
        Ok((flag, Upsert::Updated))
    }

    /// Find a flag by (name, category), creating it from `fields` if missing.
    /// The bool is true when a row was created.
    pub fn get_or_create_flag(&self, fields: &FlagFields) -> Result<(Flag, bool)> {
        let fields = fields.clone().normalized()?;
        let sql = format!(
            "SELECT {FLAG_COLUMNS} FROM flag_collection
             WHERE name = ?1 AND category = ?2 ORDER BY id LIMIT 1"
        );
        let existing = self
            .conn
            .query_row(&sql, params![fields.name, fields.category], row_to_flag)
            .optional()?;

        match existing {
            Some(flag) => Ok((flag, false)),
            None => Ok((self.insert_flag(&fields)?, true)),
        }
    }

    /// Insert a flag row unconditionally.
    pub fn insert_flag(&self, fields: &FlagFields) -> Result<Flag> {
        let fields = fields.clone().normalized()?;
        let now = Utc::now();
        self.conn
            .execute(
                "INSERT INTO flag_collection
                    (name, category, description, flag_image, wikidata_id, country_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    fields.name,
                    fields.category,
                    fields.description,
                    fields.flag_image,
                    fields.wikidata_id,
                    fields.country_id,
                    now,
                ],
            )
            .map_err(|e| constraint_error(e, || format!("flag '{}'", fields.name)))?;
        Ok(Flag {
            id: self.conn.last_insert_rowid(),
            fields,
            created_at: now,
        })
    }

    pub fn update_flag(&self, id: i64, fields: &FlagFields) -> Result<Flag> {
        let fields = fields.clone().normalized()?;
        let changed = self
            .conn
            .execute(
                "UPDATE flag_collection SET name = ?1, category = ?2, description = ?3,
                    flag_image = ?4, wikidata_id = ?5, country_id = ?6
                 WHERE id = ?7",
                params![
                    fields.name,
                    fields.category,
                    fields.description,
                    fields.flag_image,
                    fields.wikidata_id,
                    fields.country_id,
                    id,
                ],
            )
            .map_err(|e| constraint_error(e, || format!("flag '{}'", fields.name)))?;
        if changed == 0 {
            return Err(FlagAtlasError::not_found("Flag", id));
        }
        self.get_flag(id)?
            .ok_or_else(|| FlagAtlasError::not_found("Flag", id))
    }

    pub fn get_flag(&self, id: i64) -> Result<Option<Flag>> {
        let sql = format!("SELECT {FLAG_COLUMNS} FROM flag_collection WHERE id = ?1");
        let result = self
            .conn
            .query_row(&sql, params![id], row_to_flag)
            .optional()?;
        Ok(result)
    }

    pub fn flags_for_country(&self, country_id: i64) -> Result<Vec<Flag>> {
        let filter = FlagFilter {
            country_id: Some(country_id),
            ..Default::default()
        };
        self.search_flags(&filter, usize::MAX >> 1, 0)
    }

    /// Flags matching the filter.
    pub fn search_flags(&self, filter: &FlagFilter, limit: usize, offset: usize) -> Result<Vec<Flag>> {
        let mut clauses = flag_clauses(filter);
        let sql = format!(
            "SELECT {FLAG_COLUMNS} FROM flag_collection{} ORDER BY name, id LIMIT ? OFFSET ?",
            clauses.where_sql()
        );
        clauses.push_page(limit, offset);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(clauses.values.iter()), row_to_flag)?;

        let mut flags = Vec::new();
        for row in rows {
            flags.push(row?);
        }
        Ok(flags)
    }

    pub fn count_flags(&self, filter: &FlagFilter) -> Result<usize> {
        let clauses = flag_clauses(filter);
        let sql = format!("SELECT COUNT(*) FROM flag_collection{}", clauses.where_sql());
        let count: i64 = self.conn.query_row(
            &sql,
            params_from_iter(clauses.values.iter()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Row count per category, with every category present (zero if empty).
    pub fn count_flags_by_category(&self) -> Result<BTreeMap<FlagCategory, usize>> {
        let mut counts: BTreeMap<FlagCategory, usize> =
            FlagCategory::ALL.iter().map(|c| (*c, 0)).collect();

        let mut stmt = self
            .conn
            .prepare("SELECT category, COUNT(*) FROM flag_collection GROUP BY category")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, FlagCategory>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (category, n) = row?;
            counts.insert(category, n as usize);
        }
        Ok(counts)
    }

    pub fn existing_wikidata_ids(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT wikidata_id FROM flag_collection WHERE wikidata_id IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }

    pub fn delete_flag(&self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM flag_collection WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(FlagAtlasError::not_found("Flag", id));
        }
        Ok(())
    }

    // ── Gallery ──────────────────────────────────────────────────────

    /// One page of the gallery: country flags and collection flags as a
    /// single list ordered by folded name.
    pub fn search_gallery(
        &self,
        filter: &GalleryFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FlagCard>> {
        let (union, mut values) = gallery_union(filter);
        let sql = format!(
            "SELECT name, image, source, code, flag_id, category FROM ({union})
             ORDER BY fold(name), source, code, flag_id LIMIT ? OFFSET ?"
        );
        values.push(Value::Integer(limit.min(i64::MAX as usize) as i64));
        values.push(Value::Integer(offset as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            let source: String = row.get(2)?;
            let card_source = if source == "country" {
                FlagCardSource::Country { cca3: row.get(3)? }
            } else {
                FlagCardSource::Collection {
                    id: row.get(4)?,
                    category: row.get(5)?,
                }
            };
            Ok(FlagCard {
                name: row.get(0)?,
                image: row.get(1)?,
                source: card_source,
            })
        })?;

        let mut cards = Vec::new();
        for row in rows {
            cards.push(row?);
        }
        Ok(cards)
    }

    pub fn count_gallery(&self, filter: &GalleryFilter) -> Result<usize> {
        let (union, values) = gallery_union(filter);
        let sql = format!("SELECT COUNT(*) FROM ({union})");
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count as usize)
    }

    // ── Maintenance ──────────────────────────────────────────────────

    /// Delete every row: flags, then countries, then regions.
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM flag_collection;
             DELETE FROM countries;
             DELETE FROM regions;",
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<DbStats> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(DbStats {
            regions: count("regions")?,
            countries: count("countries")?,
            flags: count("flag_collection")?,
        })
    }

    /// Keep only the lowest id among flags sharing a wikidata id.
    pub fn delete_duplicate_wikidata_ids(&self) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM flag_collection
             WHERE wikidata_id IS NOT NULL
               AND id NOT IN (
                   SELECT MIN(id) FROM flag_collection
                   WHERE wikidata_id IS NOT NULL
                   GROUP BY wikidata_id
               )",
            [],
        )?;
        Ok(removed)
    }

    /// Delete collection flags whose image is some country's own flag.
    pub fn delete_flags_matching_country_images(&self) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM flag_collection
             WHERE flag_image IN (SELECT flag_png FROM countries WHERE flag_png != '')",
            [],
        )?;
        Ok(removed)
    }

    /// Delete collection flags whose folded name contains `keyword`.
    pub fn delete_flags_named_like(&self, keyword: &str) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM flag_collection WHERE instr(fold(name), ?1) > 0",
            params![text::fold_key(keyword)],
        )?;
        Ok(removed)
    }

    /// Among flags sharing one image, keep the one with the shortest name
    /// (lowest id on ties) and delete the rest.
    pub fn delete_flags_sharing_image(&self) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            "SELECT id, flag_image FROM flag_collection
             WHERE flag_image IN (
                 SELECT flag_image FROM flag_collection GROUP BY flag_image HAVING COUNT(*) > 1
             )
             ORDER BY flag_image, length(name), id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

        let mut doomed = Vec::new();
        let mut current: Option<String> = None;
        for row in rows {
            let (id, image) = row?;
            if current.as_deref() == Some(image.as_str()) {
                doomed.push(id);
            } else {
                current = Some(image);
            }
        }
        drop(stmt);

        for id in &doomed {
            self.conn
                .execute("DELETE FROM flag_collection WHERE id = ?1", params![id])?;
        }
        Ok(doomed.len())
    }
}

/// Register `fold(text)` so SQL can match on the same key as `text::fold_key`.
fn register_fold(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|s| text::fold_key(&s)))
        },
    )?;
    Ok(())
}

/// WHERE clauses plus their positional values.
#[derive(Default)]
struct Clauses {
    sql: Vec<String>,
    values: Vec<Value>,
}

impl Clauses {
    fn where_sql(&self) -> String {
        if self.sql.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql.join(" AND "))
        }
    }

    fn push_page(&mut self, limit: usize, offset: usize) {
        self.values
            .push(Value::Integer(limit.min(i64::MAX as usize) as i64));
        self.values.push(Value::Integer(offset as i64));
    }
}

fn folded_search(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(text::fold_key)
}

fn country_clauses(filter: &CountryFilter) -> Clauses {
    let mut clauses = Clauses::default();
    if let Some(q) = folded_search(&filter.search) {
        let mut sql = String::from(
            "instr(fold(name_common), ?) > 0 OR instr(fold(name_official), ?) > 0 \
             OR instr(fold(capital), ?) > 0",
        );
        for _ in 0..3 {
            clauses.values.push(Value::Text(q.clone()));
        }
        if filter.codes {
            sql.push_str(" OR cca2 = ? OR cca3 = ?");
            let code = q.to_ascii_uppercase();
            clauses.values.push(Value::Text(code.clone()));
            clauses.values.push(Value::Text(code));
        }
        clauses.sql.push(format!("({sql})"));
    }
    if let Some(region_id) = filter.region_id {
        clauses.sql.push("region_id = ?".into());
        clauses.values.push(Value::Integer(region_id));
    }
    clauses
}

fn flag_clauses(filter: &FlagFilter) -> Clauses {
    let mut clauses = Clauses::default();
    if let Some(q) = folded_search(&filter.search) {
        clauses
            .sql
            .push(
                "(instr(fold(name), ?) > 0 OR instr(fold(description), ?) > 0 \
                 OR instr(fold(wikidata_id), ?) > 0)"
                    .into(),
            );
        for _ in 0..3 {
            clauses.values.push(Value::Text(q.clone()));
        }
    }
    if let Some(category) = filter.category {
        clauses.sql.push("category = ?".into());
        clauses.values.push(Value::Text(category.as_str().into()));
    }
    if let Some(country_id) = filter.country_id {
        clauses.sql.push("country_id = ?".into());
        clauses.values.push(Value::Integer(country_id));
    }
    clauses
}

fn gallery_union(filter: &GalleryFilter) -> (String, Vec<Value>) {
    let q = folded_search(&filter.search);
    let mut parts = Vec::new();
    let mut values = Vec::new();

    if matches!(filter.scope, GalleryScope::All | GalleryScope::Countries) {
        let mut sql = String::from(
            "SELECT name_common AS name, flag_png AS image, 'country' AS source, cca3 AS code,
                    0 AS flag_id, NULL AS category
             FROM countries WHERE flag_png != ''",
        );
        if let Some(q) = &q {
            sql.push_str(" AND instr(fold(name_common), ?) > 0");
            values.push(Value::Text(q.clone()));
        }
        parts.push(sql);
    }

    let category = match filter.scope {
        GalleryScope::All => None,
        GalleryScope::Category(c) => Some(c),
        GalleryScope::Countries => return (parts.join(""), values),
    };
    let mut sql = String::from(
        "SELECT name, flag_image AS image, 'collection' AS source, '' AS code,
                id AS flag_id, category
         FROM flag_collection WHERE flag_image != ''",
    );
    if let Some(category) = category {
        sql.push_str(" AND category = ?");
        values.push(Value::Text(category.as_str().into()));
    }
    if let Some(q) = &q {
        sql.push_str(" AND instr(fold(name), ?) > 0");
        values.push(Value::Text(q.clone()));
    }
    parts.push(sql);

    (parts.join(" UNION ALL "), values)
}

fn row_to_region(row: &Row) -> rusqlite::Result<Region> {
    Ok(Region {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
    })
}

fn row_to_country(row: &Row) -> rusqlite::Result<Country> {
    Ok(Country {
        id: row.get(0)?,
        fields: CountryFields {
            name_common: row.get(1)?,
            name_official: row.get(2)?,
            cca2: row.get(3)?,
            cca3: row.get(4)?,
            capital: row.get(5)?,
            region_id: row.get(6)?,
            subregion: row.get(7)?,
            population: row.get(8)?,
            area: row.get(9)?,
            latitude: row.get(10)?,
            longitude: row.get(11)?,
            flag_svg: row.get(12)?,
            flag_png: row.get(13)?,
            flag_emoji: row.get(14)?,
            coat_of_arms_svg: row.get(15)?,
            coat_of_arms_png: row.get(16)?,
            currencies: json_column(row, 17)?,
            languages: json_column(row, 18)?,
            timezones: json_column(row, 19)?,
            continents: json_column(row, 20)?,
            borders: json_column(row, 21)?,
            independent: row.get(22)?,
            un_member: row.get(23)?,
        },
        created_at: row.get::<_, DateTime<Utc>>(24)?,
        updated_at: row.get::<_, DateTime<Utc>>(25)?,
    })
}

fn row_to_flag(row: &Row) -> rusqlite::Result<Flag> {
    Ok(Flag {
        id: row.get(0)?,
        fields: FlagFields {
            name: row.get(1)?,
            category: row.get(2)?,
            description: row.get(3)?,
            flag_image: row.get(4)?,
            wikidata_id: row.get(5)?,
            country_id: row.get(6)?,
        },
        created_at: row.get(7)?,
    })
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// JSON-encoded country columns.
struct CountryJson {
    currencies: String,
    languages: String,
    timezones: String,
    continents: String,
    borders: String,
}

impl CountryJson {
    fn encode(fields: &CountryFields) -> Result<Self> {
        Ok(CountryJson {
            currencies: serde_json::to_string(&fields.currencies)?,
            languages: serde_json::to_string(&fields.languages)?,
            timezones: serde_json::to_string(&fields.timezones)?,
            continents: serde_json::to_string(&fields.continents)?,
            borders: serde_json::to_string(&fields.borders)?,
        })
    }
}

/// Turn unique/foreign-key violations into domain errors.
fn constraint_error(e: rusqlite::Error, what: impl FnOnce() -> String) -> FlagAtlasError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
            return FlagAtlasError::Validation(format!("{} references a missing row", what()));
        }
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            return FlagAtlasError::Conflict(format!("{} already exists", what()));
        }
    }
    FlagAtlasError::Sqlite(e)
}

impl ToSql for FlagCategory {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for FlagCategory {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: FlagAtlasError| FromSqlError::Other(Box::new(e)))
    }
}
