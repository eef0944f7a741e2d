//! Page contexts. Each function reads the store, applies the query
//! parameters and returns a serializable context for one page.

use crate::error::Result;
use crate::model::{Country, Flag, FlagCard, FlagCategory, Region, RegionWithCount};
use crate::pagination::{Page, PageRequest, Paginator, PAGE_SIZE};
use crate::store::{CountryFilter, GalleryFilter, GalleryScope, Store};
use serde::{Deserialize, Serialize};

const FEATURED_COUNT: usize = 6;

#[derive(Debug, Clone, Serialize)]
pub struct HomeContext {
    pub total_countries: usize,
    /// Country flags plus collection flags.
    pub total_flags: usize,
    pub total_regions: usize,
    pub featured_countries: Vec<Country>,
    pub regions: Vec<RegionWithCount>,
}

pub fn home(store: &Store) -> Result<HomeContext> {
    let stats = store.stats()?;
    Ok(HomeContext {
        total_countries: stats.countries,
        total_flags: stats.countries + stats.flags,
        total_regions: stats.regions,
        featured_countries: store.featured_countries(FEATURED_COUNT)?,
        regions: store.regions_with_counts()?,
    })
}

/// Query string of the country list. `q` is accepted as an alias of `search`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CountryListQuery {
    pub search: Option<String>,
    pub q: Option<String>,
    pub region: Option<String>,
    pub page: Option<String>,
}

impl CountryListQuery {
    /// Trimmed `search`, falling back to `q` when `search` is blank.
    pub fn search_text(&self) -> String {
        fn non_blank(s: &Option<String>) -> Option<&str> {
            s.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        non_blank(&self.search)
            .or_else(|| non_blank(&self.q))
            .unwrap_or("")
            .to_string()
    }

    fn region_slug(&self) -> Option<&str> {
        self.region.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryListContext {
    pub countries: Vec<Country>,
    pub page: Page,
    pub regions: Vec<Region>,
    pub selected_region: Option<String>,
    pub search: String,
    pub total: usize,
}

pub fn countries_list(store: &Store, query: &CountryListQuery) -> Result<CountryListContext> {
    let search = query.search_text();
    let selected_region = query.region_slug().map(String::from);
    let request = PageRequest::parse(query.page.as_deref());

    let region_id = match &selected_region {
        Some(slug) => match store.region_by_slug(slug)? {
            Some(region) => Some(region.id),
            // Unknown slug: nothing matches.
            None => {
                let page = Paginator::new(0, PAGE_SIZE).page(request);
                return Ok(CountryListContext {
                    countries: Vec::new(),
                    page,
                    regions: store.list_regions()?,
                    selected_region,
                    search,
                    total: 0,
                });
            }
        },
        None => None,
    };

    let filter = CountryFilter {
        search: Some(search.clone()),
        region_id,
        codes: false,
    };
    let total = store.count_countries(&filter)?;
    let page = Paginator::new(total, PAGE_SIZE).page(request);
    let countries = store.search_countries(&filter, page.limit(), page.offset)?;

    Ok(CountryListContext {
        countries,
        page,
        regions: store.list_regions()?,
        selected_region,
        search,
        total,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryDetailContext {
    pub country: Country,
    pub region: Option<Region>,
    pub neighbors: Vec<Country>,
    pub additional_flags: Vec<Flag>,
}

/// `None` when no country has this cca3 code.
pub fn country_detail(store: &Store, code: &str) -> Result<Option<CountryDetailContext>> {
    let Some(country) = store.country_by_cca3(code)? else {
        return Ok(None);
    };
    let region = match country.region_id {
        Some(id) => store.get_region(id)?,
        None => None,
    };
    let neighbors = store.countries_by_cca3(&country.borders)?;
    let additional_flags = store.flags_for_country(country.id)?;

    Ok(Some(CountryDetailContext {
        country,
        region,
        neighbors,
        additional_flags,
    }))
}

/// Query string of the flag gallery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GalleryQuery {
    pub category: Option<String>,
    pub q: Option<String>,
    pub page: Option<String>,
}

impl GalleryQuery {
    /// `all`, `country` or a flag category. Anything else is `all`.
    pub fn scope(&self) -> GalleryScope {
        match self.category.as_deref().map(str::trim) {
            Some("country") => GalleryScope::Countries,
            Some(raw) => raw
                .parse::<FlagCategory>()
                .map(GalleryScope::Category)
                .unwrap_or(GalleryScope::All),
            None => GalleryScope::All,
        }
    }
}

/// One filter tab of the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTab {
    pub key: String,
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GalleryContext {
    pub flags: Vec<FlagCard>,
    pub page: Page,
    pub categories: Vec<CategoryTab>,
    pub selected_category: String,
    pub search: String,
    pub total: usize,
}

pub fn scope_key(scope: GalleryScope) -> &'static str {
    match scope {
        GalleryScope::All => "all",
        GalleryScope::Countries => "country",
        GalleryScope::Category(c) => c.as_str(),
    }
}

pub fn flags_gallery(store: &Store, query: &GalleryQuery) -> Result<GalleryContext> {
    let scope = query.scope();
    let search = query.q.as_deref().unwrap_or("").trim().to_string();
    let filter = GalleryFilter {
        scope,
        search: Some(search.clone()),
    };

    let total = store.count_gallery(&filter)?;
    let page = Paginator::new(total, PAGE_SIZE).page(PageRequest::parse(query.page.as_deref()));
    let flags = store.search_gallery(&filter, page.limit(), page.offset)?;

    Ok(GalleryContext {
        flags,
        page,
        categories: category_tabs(store)?,
        selected_category: scope_key(scope).to_string(),
        search,
        total,
    })
}

fn category_tabs(store: &Store) -> Result<Vec<CategoryTab>> {
    let country_flags = store.count_gallery(&GalleryFilter {
        scope: GalleryScope::Countries,
        search: None,
    })?;
    let by_category = store.count_flags_by_category()?;
    let collection_total: usize = by_category.values().sum();

    let mut tabs = vec![
        CategoryTab {
            key: "all".into(),
            label: "All".into(),
            count: country_flags + collection_total,
        },
        CategoryTab {
            key: "country".into(),
            label: "Countries".into(),
            count: country_flags,
        },
    ];
    for category in FlagCategory::ALL {
        tabs.push(CategoryTab {
            key: category.as_str().into(),
            label: category.label().into(),
            count: by_category.get(&category).copied().unwrap_or(0),
        });
    }
    Ok(tabs)
}

#[derive(Debug, Clone, Serialize)]
pub struct DataSource {
    pub name: &'static str,
    pub url: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AboutContext {
    pub title: &'static str,
    pub summary: &'static str,
    pub sources: Vec<DataSource>,
}

pub fn about() -> AboutContext {
    AboutContext {
        title: "About FlagAtlas",
        summary: "Countries, regions and flags of the world, collected from open data. \
                  Country records come from Wikidata or the mledoze countries dataset; \
                  regional, historical and organisation flags come from Wikidata.",
        sources: vec![
            DataSource {
                name: "Wikidata",
                url: "https://query.wikidata.org/",
                description: "Countries, territories, historical states and organisations",
            },
            DataSource {
                name: "Wikimedia Commons",
                url: "https://commons.wikimedia.org/",
                description: "Flag images",
            },
            DataSource {
                name: "Flagpedia / flagcdn",
                url: "https://flagcdn.com/",
                description: "Country flag images by ISO code",
            },
            DataSource {
                name: "mledoze/countries",
                url: "https://github.com/mledoze/countries",
                description: "Country metadata: currencies, languages, borders",
            },
        ],
    }
}
