//! Turning SPARQL rows into store records.

use super::sparql::Binding;
use crate::model::{CountryFields, FlagCategory};
use crate::text;

pub const NAME_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 500;
pub const THUMB_WIDTH: u32 = 320;

/// The six regions and their descriptions.
pub const REGIONS: [(&str, &str); 6] = [
    ("Africa", "The second-largest and second-most populous continent, home to 54 countries."),
    ("Americas", "Comprising North America, Central America, South America and the Caribbean."),
    ("Antarctic", "The southernmost continent, surrounding the South Pole."),
    ("Asia", "The largest and most populous continent, spanning from the Middle East to the Pacific."),
    ("Europe", "The second-smallest continent, known for its rich history and cultural diversity."),
    ("Oceania", "A geographic region including Australasia, Melanesia, Micronesia and Polynesia."),
];

/// Region name for a continent, by QID first and English label second.
pub fn region_for_continent(qid: &str, label: &str) -> Option<&'static str> {
    let by_qid = match qid {
        "Q15" => Some("Africa"),
        "Q48" => Some("Asia"),
        "Q46" => Some("Europe"),
        "Q49" | "Q828" | "Q18" | "Q27611" | "Q664609" => Some("Americas"),
        "Q538" => Some("Oceania"),
        "Q51" => Some("Antarctic"),
        _ => None,
    };
    by_qid.or_else(|| match label.trim().to_lowercase().as_str() {
        "africa" => Some("Africa"),
        "asia" => Some("Asia"),
        "europe" => Some("Europe"),
        "north america" | "south america" | "central america" | "caribbean" | "americas" => {
            Some("Americas")
        }
        "oceania" | "australia" => Some("Oceania"),
        "antarctica" => Some("Antarctic"),
        _ => None,
    })
}

/// A country row from the countries query, before region lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedCountry {
    pub fields: CountryFields,
    pub region: Option<&'static str>,
}

/// Map one countries-query row. `None` for rows to skip: no English
/// name, no ISO code, or an unresolved `Q…` label.
pub fn country_from_binding(row: &Binding) -> Option<MappedCountry> {
    let iso2 = row.value("isoA2").trim().to_ascii_uppercase();
    let name = row.value("nameEn").trim();
    if name.is_empty() || iso2.is_empty() || text::is_qid_label(name) {
        return None;
    }
    let mut iso3 = row.value("isoA3").trim().to_ascii_uppercase();
    if iso3.is_empty() {
        iso3 = format!("X{iso2}");
    }

    let population = row
        .value("population")
        .trim()
        .parse::<f64>()
        .map(|p| p as i64)
        .unwrap_or(0);
    let area = row.value("areaKm2").trim().parse::<f64>().ok();

    let flag = row.value("flagSvg");
    let (flag_svg, flag_png) = if flag.to_lowercase().ends_with(".svg") {
        (flag.to_string(), text::commons_thumb(flag, THUMB_WIDTH))
    } else {
        (text::flagcdn_svg(&iso2), text::flagcdn_png(&iso2))
    };

    let region = region_for_continent(
        text::qid_from_uri(row.value("continentQID")),
        row.value("continentLabel"),
    );

    let fields = CountryFields {
        capital: row.value("capital").trim().to_string(),
        population,
        area,
        flag_svg,
        flag_png,
        flag_emoji: text::iso2_to_emoji(&iso2),
        ..CountryFields::new(name, &iso2, &iso3)
    };
    Some(MappedCountry { fields, region })
}

/// Guess a category from an entity label.
pub fn classify_name(name: &str) -> FlagCategory {
    const CITY: [&str; 6] = [" city", " town", " municipal", " commune", " borough", " metropol"];
    const STATE: [&str; 12] = [
        "province",
        "state of",
        "canton",
        "prefecture",
        "voivodeship",
        "oblast",
        "department",
        "governorate",
        "emirate",
        "county of",
        "autonomous community",
        "district",
    ];
    const TERRITORY: [&str; 3] = ["territory", "dependent", "overseas"];

    let lower = name.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&CITY) {
        FlagCategory::City
    } else if has(&STATE) {
        FlagCategory::State
    } else if has(&TERRITORY) {
        FlagCategory::Territory
    } else {
        FlagCategory::Region
    }
}

/// Commons SVG links become fixed-width PNG thumbnails. Other URLs pass through.
pub fn flag_image_url(url: &str) -> String {
    if url.to_lowercase().ends_with(".svg") {
        text::commons_thumb(url, THUMB_WIDTH)
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(pairs: &[(&str, &str)]) -> Binding {
        Binding::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_country_from_full_row() {
        let mapped = country_from_binding(&row(&[
            ("isoA2", "sk"),
            ("isoA3", "SVK"),
            ("nameEn", "Slovakia"),
            ("population", "5460185.0"),
            ("flagSvg", "http://commons.wikimedia.org/wiki/Special:FilePath/Flag%20of%20Slovakia.svg"),
            ("capital", "Bratislava"),
            ("areaKm2", "49035"),
            ("continentQID", "http://www.wikidata.org/entity/Q46"),
            ("continentLabel", "Europe"),
        ]))
        .unwrap();

        assert_eq!(mapped.region, Some("Europe"));
        let f = mapped.fields;
        assert_eq!(f.cca2, "SK");
        assert_eq!(f.cca3, "SVK");
        assert_eq!(f.population, 5_460_185);
        assert_eq!(f.area, Some(49035.0));
        assert_eq!(f.capital, "Bratislava");
        assert_eq!(f.flag_emoji, "🇸🇰");
        assert!(f.flag_svg.ends_with("Slovakia.svg"));
        assert!(f.flag_png.ends_with("?width=320"));
    }

    #[test]
    fn test_country_fallbacks() {
        let mapped = country_from_binding(&row(&[
            ("isoA2", "XK"),
            ("nameEn", "Kosovo"),
            ("population", "lots"),
            ("areaKm2", "n/a"),
            ("flagSvg", "http://example.org/kosovo.png"),
            ("continentLabel", "Europe"),
        ]))
        .unwrap();

        assert_eq!(mapped.fields.cca3, "XXK");
        assert_eq!(mapped.fields.population, 0);
        assert_eq!(mapped.fields.area, None);
        assert_eq!(mapped.fields.flag_svg, "https://flagcdn.com/xk.svg");
        assert_eq!(mapped.fields.flag_png, "https://flagcdn.com/w320/xk.png");
        assert_eq!(mapped.region, Some("Europe"));
    }

    #[test]
    fn test_country_rows_skipped() {
        assert!(country_from_binding(&row(&[("isoA2", "DE")])).is_none());
        assert!(country_from_binding(&row(&[("nameEn", "Germany")])).is_none());
        assert!(country_from_binding(&row(&[("isoA2", "DE"), ("nameEn", "Q183")])).is_none());
    }

    #[test]
    fn test_region_for_continent() {
        assert_eq!(region_for_continent("Q49", ""), Some("Americas"));
        assert_eq!(region_for_continent("Q538", "whatever"), Some("Oceania"));
        assert_eq!(region_for_continent("Q999", "South America"), Some("Americas"));
        assert_eq!(region_for_continent("", "Antarctica"), Some("Antarctic"));
        assert_eq!(region_for_continent("", "Atlantis"), None);
    }

    #[test]
    fn test_classify_name() {
        assert_eq!(classify_name("Bratislava City"), FlagCategory::City);
        assert_eq!(classify_name("Žilina Region"), FlagCategory::Region);
        assert_eq!(classify_name("Masovian Voivodeship"), FlagCategory::State);
        assert_eq!(classify_name("Canton of Zürich"), FlagCategory::State);
        assert_eq!(classify_name("Northern Territory"), FlagCategory::Territory);
        assert_eq!(classify_name("Bavaria"), FlagCategory::Region);
    }

    #[test]
    fn test_flag_image_url() {
        assert_eq!(
            flag_image_url("http://commons.wikimedia.org/wiki/Special:FilePath/Flag.SVG"),
            "https://commons.wikimedia.org/wiki/Special:FilePath/Flag.SVG?width=320"
        );
        assert_eq!(flag_image_url("https://x/flag.png"), "https://x/flag.png");
    }
}
