//! SPARQL query catalogue.
//!
//! Flag queries are described by [`QuerySpec`] values and rendered to
//! SPARQL on demand. Every flag query selects `?item ?itemLabel ?flag`.

use std::collections::HashSet;
use std::fmt::Write;

/// Every entity holding an ISO 3166-1 alpha-2 code, one row per entity.
pub const COUNTRIES: &str = r#"
SELECT ?country ?isoA2
       (SAMPLE(?isoA3_)         AS ?isoA3)
       (SAMPLE(?nameEn_)        AS ?nameEn)
       (MAX(?pop_)              AS ?population)
       (SAMPLE(?flag_)          AS ?flagSvg)
       (SAMPLE(?capitalName_)   AS ?capital)
       (MAX(?area_)             AS ?areaKm2)
       (SAMPLE(?continent_)     AS ?continentQID)
       (SAMPLE(?continentName_) AS ?continentLabel)
WHERE {
  ?country wdt:P297 ?isoA2.
  OPTIONAL { ?country wdt:P298 ?isoA3_. }
  OPTIONAL { ?country rdfs:label ?nameEn_. FILTER(LANG(?nameEn_) = "en") }
  OPTIONAL { ?country wdt:P1082 ?pop_. }
  OPTIONAL { ?country wdt:P41  ?flag_. }
  OPTIONAL {
    ?country wdt:P36 ?cap_.
    ?cap_ rdfs:label ?capitalName_.
    FILTER(LANG(?capitalName_) = "en")
  }
  OPTIONAL { ?country wdt:P2046 ?area_. }
  OPTIONAL {
    ?country wdt:P30 ?cont_.
    BIND(STR(?cont_) AS ?continent_)
    ?cont_ rdfs:label ?continentName_.
    FILTER(LANG(?continentName_) = "en")
  }
}
GROUP BY ?country ?isoA2
ORDER BY ?isoA2
"#;

/// ISO alpha-2 batches for the per-country flag queries. Small batches
/// keep each query under the endpoint's timeout.
pub const COUNTRY_BATCHES: [[&str; 5]; 22] = [
    ["DE", "FR", "GB", "IT", "ES"],
    ["NL", "BE", "PL", "AT", "CZ"],
    ["CH", "SE", "NO", "DK", "FI"],
    ["PT", "IE", "HU", "RO", "HR"],
    ["GR", "BG", "RS", "SK", "SI"],
    ["LT", "LV", "EE", "LU", "IS"],
    ["UA", "RU", "BY", "AL", "MK"],
    ["BA", "ME", "MD", "MT", "CY"],
    ["US", "CA", "MX", "BR", "AR"],
    ["CO", "CL", "PE", "VE", "EC"],
    ["BO", "PY", "UY", "CR", "PA"],
    ["CU", "DO", "GT", "HN", "SV"],
    ["CN", "JP", "IN", "ID", "KR"],
    ["TH", "PH", "VN", "MY", "SG"],
    ["PK", "BD", "LK", "MM", "NP"],
    ["TR", "IR", "IQ", "SA", "AE"],
    ["IL", "JO", "KW", "QA", "OM"],
    ["KZ", "UZ", "GE", "AM", "AZ"],
    ["ZA", "NG", "EG", "KE", "ET"],
    ["GH", "TZ", "CI", "CM", "SN"],
    ["MA", "DZ", "TN", "SD", "UG"],
    ["AU", "NZ", "FJ", "PG", "WS"],
];

/// Flagged entities located in any of the given countries. Rows also
/// carry `?countryISO`.
pub fn flags_by_countries(iso2_codes: &[&str]) -> String {
    let values = iso2_codes
        .iter()
        .map(|code| format!("\"{code}\""))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        r#"
SELECT ?item ?itemLabel ?flag ?countryISO
WHERE {{
  VALUES ?countryISO {{ {values} }}
  ?country wdt:P297 ?countryISO .
  ?item wdt:P17 ?country .
  ?item wdt:P41 ?flag .
  SERVICE wikibase:label {{ bd:serviceParam wikibase:language "en". }}
}}
LIMIT 400
"#
    )
}

/// How a flag query picks its entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Direct instance of any of these classes.
    InstanceOf(&'static [&'static str]),
    /// Direct instance of the class, with a dissolution date.
    DissolvedInstanceOf(&'static str),
    /// Anything dissolved before the given year.
    DissolvedBefore(i32),
    /// These exact entities.
    Items(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySpec {
    pub label: &'static str,
    pub selector: Selector,
    /// Drop entities that have this property, e.g. `P297` for current countries.
    pub exclude_with: Option<&'static str>,
    pub limit: Option<u32>,
}

impl QuerySpec {
    const fn new(label: &'static str, selector: Selector, limit: Option<u32>) -> Self {
        QuerySpec {
            label,
            selector,
            exclude_with: None,
            limit,
        }
    }

    pub fn to_sparql(&self) -> String {
        let mut q = String::from("SELECT ?item ?itemLabel ?flag WHERE {\n");
        match self.selector {
            Selector::InstanceOf(classes) => {
                let _ = writeln!(q, "  VALUES ?type {{ {} }}", entity_list(classes));
                q.push_str("  ?item wdt:P31 ?type .\n");
            }
            Selector::DissolvedInstanceOf(class) => {
                let _ = writeln!(q, "  ?item wdt:P31 wd:{class} .");
                q.push_str("  ?item wdt:P576 ?dissolved .\n");
            }
            Selector::DissolvedBefore(year) => {
                q.push_str("  ?item wdt:P576 ?dissolved .\n");
                let _ = writeln!(q, "  FILTER(YEAR(?dissolved) < {year})");
            }
            Selector::Items(items) => {
                let _ = writeln!(q, "  VALUES ?item {{ {} }}", entity_list(items));
            }
        }
        q.push_str("  ?item wdt:P41 ?flag .\n");
        if let Some(property) = self.exclude_with {
            let _ = writeln!(q, "  MINUS {{ ?item wdt:{property} [] }}");
        }
        q.push_str("  SERVICE wikibase:label { bd:serviceParam wikibase:language \"en\". }\n}\n");
        if let Some(limit) = self.limit {
            let _ = writeln!(q, "LIMIT {limit}");
        }
        q
    }
}

/// `wd:`-prefixed, deduplicated, in first-seen order.
fn entity_list(qids: &[&str]) -> String {
    let mut seen = HashSet::new();
    qids.iter()
        .filter(|q| seen.insert(**q))
        .map(|q| format!("wd:{q}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Historical states not holding a current ISO code.
pub const HISTORICAL_STATES: QuerySpec = QuerySpec {
    label: "Historical states",
    selector: Selector::InstanceOf(&[
        "Q3024240", "Q1790360", "Q133311", "Q839954", "Q28171280", "Q15642541", "Q3624078",
    ]),
    exclude_with: Some("P297"),
    limit: Some(500),
};

/// International organisations without a country.
pub const INTERNATIONAL_ORGANISATIONS: QuerySpec = QuerySpec {
    label: "International organisations",
    selector: Selector::InstanceOf(&[
        "Q484652", "Q7210356", "Q3918328", "Q1335818", "Q1065", "Q47543", "Q1043481",
    ]),
    exclude_with: Some("P17"),
    limit: Some(300),
};

const FAMOUS_HISTORICAL: &[&str] = &[
    "Q7318", "Q15180", "Q12544", "Q12560", "Q45670", "Q83286", "Q43287", "Q172107", "Q153136",
    "Q174306", "Q41304", "Q155059", "Q36704", "Q170541", "Q159683", "Q2184", "Q170072",
    "Q180573", "Q11198", "Q30059", "Q713750", "Q34266", "Q83164", "Q172579", "Q8675",
    "Q131964", "Q154741", "Q9903", "Q8733", "Q148540", "Q12536", "Q12564", "Q178038",
    "Q170587", "Q172640", "Q83860", "Q199442", "Q12490", "Q3400", "Q193714", "Q48984",
    "Q42585", "Q107862", "Q4948", "Q170467", "Q170460", "Q170478", "Q170895", "Q169652",
    "Q170208", "Q170154", "Q170264", "Q170443", "Q170350", "Q170236", "Q170318", "Q116750",
    "Q152750", "Q153015", "Q330672", "Q133346", "Q33946", "Q1054923", "Q859563", "Q129053",
    "Q174193",
];

const FAMOUS_INTERNATIONAL: &[&str] = &[
    "Q1065", "Q458", "Q7184", "Q7825", "Q7768", "Q8908", "Q17495", "Q7785", "Q47764",
    "Q41550", "Q7795", "Q1969730", "Q134102", "Q340195", "Q81299", "Q170481", "Q191384",
    "Q7809", "Q8350", "Q899770", "Q1779504", "Q189946", "Q156884", "Q8680", "Q7159",
    "Q40857", "Q131535", "Q7804", "Q193376", "Q129286", "Q47543", "Q975405", "Q1137381",
    "Q389867", "Q28222", "Q742023", "Q1191332", "Q9072", "Q37470", "Q178122", "Q15042",
    "Q25277", "Q487907", "Q45546", "Q28231",
];

const FAMOUS_TERRITORIES: &[&str] = &[
    "Q5765", "Q16641", "Q11703", "Q26988", "Q16644", "Q36823", "Q25228", "Q35555", "Q25230",
    "Q13353", "Q25305", "Q29999", "Q23681", "Q35672", "Q46197", "Q23635", "Q13218", "Q25279",
    "Q26273", "Q26180", "Q25396", "Q17012", "Q223", "Q17054", "Q30971", "Q17070", "Q3769",
    "Q126125", "Q17063", "Q25362", "Q17349", "Q34020", "Q34754", "Q35580", "Q18221",
    "Q36004", "Q3311985", "Q131198", "Q14773", "Q34366", "Q1246", "Q219", "Q23427", "Q31057",
    "Q2280", "Q3311", "Q3405", "Q9676",
];

pub fn historical() -> Vec<QuerySpec> {
    use Selector::*;
    vec![
        QuerySpec::new("Historical countries", InstanceOf(&["Q3024240"]), Some(500)),
        QuerySpec::new("Former countries", InstanceOf(&["Q1790360"]), Some(300)),
        QuerySpec::new("Dissolved sovereign states", DissolvedInstanceOf("Q3624078"), Some(300)),
        QuerySpec::new("Colonies", InstanceOf(&["Q133156"]), Some(300)),
        QuerySpec::new("Former administrative territories", InstanceOf(&["Q28171280"]), Some(300)),
        QuerySpec::new("Ancient civilisations and city-states", InstanceOf(&["Q839954"]), Some(200)),
        QuerySpec::new("Historical administrative divisions", InstanceOf(&["Q15642541"]), Some(300)),
        QuerySpec::new("Dissolved before 2000", DissolvedBefore(2000), Some(500)),
        QuerySpec::new("Client states", InstanceOf(&["Q1451600"]), Some(200)),
        QuerySpec::new("Mandates and protectorates", InstanceOf(&["Q205895", "Q164142"]), Some(200)),
        QuerySpec::new("Well-known historical states", Items(FAMOUS_HISTORICAL), None),
    ]
}

pub fn international() -> Vec<QuerySpec> {
    use Selector::*;
    vec![
        QuerySpec::new("International organisations", InstanceOf(&["Q484652"]), Some(400)),
        QuerySpec::new("Supranational organisations", InstanceOf(&["Q1335818"]), Some(200)),
        QuerySpec::new("Intergovernmental organisations", InstanceOf(&["Q245065"]), Some(200)),
        QuerySpec::new("Military alliances", InstanceOf(&["Q1127126"]), Some(100)),
        QuerySpec::new("Trade blocs", InstanceOf(&["Q7781198"]), Some(100)),
        QuerySpec::new(
            "Sports organisations",
            InstanceOf(&["Q270028", "Q1194970", "Q4438121"]),
            Some(200),
        ),
        QuerySpec::new("Well-known organisations", Items(FAMOUS_INTERNATIONAL), None),
    ]
}

pub fn territory() -> Vec<QuerySpec> {
    use Selector::*;
    vec![
        QuerySpec::new("Dependent territories", InstanceOf(&["Q161243"]), Some(300)),
        QuerySpec::new("Overseas territories", InstanceOf(&["Q783733"]), Some(200)),
        QuerySpec::new("Unincorporated territories", InstanceOf(&["Q1763527"]), Some(200)),
        QuerySpec::new("Crown dependencies", InstanceOf(&["Q185086"]), Some(50)),
        QuerySpec::new(
            "Autonomous territories",
            InstanceOf(&["Q1048835", "Q15916867", "Q1187015", "Q327333"]),
            Some(300),
        ),
        QuerySpec::new("Special administrative regions", InstanceOf(&["Q779415"]), Some(100)),
        QuerySpec::new("Disputed territories", InstanceOf(&["Q15239622", "Q13107770"]), Some(200)),
        QuerySpec::new(
            "British and French overseas territories",
            InstanceOf(&["Q46395", "Q719487", "Q202216"]),
            Some(200),
        ),
        QuerySpec::new("Well-known territories", Items(FAMOUS_TERRITORIES), None),
    ]
}
