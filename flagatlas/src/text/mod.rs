// Text helpers: folding for search, slugs, and the small string transforms
// the ingestion commands apply to Wikidata values.

/// Fold a string into its matching key: transliterate to ASCII, then lowercase.
///
/// ```
/// use flagatlas::text::fold_key;
///
/// assert_eq!(fold_key("Žilina"), "zilina");
/// assert_eq!(fold_key("Łódź"), "lodz");
/// ```
pub fn fold_key(s: &str) -> String {
    deunicode::deunicode(s).to_lowercase()
}

/// Accent-insensitive, case-insensitive substring match.
pub fn fold_contains(haystack: &str, needle: &str) -> bool {
    fold_key(haystack).contains(&fold_key(needle))
}

/// Slugify a string for use as a region slug.
pub fn slugify(input: &str) -> String {
    slug::slugify(input)
}

/// True for labels Wikidata returns when an entity has no English label,
/// e.g. `Q12345`.
pub fn is_qid_label(name: &str) -> bool {
    match name.strip_prefix('Q') {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Extract the QID from an entity URI (`http://www.wikidata.org/entity/Q183` -> `Q183`).
pub fn qid_from_uri(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or("")
}

/// Build the regional-indicator emoji for an ISO alpha-2 code.
/// Returns an empty string for anything that is not two ASCII letters.
pub fn iso2_to_emoji(iso2: &str) -> String {
    if iso2.len() != 2 || !iso2.chars().all(|c| c.is_ascii_alphabetic()) {
        return String::new();
    }
    iso2.to_ascii_uppercase()
        .bytes()
        .filter_map(|b| char::from_u32(0x1F1E6 + u32::from(b - b'A')))
        .collect()
}

/// Wikimedia Commons thumbnail URL for a file URL, at the given width.
pub fn commons_thumb(file_url: &str, width: u32) -> String {
    if file_url.is_empty() {
        return String::new();
    }
    let filename = file_url.rsplit('/').next().unwrap_or(file_url);
    format!("https://commons.wikimedia.org/wiki/Special:FilePath/{filename}?width={width}")
}

pub fn flagcdn_svg(iso2: &str) -> String {
    format!("https://flagcdn.com/{}.svg", iso2.to_ascii_lowercase())
}

pub fn flagcdn_png(iso2: &str) -> String {
    format!("https://flagcdn.com/w320/{}.png", iso2.to_ascii_lowercase())
}

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
