//! HTML for the public pages, written straight from the view contexts.

use flagatlas::pagination::Page;
use flagatlas::view::{
    AboutContext, CountryDetailContext, CountryListContext, GalleryContext, HomeContext,
};
use flagatlas::model::{Country, FlagCard, FlagCardSource};
use std::fmt::Write;

/// Escape text for HTML element content and quoted attributes.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Build `path?k=v&…`, skipping empty values.
pub fn href(path: &str, params: &[(&str, &str)]) -> String {
    let query: Vec<String> = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect();
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{}", query.join("&"))
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title} | FlagAtlas</title>\n</head>\n<body>\n\
         <nav><a href=\"/\">FlagAtlas</a> <a href=\"/countries/\">Countries</a> \
         <a href=\"/flags/\">Flags</a> <a href=\"/about/\">About</a></nav>\n\
         <main>\n{body}</main>\n</body>\n</html>\n",
        title = escape(title),
    )
}

/// Link to the full-size image, opened without any client script.
fn full_size(out: &mut String, url: &str) {
    if !url.is_empty() {
        let _ = write!(
            out,
            " <a class=\"full-size\" href=\"{}\" target=\"_blank\" rel=\"noopener\">Full size</a>",
            escape(url)
        );
    }
}

/// Flag image wrapped in a link to its full-size version.
fn linked_image(url: &str, name: &str) -> String {
    let url = escape(url);
    format!(
        "<a class=\"full-size\" href=\"{url}\" target=\"_blank\" rel=\"noopener\">\
         <img src=\"{url}\" alt=\"Flag of {name}\" loading=\"lazy\"></a>"
    )
}

fn country_card(out: &mut String, country: &Country) {
    let _ = write!(
        out,
        "<li class=\"country\"><a href=\"/country/{code}/\"><img src=\"{img}\" alt=\"Flag of {name}\" loading=\"lazy\"> {name}</a>",
        code = escape(&country.cca3),
        img = escape(&country.flag_png),
        name = escape(&country.name_common),
    );
    let image = if country.flag_svg.is_empty() { &country.flag_png } else { &country.flag_svg };
    full_size(out, image);
    out.push_str("</li>\n");
}

fn flag_card(out: &mut String, card: &FlagCard) {
    let name = escape(&card.name);
    match &card.source {
        FlagCardSource::Country { cca3 } => {
            let _ = write!(
                out,
                "<li class=\"flag country\"><a href=\"/country/{}/\"><img src=\"{}\" alt=\"Flag of {name}\" loading=\"lazy\"> {name}</a>",
                escape(cca3),
                escape(&card.image)
            );
            full_size(out, &card.image);
            out.push_str("</li>\n");
        }
        FlagCardSource::Collection { category, .. } => {
            let _ = writeln!(
                out,
                "<li class=\"flag {}\">{} {name} <small>{}</small></li>",
                category.as_str(),
                linked_image(&card.image, &name),
                escape(category.label())
            );
        }
    }
}

/// Previous/next links for a page, keeping the other query parameters.
fn pagination(out: &mut String, path: &str, page: &Page, params: &[(&str, &str)]) {
    if page.num_pages <= 1 {
        return;
    }
    let link = |number: usize| {
        let n = number.to_string();
        let mut all: Vec<(&str, &str)> = params.to_vec();
        all.push(("page", n.as_str()));
        href(path, &all)
    };
    out.push_str("<nav class=\"pagination\">");
    if let Some(prev) = page.previous {
        let _ = write!(out, "<a href=\"{}\">Previous</a> ", escape(&link(prev)));
    }
    let _ = write!(out, "<span>Page {} of {}</span>", page.number, page.num_pages);
    if let Some(next) = page.next {
        let _ = write!(out, " <a href=\"{}\">Next</a>", escape(&link(next)));
    }
    out.push_str("</nav>\n");
}

pub fn home(ctx: &HomeContext) -> String {
    let mut body = String::new();
    let _ = writeln!(
        body,
        "<h1>Flags of the World</h1>\n<p class=\"stats\">{} countries, {} flags, {} regions</p>",
        ctx.total_countries, ctx.total_flags, ctx.total_regions
    );
    body.push_str("<h2>Featured</h2>\n<ul class=\"featured\">\n");
    for country in &ctx.featured_countries {
        country_card(&mut body, country);
    }
    body.push_str("</ul>\n<h2>Regions</h2>\n<ul class=\"regions\">\n");
    for entry in &ctx.regions {
        let _ = writeln!(
            body,
            "<li><a href=\"{}\">{}</a> ({})</li>",
            escape(&href("/countries/", &[("region", entry.region.slug.as_str())])),
            escape(&entry.region.name),
            entry.country_count
        );
    }
    body.push_str("</ul>\n");
    layout("Home", &body)
}

pub fn countries(ctx: &CountryListContext) -> String {
    let region = ctx.selected_region.as_deref().unwrap_or("");
    let mut body = String::from("<h1>Countries</h1>\n");
    let _ = write!(
        body,
        "<form method=\"get\" action=\"/countries/\">\
         <input type=\"search\" name=\"search\" value=\"{}\" placeholder=\"Search countries\">\
         <select name=\"region\"><option value=\"\">All regions</option>",
        escape(&ctx.search)
    );
    for r in &ctx.regions {
        let selected = if r.slug == region { " selected" } else { "" };
        let _ = write!(
            body,
            "<option value=\"{}\"{selected}>{}</option>",
            escape(&r.slug),
            escape(&r.name)
        );
    }
    body.push_str("</select><button type=\"submit\">Search</button></form>\n");

    if ctx.countries.is_empty() {
        body.push_str("<p class=\"empty\">No countries found.</p>\n");
    } else {
        let _ = writeln!(
            body,
            "<p>Showing {}-{} of {}</p>\n<ul class=\"countries\">",
            ctx.page.start_index, ctx.page.end_index, ctx.total
        );
        for country in &ctx.countries {
            country_card(&mut body, country);
        }
        body.push_str("</ul>\n");
    }
    pagination(
        &mut body,
        "/countries/",
        &ctx.page,
        &[("search", ctx.search.as_str()), ("region", region)],
    );
    layout("Countries", &body)
}

pub fn country_detail(ctx: &CountryDetailContext) -> String {
    let c = &ctx.country;
    let mut body = String::new();
    let _ = writeln!(
        body,
        "<h1>{} {}</h1>\n<p class=\"official\">{}</p>\n{}",
        escape(&c.flag_emoji),
        escape(&c.name_common),
        escape(&c.name_official),
        linked_image(
            if c.flag_svg.is_empty() { &c.flag_png } else { &c.flag_svg },
            &escape(&c.name_common)
        ),
    );

    body.push_str("<dl>\n");
    let mut row = |label: &str, value: &str| {
        let _ = writeln!(body, "<dt>{label}</dt><dd>{}</dd>", escape(value));
    };
    row("Codes", &format!("{} / {}", c.cca2, c.cca3));
    row("Capital", if c.capital.is_empty() { "N/A" } else { &c.capital });
    if let Some(region) = &ctx.region {
        row("Region", &region.name);
    }
    if !c.subregion.is_empty() {
        row("Subregion", &c.subregion);
    }
    row("Population", &c.population.to_string());
    if let Some(area) = c.area {
        row("Area", &format!("{area} km²"));
    }
    row("Currencies", &c.currencies_display());
    row("Languages", &c.languages_display());
    row("Independent", if c.independent { "Yes" } else { "No" });
    row("UN member", if c.un_member { "Yes" } else { "No" });
    body.push_str("</dl>\n");

    if !ctx.neighbors.is_empty() {
        body.push_str("<h2>Neighbours</h2>\n<ul class=\"neighbors\">\n");
        for n in &ctx.neighbors {
            country_card(&mut body, n);
        }
        body.push_str("</ul>\n");
    }
    if !ctx.additional_flags.is_empty() {
        body.push_str("<h2>Regional flags</h2>\n<ul class=\"flags\">\n");
        for flag in &ctx.additional_flags {
            let _ = writeln!(
                body,
                "<li>{} {} <small>{}</small></li>",
                linked_image(&flag.flag_image, &escape(&flag.name)),
                escape(&flag.name),
                escape(flag.category.label()),
            );
        }
        body.push_str("</ul>\n");
    }
    layout(&c.name_common, &body)
}

pub fn country_not_found(code: &str) -> String {
    let body = format!(
        "<h1>Country not found</h1>\n<p class=\"empty\">No country with code {}.</p>\n\
         <p><a href=\"/countries/\">Back to all countries</a></p>\n",
        escape(code)
    );
    layout("Country not found", &body)
}

pub fn gallery(ctx: &GalleryContext) -> String {
    let mut body = String::from("<h1>Flags</h1>\n<ul class=\"tabs\">\n");
    for tab in &ctx.categories {
        let class = if tab.key == ctx.selected_category { " class=\"active\"" } else { "" };
        let _ = writeln!(
            body,
            "<li{class}><a href=\"{}\">{} ({})</a></li>",
            escape(&href("/flags/", &[("category", tab.key.as_str()), ("q", ctx.search.as_str())])),
            escape(&tab.label),
            tab.count
        );
    }
    let _ = writeln!(
        body,
        "</ul>\n<form method=\"get\" action=\"/flags/\">\
         <input type=\"hidden\" name=\"category\" value=\"{}\">\
         <input type=\"search\" name=\"q\" value=\"{}\" placeholder=\"Search flags\">\
         <button type=\"submit\">Search</button></form>",
        escape(&ctx.selected_category),
        escape(&ctx.search)
    );

    if ctx.flags.is_empty() {
        body.push_str("<p class=\"empty\">No flags found.</p>\n");
    } else {
        body.push_str("<ul class=\"gallery\">\n");
        for card in &ctx.flags {
            flag_card(&mut body, card);
        }
        body.push_str("</ul>\n");
    }
    pagination(
        &mut body,
        "/flags/",
        &ctx.page,
        &[("category", ctx.selected_category.as_str()), ("q", ctx.search.as_str())],
    );
    layout("Flags", &body)
}

pub fn about(ctx: &AboutContext) -> String {
    let mut body = format!(
        "<h1>{}</h1>\n<p>{}</p>\n<h2>Data sources</h2>\n<ul>\n",
        escape(ctx.title),
        escape(ctx.summary)
    );
    for source in &ctx.sources {
        let _ = writeln!(
            body,
            "<li><a href=\"{}\">{}</a>: {}</li>",
            escape(source.url),
            escape(source.name),
            escape(source.description)
        );
    }
    body.push_str("</ul>\n");
    layout(ctx.title, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<a href="x">Trinidad & Tobago</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Trinidad &amp; Tobago&lt;/a&gt;"
        );
        assert_eq!(escape("Côte d'Ivoire"), "Côte d&#x27;Ivoire");
    }

    #[test]
    fn test_href_skips_empty_and_encodes() {
        assert_eq!(href("/flags/", &[("category", ""), ("q", "")]), "/flags/");
        assert_eq!(
            href("/countries/", &[("search", "são tomé"), ("region", "africa")]),
            "/countries/?search=s%C3%A3o%20tom%C3%A9&region=africa"
        );
    }

    #[test]
    fn test_about_page() {
        let html = about(&flagatlas::view::about());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>About FlagAtlas | FlagAtlas</title>"));
        assert!(html.contains("https://flagcdn.com/"));
    }
}
