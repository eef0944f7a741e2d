use actix_web::{web, HttpResponse};
use flagatlas::pagination::{PageRequest, Paginator, PAGE_SIZE};
use flagatlas::store::{CountryFilter, FlagFilter};
use flagatlas::view::{self, CountryListQuery, GalleryQuery};
use flagatlas::{
    text, CountryFields, FlagAtlasError, FlagCategory, FlagFields, RegionFields, Store,
};
use serde::{Deserialize, Serialize};

use crate::render;
use crate::AppState;

/// Configure the public pages and the admin API
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(home))
        .route("/countries/", web::get().to(countries))
        .route("/country/{code}/", web::get().to(country_detail))
        .route("/flags/", web::get().to(flags))
        .route("/about/", web::get().to(about))
        .service(
            web::scope("/admin")
                .route("/", web::get().to(admin_status))
                // Regions
                .route("/regions", web::get().to(list_regions))
                .route("/regions", web::post().to(create_region))
                .route("/regions/{id}", web::get().to(get_region))
                .route("/regions/{id}", web::put().to(update_region))
                .route("/regions/{id}", web::delete().to(delete_region))
                // Countries
                .route("/countries", web::get().to(list_countries))
                .route("/countries", web::post().to(create_country))
                .route("/countries/{id}", web::get().to(get_country))
                .route("/countries/{id}", web::put().to(update_country))
                .route("/countries/{id}", web::delete().to(delete_country))
                // Flag collection
                .route("/flags", web::get().to(list_flags))
                .route("/flags", web::post().to(create_flag))
                .route("/flags/{id}", web::get().to(get_flag))
                .route("/flags/{id}", web::put().to(update_flag))
                .route("/flags/{id}", web::delete().to(delete_flag)),
        );
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Run `f` with the shared store locked.
fn with_store<T>(
    state: &AppState,
    f: impl FnOnce(&Store) -> flagatlas::Result<T>,
) -> flagatlas::Result<T> {
    let store = state
        .store
        .lock()
        .map_err(|_| FlagAtlasError::Other("store lock poisoned".into()))?;
    f(&store)
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

fn page_error(e: FlagAtlasError) -> HttpResponse {
    log::error!("Page error: {e}");
    HttpResponse::InternalServerError()
        .content_type("text/html; charset=utf-8")
        .body("<h1>Internal server error</h1>")
}

fn json_result<T: Serialize>(result: flagatlas::Result<T>) -> HttpResponse {
    match result {
        Ok(v) => HttpResponse::Ok().json(v),
        Err(e) => err_response(e),
    }
}

fn created_result<T: Serialize>(result: flagatlas::Result<T>) -> HttpResponse {
    match result {
        Ok(v) => HttpResponse::Created().json(v),
        Err(e) => err_response(e),
    }
}

fn deleted_result(result: flagatlas::Result<()>, id: i64) -> HttpResponse {
    match result {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "ok": true, "deleted": id })),
        Err(e) => err_response(e),
    }
}

fn err_response(e: FlagAtlasError) -> HttpResponse {
    match &e {
        FlagAtlasError::NotFound { .. } => HttpResponse::NotFound().json(serde_json::json!({
            "error": e.to_string()
        })),
        FlagAtlasError::Validation(_) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": e.to_string()
        })),
        FlagAtlasError::Conflict(_) => HttpResponse::Conflict().json(serde_json::json!({
            "error": e.to_string()
        })),
        _ => {
            log::error!("Internal error: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error"
            }))
        }
    }
}

// ── Pages ───────────────────────────────────────────────────────────

async fn home(state: web::Data<AppState>) -> HttpResponse {
    match with_store(&state, view::home) {
        Ok(ctx) => html(render::home(&ctx)),
        Err(e) => page_error(e),
    }
}

async fn countries(
    state: web::Data<AppState>,
    query: web::Query<CountryListQuery>,
) -> HttpResponse {
    match with_store(&state, |store| view::countries_list(store, &query)) {
        Ok(ctx) => html(render::countries(&ctx)),
        Err(e) => page_error(e),
    }
}

async fn country_detail(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let code = path.into_inner();
    match with_store(&state, |store| view::country_detail(store, &code)) {
        Ok(Some(ctx)) => html(render::country_detail(&ctx)),
        Ok(None) => HttpResponse::NotFound()
            .content_type("text/html; charset=utf-8")
            .body(render::country_not_found(&code)),
        Err(e) => page_error(e),
    }
}

async fn flags(state: web::Data<AppState>, query: web::Query<GalleryQuery>) -> HttpResponse {
    match with_store(&state, |store| view::flags_gallery(store, &query)) {
        Ok(ctx) => html(render::gallery(&ctx)),
        Err(e) => page_error(e),
    }
}

async fn about() -> HttpResponse {
    html(render::about(&view::about()))
}

// ── Admin ───────────────────────────────────────────────────────────

/// Query string shared by the admin list endpoints.
#[derive(Debug, Default, Deserialize)]
struct AdminListQuery {
    q: Option<String>,
    /// Region id or slug (countries).
    region: Option<String>,
    /// Flag category (flags).
    category: Option<String>,
    page: Option<String>,
}

impl AdminListQuery {
    fn search(&self) -> Option<String> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()).map(String::from)
    }
}

#[derive(Debug, Serialize)]
struct Listing<T> {
    items: Vec<T>,
    total: usize,
    page: flagatlas::pagination::Page,
}

async fn admin_status(state: web::Data<AppState>) -> HttpResponse {
    json_result(with_store(&state, |store| store.stats()))
}

// Regions

async fn list_regions(
    state: web::Data<AppState>,
    query: web::Query<AdminListQuery>,
) -> HttpResponse {
    let search = query.search();
    json_result(with_store(&state, |store| {
        let mut regions = store.list_regions()?;
        if let Some(q) = &search {
            regions.retain(|r| text::fold_contains(&r.name, q) || text::fold_contains(&r.slug, q));
        }
        Ok(regions)
    }))
}

async fn get_region(state: web::Data<AppState>, path: web::Path<i64>) -> HttpResponse {
    let id = path.into_inner();
    json_result(with_store(&state, |store| {
        store
            .get_region(id)?
            .ok_or_else(|| FlagAtlasError::not_found("Region", id))
    }))
}

async fn create_region(
    state: web::Data<AppState>,
    body: web::Json<RegionFields>,
) -> HttpResponse {
    created_result(with_store(&state, |store| store.insert_region(body.into_inner())))
}

async fn update_region(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<RegionFields>,
) -> HttpResponse {
    let id = path.into_inner();
    json_result(with_store(&state, |store| store.update_region(id, body.into_inner())))
}

async fn delete_region(state: web::Data<AppState>, path: web::Path<i64>) -> HttpResponse {
    let id = path.into_inner();
    deleted_result(with_store(&state, |store| store.delete_region(id)), id)
}

// Countries

async fn list_countries(
    state: web::Data<AppState>,
    query: web::Query<AdminListQuery>,
) -> HttpResponse {
    json_result(with_store(&state, |store| {
        let region_id = match query.region.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            None => None,
            Some(raw) => match raw.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => Some(
                    store
                        .region_by_slug(raw)?
                        .ok_or_else(|| FlagAtlasError::Validation(format!("Unknown region '{raw}'")))?
                        .id,
                ),
            },
        };
        let filter = CountryFilter {
            search: query.search(),
            region_id,
            codes: true,
        };
        let total = store.count_countries(&filter)?;
        let page = Paginator::new(total, PAGE_SIZE).page(PageRequest::parse(query.page.as_deref()));
        let items = store.search_countries(&filter, page.limit(), page.offset)?;
        Ok(Listing { items, total, page })
    }))
}

async fn get_country(state: web::Data<AppState>, path: web::Path<i64>) -> HttpResponse {
    let id = path.into_inner();
    json_result(with_store(&state, |store| {
        store
            .get_country(id)?
            .ok_or_else(|| FlagAtlasError::not_found("Country", id))
    }))
}

async fn create_country(
    state: web::Data<AppState>,
    body: web::Json<CountryFields>,
) -> HttpResponse {
    created_result(with_store(&state, |store| store.insert_country(&body)))
}

async fn update_country(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<CountryFields>,
) -> HttpResponse {
    let id = path.into_inner();
    json_result(with_store(&state, |store| store.update_country(id, &body)))
}

async fn delete_country(state: web::Data<AppState>, path: web::Path<i64>) -> HttpResponse {
    let id = path.into_inner();
    deleted_result(with_store(&state, |store| store.delete_country(id)), id)
}

// Flag collection

async fn list_flags(
    state: web::Data<AppState>,
    query: web::Query<AdminListQuery>,
) -> HttpResponse {
    json_result(with_store(&state, |store| {
        let category = match query.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(raw) => Some(raw.parse::<FlagCategory>()?),
            None => None,
        };
        let filter = FlagFilter {
            search: query.search(),
            category,
            country_id: None,
        };
        let total = store.count_flags(&filter)?;
        let page = Paginator::new(total, PAGE_SIZE).page(PageRequest::parse(query.page.as_deref()));
        let items = store.search_flags(&filter, page.limit(), page.offset)?;
        Ok(Listing { items, total, page })
    }))
}

async fn get_flag(state: web::Data<AppState>, path: web::Path<i64>) -> HttpResponse {
    let id = path.into_inner();
    json_result(with_store(&state, |store| {
        store
            .get_flag(id)?
            .ok_or_else(|| FlagAtlasError::not_found("Flag", id))
    }))
}

async fn create_flag(state: web::Data<AppState>, body: web::Json<FlagFields>) -> HttpResponse {
    created_result(with_store(&state, |store| store.insert_flag(&body)))
}

async fn update_flag(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<FlagFields>,
) -> HttpResponse {
    let id = path.into_inner();
    json_result(with_store(&state, |store| store.update_flag(id, &body)))
}

async fn delete_flag(state: web::Data<AppState>, path: web::Path<i64>) -> HttpResponse {
    let id = path.into_inner();
    deleted_result(with_store(&state, |store| store.delete_flag(id)), id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use std::sync::Mutex;

    fn state() -> web::Data<AppState> {
        let store = Store::open_in_memory().unwrap();
        let europe = store.ensure_region("Europe", "").unwrap();
        store
            .upsert_country(&CountryFields {
                region_id: Some(europe.id),
                capital: "Bratislava".into(),
                borders: vec!["AUT".into()],
                ..CountryFields::new("Slovakia", "SK", "SVK")
            })
            .unwrap();
        store
            .upsert_country(&CountryFields {
                region_id: Some(europe.id),
                ..CountryFields::new("Austria", "AT", "AUT")
            })
            .unwrap();
        store
            .upsert_country(&CountryFields::new("Curaçao", "CW", "CUW"))
            .unwrap();
        store
            .insert_flag(&FlagFields {
                wikidata_id: Some("Q25113".into()),
                ..FlagFields::new("Žilina Region", FlagCategory::Region, "https://img/zilina.png")
            })
            .unwrap();
        store
            .insert_flag(&FlagFields {
                description: "Black eagle of the Hohenzollern".into(),
                ..FlagFields::new("Kingdom of Prussia", FlagCategory::Historical, "https://img/prussia.png")
            })
            .unwrap();
        web::Data::new(AppState {
            store: Mutex::new(store),
        })
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state.clone()).configure(configure)).await
        };
    }

    async fn body_text(resp: actix_web::dev::ServiceResponse) -> String {
        let bytes = test::read_body(resp).await;
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[actix_web::test]
    async fn test_home_page() {
        let state = state();
        let app = app!(state);
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_text(resp).await;
        assert!(body.contains("3 countries, 5 flags, 1 regions"));
        assert!(body.contains("/countries/?region=europe"));
    }

    #[actix_web::test]
    async fn test_countries_accent_insensitive_search() {
        let state = state();
        let app = app!(state);
        let req = test::TestRequest::get().uri("/countries/?q=curacao").to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains("Curaçao"));
        assert!(!body.contains("Slovakia"));

        let req = test::TestRequest::get().uri("/countries/?search=atlantis").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("No countries found."));
    }

    #[actix_web::test]
    async fn test_country_detail_and_missing_country() {
        let state = state();
        let app = app!(state);
        let req = test::TestRequest::get().uri("/country/svk/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_text(resp).await;
        assert!(body.contains("Bratislava"));
        assert!(body.contains("/country/AUT/"));

        let req = test::TestRequest::get().uri("/country/XYZ/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(body_text(resp).await.contains("Country not found"));
    }

    #[actix_web::test]
    async fn test_flags_gallery_filters() {
        let state = state();
        let app = app!(state);
        let req = test::TestRequest::get().uri("/flags/?category=historical").to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains("Kingdom of Prussia"));
        assert!(body.contains("href=\"https://img/prussia.png\""));
        assert!(!body.contains("Slovakia</a></li>"));

        let req = test::TestRequest::get().uri("/flags/?q=zilina").to_request();
        let body = body_text(test::call_service(&app, req).await).await;
        assert!(body.contains("Žilina Region"));
        assert!(!body.contains("Kingdom of Prussia"));
    }

    #[actix_web::test]
    async fn test_admin_status() {
        let state = state();
        let app = app!(state);
        let req = test::TestRequest::get().uri("/admin/").to_request();
        let stats: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats, serde_json::json!({ "regions": 1, "countries": 3, "flags": 2 }));
    }

    #[actix_web::test]
    async fn test_admin_region_crud() {
        let state = state();
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/admin/regions")
            .set_json(serde_json::json!({ "name": "Oceania" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(created["slug"], "oceania");
        let id = created["id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri("/admin/regions")
            .set_json(serde_json::json!({ "name": "Oceania" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::post()
            .uri("/admin/regions")
            .set_json(serde_json::json!({ "name": "  " }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::put()
            .uri(&format!("/admin/regions/{id}"))
            .set_json(serde_json::json!({ "name": "Oceania", "description": "Islands" }))
            .to_request();
        let updated: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["description"], "Islands");

        let req = test::TestRequest::get().uri("/admin/regions?q=ocean").to_request();
        let listed: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let req = test::TestRequest::delete()
            .uri(&format!("/admin/regions/{id}"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri(&format!("/admin/regions/{id}"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_admin_countries_filters_and_validation() {
        let state = state();
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/admin/countries?region=europe&q=slov")
            .to_request();
        let listed: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed["total"], 1);
        assert_eq!(listed["items"][0]["cca3"], "SVK");

        let req = test::TestRequest::get().uri("/admin/countries?q=svk").to_request();
        let listed: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed["total"], 1);
        assert_eq!(listed["items"][0]["cca3"], "SVK");

        let req = test::TestRequest::post()
            .uri("/admin/countries")
            .set_json(serde_json::json!({ "name_common": "Nowhere", "cca2": "NW", "cca3": "NOWH" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/admin/countries")
            .set_json(serde_json::json!({ "name_common": "Slovakia again", "cca2": "SK", "cca3": "SVQ" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::delete().uri("/admin/countries/9999").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_admin_flags_category_filter() {
        let state = state();
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/admin/flags?category=historical")
            .to_request();
        let listed: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed["total"], 1);
        assert_eq!(listed["items"][0]["name"], "Kingdom of Prussia");

        let req = test::TestRequest::get().uri("/admin/flags?q=hohenzollern").to_request();
        let listed: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed["total"], 1);
        assert_eq!(listed["items"][0]["name"], "Kingdom of Prussia");

        let req = test::TestRequest::get().uri("/admin/flags?category=planet").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/admin/flags")
            .set_json(serde_json::json!({
                "name": "Flag of Bratislava",
                "category": "city",
                "flag_image": "https://img/ba.png"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(created["category"], "city");
    }
}
