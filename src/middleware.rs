use actix_cors::Cors;
use actix_web::http::header;

/// The presentation layer is served from anywhere; every route is JSON
/// over GET or POST.
pub fn cors_middleware() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
        .max_age(3600)
}
