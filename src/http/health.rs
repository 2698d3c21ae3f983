use crate::api_error::ApiError;
use crate::http::lobby_handler::AppState;
use crate::service::Matchmaker;
use actix_web::{web, HttpResponse, Result};

pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    // A read proves the store is reachable
    state.observer.registry().snapshot().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "store": format!("{:?}", state.store.kind()).to_lowercase(),
        "policy": state.observer.matchmaking().policy(),
        "sessions": state.session_count().await,
        "subscribers": state.bus.subscriber_count(),
    })))
}
