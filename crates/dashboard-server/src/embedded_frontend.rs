use axum::{
    body::Body,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use rust_embed::Embed;

use crate::AppState;

#[derive(Embed)]
#[folder = "../../frontend/"]
#[exclude = "*.md"]
pub struct FrontendAssets;

pub fn frontend_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .fallback(static_asset)
}

async fn index() -> Response {
    serve("index.html")
}

async fn static_asset(uri: Uri) -> Response {
    serve(uri.path().trim_start_matches('/'))
}

fn serve(path: &str) -> Response {
    match FrontendAssets::get(path) {
        Some(file) => (
            [(header::CONTENT_TYPE, file.metadata.mimetype().to_string())],
            Body::from(file.data.into_owned()),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}
