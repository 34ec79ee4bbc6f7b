//! The HTTP front-end: one POST route per command, permissive CORS, and a
//! body-size cap. Handlers parse the body themselves so malformed JSON
//! surfaces as a `Status` response instead of a bare 4xx, and run the
//! dispatcher under `spawn_blocking` because the password KDF is
//! deliberately slow.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use custodia_core::constants::MAX_REQUEST_BYTES;
use custodia_core::CustodiaError;

use crate::request::{
    Command, CreateRequest, DecryptRequest, DelegateRequest, EncryptRequest, FlushRequest,
    ModifyRequest, PasswordRequest, Response, SummaryRequest,
};
use crate::service::Service;

pub fn router(service: Arc<Service>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/create", post(create))
        .route("/summary", post(summary))
        .route("/delegate", post(delegate))
        .route("/password", post(password))
        .route("/encrypt", post(encrypt))
        .route("/decrypt", post(decrypt))
        .route("/modify", post(modify))
        .route("/flush", post(flush))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(cors)
        .with_state(service)
}

/// Bind and serve until the process exits.
pub async fn serve(service: Arc<Service>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP front-end listening");
    axum::serve(listener, router(service)).await?;
    Ok(())
}

fn parse<T: DeserializeOwned>(body: &Bytes) -> Result<T, Json<Response>> {
    serde_json::from_slice(body).map_err(|e| {
        Json(Response::error(&CustodiaError::InvalidRequest(format!(
            "malformed JSON: {e}"
        ))))
    })
}

async fn dispatch(service: Arc<Service>, command: Command) -> Json<Response> {
    match tokio::task::spawn_blocking(move || service.handle(command)).await {
        Ok(response) => Json(response),
        Err(_) => Json(Response::error(&CustodiaError::Internal(
            "worker task failed".into(),
        ))),
    }
}

macro_rules! handler {
    ($name:ident, $request:ty, $variant:ident) => {
        async fn $name(
            State(service): State<Arc<Service>>,
            body: Bytes,
        ) -> Json<Response> {
            match parse::<$request>(&body) {
                Ok(req) => dispatch(service, Command::$variant(req)).await,
                Err(response) => response,
            }
        }
    };
}

handler!(create, CreateRequest, Create);
handler!(summary, SummaryRequest, Summary);
handler!(delegate, DelegateRequest, Delegate);
handler!(password, PasswordRequest, Password);
handler!(encrypt, EncryptRequest, Encrypt);
handler!(decrypt, DecryptRequest, Decrypt);
handler!(modify, ModifyRequest, Modify);
handler!(flush, FlushRequest, Flush);
