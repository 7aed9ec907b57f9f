//! The coordinator HTTP surface.
//!
//! `POST /v2/request_transaction` — request approval for (or soft-cancel
//! via) a signed 0x transaction.
//! `POST /v2/soft_cancels` — look up which of the given order hashes are
//! soft-cancelled.
//!
//! The serving chain is selected with the `0x-chain-id` header; with exactly
//! one configured chain the header may be omitted.

mod error;

use core::{convert::Infallible, future::Future};
use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context as _, Result as AnyResult};
use hyper::{
    body::Buf as _,
    header,
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server,
};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, Histogram, IntCounterVec,
};
use serde::de::DeserializeOwned;
use serde_json::{self, Value as JsonValue};
use tracing::info;

pub use self::error::Error;
use crate::App;

const CONTENT_JSON: &str = "application/json";
const CHAIN_ID_HEADER: &str = "0x-chain-id";

static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("api_requests", "Number of API requests by path.", &["path"])
        .unwrap()
});
static STATUS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "api_response_status",
        "The API responses by status code.",
        &["status_code"]
    )
    .unwrap()
});
static LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!("api_latency_seconds", "The API latency in seconds.").unwrap()
});

/// Parse a [`Request<Body>`] as JSON using Serde and handle using the provided
/// method.
async fn json_middleware<F, T, S>(request: Request<Body>, mut next: F) -> Result<JsonValue, Error>
where
    T: DeserializeOwned + Send,
    F: FnMut(T) -> S + Send,
    S: Future<Output = Result<JsonValue, Error>> + Send,
{
    if request.method() != Method::POST {
        return Err(Error::InvalidMethod);
    }
    let valid_content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .map_or(false, |content_type| content_type == CONTENT_JSON);
    if !valid_content_type {
        return Err(Error::InvalidContentType);
    }
    let body = hyper::body::aggregate(request).await?;
    let value = serde_json::from_reader(body.reader())?;
    next(value).await
}

/// The chain a request addresses: the `0x-chain-id` header, or the sole
/// configured chain when the header is absent.
fn chain_id(app: &App, request: &Request<Body>) -> Result<u64, Error> {
    match request.headers().get(CHAIN_ID_HEADER) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|str| str.parse().ok())
            .ok_or(Error::MissingChainId),
        None => app.sole_chain_id().ok_or(Error::MissingChainId),
    }
}

/// Route requests based on path
async fn route(app: Arc<App>, request: Request<Body>) -> Result<Response<Body>, Infallible> {
    let _timer = LATENCY.start_timer(); // Observes on drop

    let response = match request.uri().path() {
        "/v2/request_transaction" => {
            REQUESTS.with_label_values(&["request_transaction"]).inc();
            match chain_id(&app, &request) {
                Ok(chain_id) => {
                    json_middleware(request, |body| app.request_transaction(chain_id, body))
                        .await
                }
                Err(error) => Err(error),
            }
        }
        "/v2/soft_cancels" => {
            REQUESTS.with_label_values(&["soft_cancels"]).inc();
            match chain_id(&app, &request) {
                Ok(chain_id) => {
                    json_middleware(request, |body| app.soft_cancels(chain_id, body)).await
                }
                Err(error) => Err(error),
            }
        }
        _ => Err(Error::NotFound),
    }
    .map_or_else(Error::into_response, |value| {
        error::json_response(&value)
    });

    STATUS
        .with_label_values(&[response.status().as_str()])
        .inc();
    Ok(response)
}

/// Run a http server on [`socket_address`]
pub(super) async fn serve(app: App, socket_address: &SocketAddr) -> AnyResult<()> {
    // Wrap app in an Arc to make cloning cheaper
    let app = Arc::new(app);

    let service = make_service_fn(move |_connection| {
        let app = app.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |request| {
                let app = app.clone();
                route(app, request)
            }))
        }
    });

    let listener = Server::try_bind(socket_address)
        .with_context(|| format!("error binding {} for the coordinator API", socket_address))?;

    let server = listener.serve(service);
    info!("Listening on http://{}", socket_address);

    server
        .await
        .context("internal server error in the coordinator API")?;

    Ok(())
}
