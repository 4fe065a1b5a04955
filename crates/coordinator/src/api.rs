//! Warp plumbing shared by all endpoints: reply helpers, error conversion,
//! request metrics and router assembly.

mod event_feed;
mod request_transaction;
mod soft_cancels;

use crate::engine::{Coordinator, RequestError};
use crate::events::EventBus;
use serde::Serialize;
use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};
use warp::{
    filters::BoxedFilter,
    hyper::StatusCode,
    reply::{json, with_status, Json, WithStatus},
    Filter, Rejection, Reply,
};

pub type ApiReply = WithStatus<Json>;

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "api")]
struct ApiMetrics {
    /// Number of completed API requests.
    #[metric(labels("method", "status_code"))]
    requests_complete: prometheus::IntCounterVec,

    /// Number of rejected API requests.
    #[metric(labels("status_code"))]
    requests_rejected: prometheus::IntCounterVec,

    /// Execution time for each API request.
    #[metric(labels("method"))]
    requests_duration_seconds: prometheus::HistogramVec,
}

impl ApiMetrics {
    fn get() -> &'static Self {
        Self::instance(observe::metrics::get_storage_registry()).unwrap()
    }

    fn on_request_completed(&self, method: &str, status: StatusCode, timer: Instant) {
        self.requests_complete
            .with_label_values(&[method, status.as_str()])
            .inc();
        self.requests_duration_seconds
            .with_label_values(&[method])
            .observe(timer.elapsed().as_secs_f64());
    }
}

/// Error bodies are a list of `{code, field, reason, entities?}` entries.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Error<'a> {
    code: &'a str,
    field: &'a str,
    reason: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    entities: Option<serde_json::Value>,
}

pub fn error(code: &str, field: &str, reason: impl AsRef<str>) -> Json {
    json(&[Error {
        code,
        field,
        reason: reason.as_ref(),
        entities: None,
    }])
}

pub fn rich_error(
    code: &str,
    field: &str,
    reason: impl AsRef<str>,
    entities: impl Serialize,
) -> Json {
    let entities = match serde_json::to_value(&entities) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(?err, "failed to serialize error entities");
            None
        }
    };
    json(&[Error {
        code,
        field,
        reason: reason.as_ref(),
        entities,
    }])
}

pub fn internal_error_reply() -> ApiReply {
    with_status(
        error("InternalServerError", "", ""),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

pub fn convert_json_response<T, E>(result: Result<T, E>) -> ApiReply
where
    T: Serialize,
    E: IntoWarpReply + std::fmt::Debug,
{
    match result {
        Ok(response) => with_status(json(&response), StatusCode::OK),
        Err(err) => err.into_warp_reply(),
    }
}

pub trait IntoWarpReply {
    fn into_warp_reply(self) -> ApiReply;
}

impl IntoWarpReply for RequestError {
    fn into_warp_reply(self) -> ApiReply {
        let reason = self.to_string();
        match self {
            RequestError::UnknownChain(chain_id) => with_status(
                error("UnknownChainId", "chainId", format!("chain id {chain_id} is not served")),
                StatusCode::NOT_FOUND,
            ),
            RequestError::InvalidTransactionSignature => with_status(
                error(
                    "InvalidTransactionSignature",
                    "signedTransaction.signature",
                    reason,
                ),
                StatusCode::BAD_REQUEST,
            ),
            RequestError::DecodingFailed(_) => with_status(
                error(
                    "ZeroExTransactionDecodingFailed",
                    "signedTransaction.data",
                    reason,
                ),
                StatusCode::BAD_REQUEST,
            ),
            RequestError::InvalidFunctionCall(_) => with_status(
                error("InvalidFunctionCall", "signedTransaction.data", reason),
                StatusCode::BAD_REQUEST,
            ),
            RequestError::NoCoordinatorOrdersIncluded => with_status(
                error(
                    "NoCoordinatorOrdersIncluded",
                    "signedTransaction.data",
                    reason,
                ),
                StatusCode::BAD_REQUEST,
            ),
            RequestError::TransactionAlreadyUsed(hash) => with_status(
                rich_error(
                    "TransactionAlreadyUsed",
                    "signedTransaction",
                    reason,
                    [hash],
                ),
                StatusCode::BAD_REQUEST,
            ),
            RequestError::OnlyMakerCanCancelOrders => with_status(
                error(
                    "OnlyMakerCanCancelOrders",
                    "signedTransaction.signerAddress",
                    reason,
                ),
                StatusCode::BAD_REQUEST,
            ),
            RequestError::TransactionExpirationTooHigh { .. } => with_status(
                error(
                    "TransactionExpirationTooHigh",
                    "signedTransaction.expirationTimeSeconds",
                    reason,
                ),
                StatusCode::BAD_REQUEST,
            ),
            RequestError::Internal(err) => {
                tracing::error!(?err, "internal error");
                internal_error_reply()
            }
        }
    }
}

const MAX_JSON_BODY_PAYLOAD: u64 = 1024 * 1024;

pub fn extract_payload<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    // (rejecting huge payloads)...
    warp::body::content_length_limit(MAX_JSON_BODY_PAYLOAD).and(warp::body::json())
}

/// Serde rejections realize the request-schema validation: an unparsable body
/// is a 400, everything else keeps its warp classification.
async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, error("NotFound", "", "no such endpoint"))
    } else if let Some(err) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (
            StatusCode::BAD_REQUEST,
            error("ValidationError", "", err.to_string()),
        )
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            error("PayloadTooLarge", "", "request body too large"),
        )
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            error("MethodNotAllowed", "", "method not allowed"),
        )
    } else {
        tracing::warn!(?rejection, "unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            error("InternalServerError", "", ""),
        )
    };

    ApiMetrics::get()
        .requests_rejected
        .with_label_values(&[status.as_str()])
        .inc();

    Ok(with_status(body, status))
}

/// Combines the JSON endpoints with per-request metrics, a tracing span and
/// the rejection handler, then attaches the WebSocket event feed.
pub fn handle_all_routes(
    coordinator: Arc<Coordinator>,
    events: EventBus,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let routes = vec![
        (
            "request_transaction",
            request_transaction::filter(coordinator.clone()).boxed(),
        ),
        ("soft_cancels", soft_cancels::filter(coordinator).boxed()),
    ];
    event_feed::filter(events).or(finalize_router(routes))
}

fn finalize_router(
    routes: Vec<(&'static str, BoxedFilter<(ApiReply,)>)>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let metrics = ApiMetrics::get();

    let router = routes
        .into_iter()
        .fold(
            Option::<BoxedFilter<(&'static str, ApiReply)>>::None,
            |router, (method, route)| {
                let route = route.map(move |result| (method, result)).untuple_one();
                let next = match router {
                    Some(router) => router.or(route).unify().boxed(),
                    None => route.boxed(),
                };
                Some(next)
            },
        )
        .expect("routes cannot be empty");

    let instrumented =
        warp::any()
            .map(Instant::now)
            .and(router)
            .map(|timer, method, reply: ApiReply| {
                let response = reply.into_response();
                metrics.on_request_completed(method, response.status(), timer);
                response
            });

    // Give each request a unique tracing span so log statements of concurrent
    // requests can be told apart.
    let request_id = Arc::new(AtomicUsize::new(0));
    let tracing_span = warp::trace(move |_info| {
        let id = request_id.fetch_add(1, Ordering::SeqCst);
        tracing::info_span!("request", id)
    });

    instrumented
        .recover(handle_rejection)
        .with(warp::log::log("coordinator::api"))
        .with(tracing_span)
}

#[cfg(test)]
pub async fn response_body(response: warp::hyper::Response<warp::hyper::Body>) -> Vec<u8> {
    let mut body = response.into_body();
    let mut result = Vec::new();
    while let Some(bytes) = futures::StreamExt::next(&mut body).await {
        result.extend_from_slice(bytes.unwrap().as_ref());
    }
    result
}
