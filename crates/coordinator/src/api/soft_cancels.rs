use crate::{
    api::{extract_payload, ApiReply},
    engine::Coordinator,
};
use primitive_types::H256;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc};
use warp::{hyper::StatusCode, reply::with_status, Filter, Rejection};

/// Both the request and the response carry a plain list of order hashes.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHashes {
    pub order_hashes: Vec<H256>,
}

pub fn request() -> impl Filter<Extract = (u64, OrderHashes), Error = Rejection> + Clone {
    warp::path!(u64 / "v2" / "soft_cancels")
        .and(warp::post())
        .and(extract_payload())
}

pub fn filter(
    coordinator: Arc<Coordinator>,
) -> impl Filter<Extract = (ApiReply,), Error = Rejection> + Clone {
    request().and_then(move |chain_id, payload: OrderHashes| {
        let coordinator = coordinator.clone();
        async move {
            let reply = if !coordinator.chain_ids().any(|id| id == chain_id) {
                with_status(
                    crate::api::error(
                        "UnknownChainId",
                        "chainId",
                        format!("chain id {chain_id} is not served"),
                    ),
                    StatusCode::NOT_FOUND,
                )
            } else {
                match coordinator.soft_cancelled_orders(&payload.order_hashes).await {
                    Ok(order_hashes) => with_status(
                        warp::reply::json(&OrderHashes { order_hashes }),
                        StatusCode::OK,
                    ),
                    Err(err) => {
                        tracing::error!(?err, "soft cancel lookup failed");
                        crate::api::internal_error_reply()
                    }
                }
            };
            Result::<_, Infallible>::Ok(reply)
        }
    })
}
