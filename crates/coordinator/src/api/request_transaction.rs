use crate::{
    api::{extract_payload, ApiReply, IntoWarpReply},
    engine::{Coordinator, RequestError, RequestOutcome},
};
use model::transaction::SignedZeroExTransaction;
use primitive_types::H160;
use serde::Deserialize;
use std::{convert::Infallible, sync::Arc};
use warp::{reply::with_status, Filter, Rejection};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestTransactionPayload {
    pub signed_transaction: SignedZeroExTransaction,
    /// The account that will broadcast the fill.
    pub tx_origin: H160,
}

pub fn request(
) -> impl Filter<Extract = (u64, RequestTransactionPayload), Error = Rejection> + Clone {
    warp::path!(u64 / "v2" / "request_transaction")
        .and(warp::post())
        .and(extract_payload())
}

pub fn response(result: Result<RequestOutcome, RequestError>) -> ApiReply {
    match result {
        Ok(RequestOutcome::Fill(outcome)) => {
            with_status(warp::reply::json(&outcome), warp::hyper::StatusCode::OK)
        }
        Ok(RequestOutcome::Cancellation(outcome)) => {
            with_status(warp::reply::json(&outcome), warp::hyper::StatusCode::OK)
        }
        Err(err) => err.into_warp_reply(),
    }
}

pub fn filter(
    coordinator: Arc<Coordinator>,
) -> impl Filter<Extract = (ApiReply,), Error = Rejection> + Clone {
    request().and_then(move |chain_id, payload: RequestTransactionPayload| {
        let coordinator = coordinator.clone();
        async move {
            let result = coordinator
                .handle_request(chain_id, payload.signed_transaction, payload.tx_origin)
                .await;
            Result::<_, Infallible>::Ok(response(result))
        }
    })
}
