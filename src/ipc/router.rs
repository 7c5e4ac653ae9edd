use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type TryHandle = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

/// First family to claim the method answers it.
const FAMILIES: &[TryHandle] = &[
    handlers::core::try_handle,
    handlers::setup::try_handle,
    handlers::colleges::try_handle,
    handlers::students::try_handle,
    handlers::staff::try_handle,
    handlers::rooms::try_handle,
    handlers::medical::try_handle,
    handlers::materials::try_handle,
    handlers::practice::try_handle,
    handlers::announcements::try_handle,
    handlers::messages::try_handle,
    handlers::hostel::try_handle,
    handlers::incidents::try_handle,
    handlers::dashboard::try_handle,
    handlers::reports::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");
    for &try_handle in FAMILIES {
        if let Some(resp) = try_handle(state, &req) {
            return resp;
        }
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
