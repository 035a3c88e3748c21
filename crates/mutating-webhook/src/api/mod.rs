use std::{any::Any, sync::Arc};

use admission_mutators::AdmissionHandler;
use axum::{
    extract::Request,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;

pub(crate) mod api_error;
pub(crate) mod handlers;
pub(crate) mod state;

pub use state::Endpoint;

use crate::metrics;
use api_error::ApiError;
use handlers::{mutate_handler, readiness};
use state::EndpointState;

pub const READINESS_PATH: &str = "/readiness";

/// A mutation mounted on the router.
pub struct Route {
    pub endpoint: Endpoint,
    pub path: String,
    pub handler: Arc<dyn AdmissionHandler>,
}

/// Build the router serving every given route plus the readiness probe.
///
/// Each mutation route gets its own trace span naming the endpoint, so the
/// logs of a mutator are always attributed to the path that invoked it.
/// A panicking handler is answered with a 500 and the process keeps serving.
pub fn router(routes: Vec<Route>) -> Router {
    let mut router = Router::new().route(READINESS_PATH, get(readiness));

    for route in routes {
        let endpoint = route.endpoint;
        let state = Arc::new(EndpointState {
            endpoint,
            handler: route.handler,
        });
        let method_router = post(mutate_handler).with_state(state).layer(
            TraceLayer::new_for_http().make_span_with(move |request: &Request| {
                tracing::info_span!(
                    "endpoint",
                    endpoint = endpoint.name(),
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        );
        router = router.route(&route.path, method_router);
    }

    router
        .route_layer(CatchPanicLayer::custom(handle_panic))
        .route_layer(middleware::from_fn(metrics::track_requests))
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else {
        "unknown panic"
    };
    error!(details, "admission handler panicked");

    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("internal error: {details}"),
    }
    .into_response()
}
