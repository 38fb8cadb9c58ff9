use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
};

use crate::server::api_error::panic_response;
use crate::server::keymaster::{
    keymaster_health_handler, list_keys_handler, register_key_handler, revoke_key_handler,
    validate_handler, KeymasterState,
};
use crate::server::logging::request_logging_middleware;
use crate::server::nucleus::{
    list_servers_handler, nucleus_health_handler, register_server_handler,
    unregister_server_handler, update_status_handler, validate_source_handler, NucleusState,
};
use crate::server::policy::{
    get_policy_handler, policy_health_handler, pool_size_limits_handler, update_policy_handler,
    PolicyState,
};

/// Permissive CORS: any origin, method and header.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Layers shared by every service router.
fn with_common_layers(router: Router) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(cors_layer())
            .layer(middleware::from_fn(request_logging_middleware)),
    )
}

/// Build the keymaster router.
///
/// # Routes
///
/// - `POST /api/validate` - Validate a license key
/// - `POST /api/register-key` - Register or overwrite a key
/// - `GET /api/keys` - List keys with usage history
/// - `DELETE /api/keys/:key` - Revoke a key
/// - `GET /health` - Service health
pub fn build_keymaster_router(state: KeymasterState) -> Router {
    let router = Router::new()
        .route("/api/validate", post(validate_handler))
        .route("/api/register-key", post(register_key_handler))
        .route("/api/keys", get(list_keys_handler))
        .route("/api/keys/:key", delete(revoke_key_handler))
        .route("/health", get(keymaster_health_handler))
        .with_state(state);

    with_common_layers(router)
}

/// Build the nucleus router.
///
/// # Routes
///
/// - `POST /api/register` - Register a game server
/// - `POST /api/validateSource` - Validate a source address
/// - `GET /api/servers` - List servers
/// - `POST /api/servers/:id/status` - Status update / heartbeat
/// - `DELETE /api/servers/:id` - Unregister a server
/// - `GET /health` - Service health
pub fn build_nucleus_router(state: NucleusState) -> Router {
    let router = Router::new()
        .route("/api/register", post(register_server_handler))
        .route("/api/validateSource", post(validate_source_handler))
        .route("/api/servers", get(list_servers_handler))
        .route("/api/servers/:id/status", post(update_status_handler))
        .route("/api/servers/:id", delete(unregister_server_handler))
        .route("/health", get(nucleus_health_handler))
        .with_state(state);

    with_common_layers(router)
}

/// Build the policy router.
///
/// # Routes
///
/// - `GET /` - Current policy
/// - `GET /api/policy` - Current policy
/// - `POST /api/policy` - Merge a policy update
/// - `GET /pool-size-limits/:game` - Pool limits for a game
/// - `GET /health` - Service health
pub fn build_policy_router(state: PolicyState) -> Router {
    let router = Router::new()
        .route("/", get(get_policy_handler))
        .route(
            "/api/policy",
            get(get_policy_handler).post(update_policy_handler),
        )
        .route("/pool-size-limits/:game", get(pool_size_limits_handler))
        .route("/health", get(policy_health_handler))
        .with_state(state);

    with_common_layers(router)
}
