use crate::{
    api::handlers::{
        auth::{login, users},
        consultations, diagnostics, health, medical_history, patients, treatments,
    },
    cli::globals::GlobalArgs,
    supabase::Supabase,
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    response::Json,
    routing::{get, post, put},
    Extension, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod email;
pub mod error;
pub mod handlers;
mod openapi;

pub use openapi::ApiDoc;

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, globals: &GlobalArgs) -> Result<()> {
    let supabase = Supabase::new(globals)?;
    let email_sender = email::EmailSender::from_globals(globals)?;

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(AllowOrigin::exact(frontend_origin(
            &globals.frontend_origin,
        )?))
        .allow_credentials(true);

    let app = router()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(supabase))
                .layer(Extension(email_sender)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn router() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/auth/login", post(login::login))
        .route("/auth/verify-otp", post(login::verify_otp))
        .route("/auth/refresh", post(login::refresh))
        .route("/auth/sign_up", post(login::sign_up))
        .route("/auth/me", get(users::me))
        .route("/auth/users", get(users::list_users).post(users::create_user))
        .route(
            "/auth/users/:target_user_id",
            put(users::update_user).delete(users::delete_user),
        )
        .route("/patients", get(patients::list).post(patients::create))
        .route(
            "/patients/:patient_id",
            get(patients::get)
                .put(patients::update)
                .delete(patients::delete),
        )
        .route(
            "/consultations",
            get(consultations::list).post(consultations::create),
        )
        .route(
            "/consultations/:consultation_id",
            get(consultations::get)
                .put(consultations::update)
                .delete(consultations::delete),
        )
        .route(
            "/diagnostics",
            get(diagnostics::list).post(diagnostics::create),
        )
        .route(
            "/diagnostics/:diagnostic_id",
            get(diagnostics::get)
                .put(diagnostics::update)
                .delete(diagnostics::delete),
        )
        .route("/treatments", get(treatments::list).post(treatments::create))
        .route(
            "/treatments/:treatment_id",
            get(treatments::get)
                .put(treatments::update)
                .delete(treatments::delete),
        )
        .route(
            "/medical_history",
            get(medical_history::list).post(medical_history::create),
        )
        .route(
            "/medical_history/:entry_id",
            get(medical_history::get)
                .put(medical_history::update)
                .delete(medical_history::delete),
        )
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "docs": "/docs",
    }))
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend origin: {frontend_base_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Frontend origin must include a valid host: {frontend_base_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontend_origin_strips_path() {
        let origin = frontend_origin("http://localhost:3000/app").unwrap();
        assert_eq!(origin, "http://localhost:3000");
    }

    #[test]
    fn test_frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }
}
