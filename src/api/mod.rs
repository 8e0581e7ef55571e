// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        DeadLetterView, ListMeta, NotificationView, RedriveView, TransferHistoryItem,
        TransferRequest, TransferView,
    },
    state::AppState,
};

pub mod admin;
pub mod health;
pub mod notifications;
pub mod transfers;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/transfers",
            get(transfers::list_transfers).post(transfers::create_transfer),
        )
        .route("/transfers/{transfer_id}", get(transfers::get_transfer))
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/{notification_id}/read",
            put(notifications::mark_notification_read),
        )
        .route("/admin/dead-letters", get(admin::list_dead_letters))
        .route(
            "/admin/dead-letters/{event_id}/redrive",
            post(admin::redrive_dead_letter),
        );

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CorsLayer::permissive()),
        )
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        transfers::create_transfer,
        transfers::list_transfers,
        transfers::get_transfer,
        notifications::list_notifications,
        notifications::mark_notification_read,
        admin::list_dead_letters,
        admin::redrive_dead_letter,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            TransferRequest,
            TransferView,
            TransferHistoryItem,
            NotificationView,
            DeadLetterView,
            RedriveView,
            ListMeta,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Transfers", description = "Wallet-to-wallet transfers and history"),
        (name = "Notifications", description = "Transfer notifications"),
        (name = "Admin", description = "Event queue maintenance"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
