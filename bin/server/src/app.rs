//! Router assembly.
//!
//! | Route | Policy | Layers |
//! |---|---|---|
//! | `GET /api/user/role` | any authenticated caller | rate limited |
//! | `GET /api/user/role?userId=` | `StaffOrAdmin` | rate limited |
//! | `GET /api/access?roles=` | any authenticated caller | |
//! | `POST /api/dev/role` | dev build | body validated |
//! | `DELETE /api/dev/role` | dev build | |
//! | `GET /healthz` | none | |

use axum::{
    Router, middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::api::{self, access, dev, role};
use crate::error::ApiError;
use crate::security::{SecurityConfig, SecurityLayer};
use crate::state::AppState;

/// Builds the API routes with their guards.
pub fn api_router(state: Arc<AppState>) -> Router {
    let security = state.security;
    let role_lookup = SecurityLayer::new(
        SecurityConfig::rate_limited(state.role_lookup_limit),
        state.rate_limits.clone(),
    )
    .trust_forwarded_for(security.trust_forwarded_for);

    let dev_body = SecurityLayer::new(SecurityConfig::validated(), state.rate_limits.clone())
        .validate_json::<dev::SetRoleRequest>()
        .max_body_bytes(security.max_body_bytes);

    let dev_routes = Router::new()
        .route(
            "/api/dev/role",
            post(dev::set_role)
                .layer(dev_body)
                .delete(dev::clear_role),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            dev::require_dev_build,
        ));

    Router::new()
        .route("/api/user/role", get(role::get_role).layer(role_lookup))
        .route("/api/access", get(access::check_access))
        .route("/healthz", get(api::healthz))
        .merge(dev_routes)
        .with_state(state)
}

/// Adds request tracing and panic recovery around `router`.
pub fn with_common_layers(router: Router) -> Router {
    router
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    ApiError::internal(format!("handler panicked: {detail}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use medislot_access::testing::{InMemoryRoleStore, StaticIdentityAdapter};
    use medislot_access::{
        InMemoryRateLimiter, RateLimitConfig, RetryPolicy, RetryingRoleStore, Role, RoleResolver,
        StoreError, UserRecord,
    };
    use medislot_core::SubjectId;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::config::SecuritySettings;

    struct Harness {
        store: Arc<InMemoryRoleStore>,
        app: Router,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_limit(RateLimitConfig::per_minute(50))
        }

        fn with_limit(limit: RateLimitConfig) -> Self {
            let identity = StaticIdentityAdapter::new()
                .with_session("tok-patient", "sub_patient")
                .with_session("tok-doctor", "sub_doctor")
                .with_session("tok-staff", "sub_staff")
                .with_session("tok-admin", "sub_admin")
                .with_session("tok-unsynced", "sub_unsynced");

            let store = Arc::new(InMemoryRoleStore::new());
            for (subject, role) in [
                ("sub_patient", Role::Patient),
                ("sub_doctor", Role::Doctor),
                ("sub_staff", Role::Staff),
                ("sub_admin", Role::Admin),
            ] {
                store.insert(UserRecord::new(SubjectId::new(subject), role));
            }

            let resolver = RoleResolver::new(
                Arc::new(identity),
                RetryingRoleStore::new(store.clone(), RetryPolicy::default()),
            );
            let state = Arc::new(AppState::new(
                resolver,
                Arc::new(InMemoryRateLimiter::new()),
                limit,
                SecuritySettings::default(),
            ));

            Self {
                store,
                app: with_common_layers(api_router(state)),
            }
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.app.clone().oneshot(request).await.expect("infallible")
        }

        async fn get(&self, uri: &str, session: Option<&str>) -> Response {
            let mut builder = Request::builder().uri(uri);
            if let Some(token) = session {
                builder = builder.header(header::COOKIE, format!("__session={token}"));
            }
            self.send(builder.body(Body::empty()).expect("request")).await
        }
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    fn dev_post(body: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/dev/role")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).expect("request")
    }

    #[tokio::test]
    async fn no_session_is_401() {
        let harness = Harness::new();
        let response = harness.get("/api/user/role", None).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json(response).await,
            serde_json::json!({"authenticated": false, "error": "Unauthenticated"})
        );
    }

    #[tokio::test]
    async fn unknown_session_is_401() {
        let harness = Harness::new();
        let response = harness.get("/api/user/role", Some("tok-forged")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn own_role_comes_from_store() {
        let harness = Harness::new();
        let response = harness.get("/api/user/role", Some("tok-doctor")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json(response).await,
            serde_json::json!({"role": "DOCTOR", "authenticated": true})
        );
    }

    #[tokio::test]
    async fn unsynced_user_is_patient() {
        let harness = Harness::new();
        let response = harness.get("/api/user/role", Some("tok-unsynced")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json(response).await,
            serde_json::json!({"role": "PATIENT", "authenticated": true})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let harness = Harness::new();
        harness
            .store
            .fail_next(2, StoreError::transient("connection reset"));

        let response = harness.get("/api/user/role", Some("tok-admin")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["role"], "ADMIN");
        assert_eq!(harness.store.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn store_outage_degrades_to_patient() {
        let harness = Harness::new();
        harness
            .store
            .always_fail(StoreError::transient("connection refused"));

        let response = harness.get("/api/user/role", Some("tok-admin")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json(response).await,
            serde_json::json!({"role": "PATIENT", "authenticated": true, "degraded": true})
        );
    }

    #[tokio::test]
    async fn patient_cannot_look_up_others() {
        let harness = Harness::new();
        let response = harness
            .get("/api/user/role?userId=sub_admin", Some("tok-patient"))
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            json(response).await,
            serde_json::json!({"role": "PATIENT", "authenticated": true, "error": "Forbidden"})
        );
    }

    #[tokio::test]
    async fn doctor_cannot_look_up_others() {
        let harness = Harness::new();
        let response = harness
            .get("/api/user/role?userId=sub_patient", Some("tok-doctor"))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn staff_and_admin_see_target_role() {
        let harness = Harness::new();

        for token in ["tok-staff", "tok-admin"] {
            let response = harness
                .get("/api/user/role?userId=sub_doctor", Some(token))
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                json(response).await,
                serde_json::json!({"role": "DOCTOR", "authenticated": true})
            );
        }
    }

    #[tokio::test]
    async fn unknown_target_is_patient() {
        let harness = Harness::new();
        let response = harness
            .get("/api/user/role?userId=sub_nobody", Some("tok-staff"))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["role"], "PATIENT");
    }

    #[tokio::test]
    async fn empty_user_id_is_400() {
        let harness = Harness::new();
        let response = harness.get("/api/user/role?userId=", Some("tok-staff")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cross_user_lookup_without_session_is_401() {
        let harness = Harness::new();
        let response = harness.get("/api/user/role?userId=sub_admin", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(start_paused = true)]
    async fn role_lookups_are_rate_limited() {
        let harness = Harness::new();

        for _ in 0..50 {
            let response = harness.get("/api/user/role", Some("tok-patient")).await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        tokio::time::advance(Duration::from_secs(20)).await;
        let response = harness.get("/api/user/role", Some("tok-patient")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("40")
        );
        assert_eq!(
            json(response).await,
            serde_json::json!({"error": "Too many requests"})
        );

        tokio::time::advance(Duration::from_secs(40)).await;
        let response = harness.get("/api/user/role", Some("tok-patient")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn access_check_allows_listed_role() {
        let harness = Harness::new();
        let response = harness
            .get("/api/access?roles=DOCTOR,ADMIN", Some("tok-doctor"))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json(response).await,
            serde_json::json!({"allowed": true, "role": "DOCTOR"})
        );
    }

    #[tokio::test]
    async fn access_check_denies_unlisted_role() {
        let harness = Harness::new();
        let response = harness
            .get("/api/access?roles=STAFF,ADMIN", Some("tok-patient"))
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            json(response).await,
            serde_json::json!({"allowed": false, "role": "PATIENT", "reason": "forbidden"})
        );
    }

    #[tokio::test]
    async fn access_check_rejects_bad_parameters() {
        let harness = Harness::new();

        for uri in ["/api/access", "/api/access?roles=", "/api/access?roles=DOCTOR,NURSE"] {
            let response = harness.get(uri, Some("tok-doctor")).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {uri}");
        }
    }

    #[tokio::test]
    async fn access_check_without_session_is_401() {
        let harness = Harness::new();
        let response = harness.get("/api/access?roles=PATIENT", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn healthz_needs_no_session() {
        let harness = Harness::new();
        let response = harness.get("/healthz", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn explode() -> &'static str {
        panic!("handler exploded with secret detail")
    }

    #[tokio::test]
    async fn panics_become_generic_500() {
        let app = with_common_layers(Router::new().route("/boom", get(explode)));
        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).expect("request"))
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json(response).await,
            serde_json::json!({"error": "Internal server error"})
        );
    }

    #[cfg(not(feature = "dev-override"))]
    mod production {
        use super::*;

        #[tokio::test]
        async fn set_override_is_403_without_cookie() {
            let harness = Harness::new();
            let response = harness.send(dev_post(r#"{"role":"ADMIN"}"#, None)).await;

            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert!(response.headers().get(header::SET_COOKIE).is_none());
        }

        #[tokio::test]
        async fn set_override_is_403_even_for_invalid_bodies() {
            let harness = Harness::new();
            let response = harness.send(dev_post("not json", None)).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }

        #[tokio::test]
        async fn clear_override_is_403() {
            let harness = Harness::new();
            let response = harness
                .send(
                    Request::builder()
                        .method("DELETE")
                        .uri("/api/dev/role")
                        .body(Body::empty())
                        .expect("request"),
                )
                .await;

            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert!(response.headers().get(header::SET_COOKIE).is_none());
        }

        #[tokio::test]
        async fn dev_cookie_is_ignored() {
            let harness = Harness::new();
            let request = Request::builder()
                .uri("/api/user/role")
                .header(header::COOKIE, "__session=tok-patient; dev-user-role=ADMIN")
                .body(Body::empty())
                .expect("request");

            let response = harness.send(request).await;
            assert_eq!(json(response).await["role"], "PATIENT");

            let request = Request::builder()
                .uri("/api/user/role")
                .header(header::COOKIE, "dev-user-role=ADMIN")
                .body(Body::empty())
                .expect("request");
            let response = harness.send(request).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[cfg(feature = "dev-override")]
    mod development {
        use super::*;

        #[tokio::test]
        async fn set_override_issues_cookie() {
            let harness = Harness::new();
            let response = harness.send(dev_post(r#"{"role":"STAFF"}"#, None)).await;

            assert_eq!(response.status(), StatusCode::OK);
            let cookie = response
                .headers()
                .get(header::SET_COOKIE)
                .and_then(|v| v.to_str().ok())
                .expect("set-cookie")
                .to_string();
            assert!(cookie.starts_with("dev-user-role=STAFF"));
            assert!(cookie.contains("HttpOnly"));
            assert!(cookie.contains("Path=/"));
            assert!(cookie.contains("Max-Age=86400"));
        }

        #[tokio::test]
        async fn set_override_validates_body() {
            let harness = Harness::new();

            for body in [r#"{"role":"NURSE"}"#, r#"{"role":"STAFF","x":1}"#, "{}", "nope"] {
                let response = harness.send(dev_post(body, None)).await;
                assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
                assert!(response.headers().get(header::SET_COOKIE).is_none());
            }
        }

        #[tokio::test]
        async fn set_override_requires_json_content_type() {
            let harness = Harness::new();

            for content_type in [None, Some("text/plain")] {
                let mut builder = Request::builder().method("POST").uri("/api/dev/role");
                if let Some(content_type) = content_type {
                    builder = builder.header(header::CONTENT_TYPE, content_type);
                }
                let request = builder
                    .body(Body::from(r#"{"role":"STAFF"}"#))
                    .expect("request");

                let response = harness.send(request).await;

                assert_eq!(
                    response.status(),
                    StatusCode::BAD_REQUEST,
                    "content type {content_type:?}"
                );
                assert!(response.headers().get(header::SET_COOKIE).is_none());
                assert_eq!(
                    json(response).await,
                    serde_json::json!({"error": "Invalid request"})
                );
            }
        }

        #[tokio::test]
        async fn clear_override_expires_cookie() {
            let harness = Harness::new();
            let response = harness
                .send(
                    Request::builder()
                        .method("DELETE")
                        .uri("/api/dev/role")
                        .body(Body::empty())
                        .expect("request"),
                )
                .await;

            assert_eq!(response.status(), StatusCode::OK);
            let cookie = response
                .headers()
                .get(header::SET_COOKIE)
                .and_then(|v| v.to_str().ok())
                .expect("set-cookie");
            assert!(cookie.starts_with("dev-user-role="));
            assert!(cookie.contains("Max-Age=0"));
        }

        #[tokio::test]
        async fn dev_cookie_bypasses_identity_and_store() {
            let harness = Harness::new();
            let request = Request::builder()
                .uri("/api/user/role")
                .header(header::COOKIE, "dev-user-role=ADMIN")
                .body(Body::empty())
                .expect("request");

            let response = harness.send(request).await;

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json(response).await["role"], "ADMIN");
            assert_eq!(harness.store.calls(), 0);
        }
    }
}
