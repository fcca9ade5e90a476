pub mod admin;
pub mod health;
pub mod session;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::jobs::handlers as jobs;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Session / auth
        .route("/api/v1/session", get(session::handle_get_session))
        .route("/api/v1/session/probe", post(session::handle_probe))
        .route("/api/v1/auth/login", post(session::handle_login))
        .route("/api/v1/auth/register", post(session::handle_register))
        .route("/api/v1/auth/logout", post(session::handle_logout))
        .route("/api/v1/auth/switch-role", post(session::handle_switch_role))
        .route("/api/v1/auth/password", post(session::handle_change_password))
        .route("/api/v1/profile", put(session::handle_update_profile))
        .route("/api/v1/setup/script", get(session::handle_setup_script))
        // Job board
        .route(
            "/api/v1/jobs",
            get(jobs::handle_list_jobs).post(jobs::handle_create_job),
        )
        .route("/api/v1/jobs/:id", get(jobs::handle_get_job))
        .route("/api/v1/jobs/:id/apply", post(jobs::handle_apply))
        .route("/api/v1/jobs/:id/applied", get(jobs::handle_has_applied))
        .route(
            "/api/v1/companies/:id/jobs",
            get(jobs::handle_company_jobs),
        )
        .route(
            "/api/v1/candidates/:id/applications",
            get(jobs::handle_candidate_applications),
        )
        .route("/api/v1/applications", get(jobs::handle_job_applications))
        // Moderation
        .route("/api/v1/admin/users", get(admin::handle_list_users))
        .route("/api/v1/admin/users/:id", delete(admin::handle_delete_user))
        .route("/api/v1/admin/jobs", get(admin::handle_list_all_jobs))
        .route("/api/v1/admin/jobs/:id", delete(admin::handle_delete_job))
        .route("/api/v1/admin/jobs/:id/close", post(admin::handle_close_job))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::backend::fallback::FallbackDataset;
    use crate::backend::supabase::SupabaseClient;
    use crate::config::Config;
    use crate::jobs::service::JobBoard;
    use crate::models::user::UserRole;
    use crate::session::testing::{fallback, ProbeScript, ScriptedBackend};
    use crate::session::{SessionController, SessionStore};

    async fn app(live: &Arc<ScriptedBackend>) -> Router {
        let store = SessionStore::spawn();
        let session =
            SessionController::new(store.clone(), live.clone(), live.clone(), fallback());
        session.initialize().await;
        let jobs = JobBoard::new(
            Arc::new(SupabaseClient::new(None, None, None).unwrap()),
            Arc::new(FallbackDataset::load().unwrap()),
            store,
        );
        build_router(AppState {
            session,
            jobs: Arc::new(jobs),
            config: Config {
                supabase_url: None,
                supabase_anon_key: None,
                supabase_refresh_token: None,
                port: 0,
                rust_log: "info".to_string(),
            },
            backend_endpoint: "invalid URL".to_string(),
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let live = ScriptedBackend::new(ProbeScript::Network);
        let (status, body) = send(&app(&live).await, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "DEMO");
    }

    #[tokio::test]
    async fn test_session_view_in_demo() {
        let live = ScriptedBackend::new(ProbeScript::Network);
        let (status, body) = send(&app(&live).await, "GET", "/api/v1/session", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isDemoMode"], true);
        assert_eq!(body["isAuthenticated"], true);
        assert_eq!(body["state"], "DEMO");
        assert_eq!(body["currentUser"]["id"], "cand1");
    }

    #[tokio::test]
    async fn test_probe_reports_setup_required() {
        let live = ScriptedBackend::new(ProbeScript::SchemaMissing);
        let (status, body) = send(&app(&live).await, "POST", "/api/v1/session/probe", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "SETUP_REQUIRED");
        assert_eq!(body["endpoint"], "invalid URL");
        assert!(body["latencyMs"].is_number());
    }

    #[tokio::test]
    async fn test_live_login_failure_is_401() {
        let live = ScriptedBackend::new(ProbeScript::Ok);
        live.add_account("u1", "ana@example.com", "secret1", Some(UserRole::Candidate));
        let app = app(&live).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "email": "ana@example.com", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "email": "ana@example.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "LIVE_AUTHENTICATED");
    }

    #[tokio::test]
    async fn test_register_needing_confirmation_is_202() {
        let live = ScriptedBackend::new(ProbeScript::Ok);
        live.require_confirmation(true);
        let (status, body) = send(
            &app(&live).await,
            "POST",
            "/api/v1/auth/register",
            Some(json!({
                "email": "new@example.com",
                "password": "secret1",
                "name": "New Person",
                "role": "CANDIDATE"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "confirmation_required");
    }

    #[tokio::test]
    async fn test_switch_role_live_is_conflict() {
        let live = ScriptedBackend::new(ProbeScript::Ok);
        let (status, body) =
            send(&app(&live).await, "POST", "/api/v1/auth/switch-role", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("separate account"));
    }

    #[tokio::test]
    async fn test_profile_save_failure_reports_and_keeps_local_copy() {
        let live = ScriptedBackend::new(ProbeScript::Ok);
        live.add_account("u1", "ana@example.com", "secret1", Some(UserRole::Candidate));
        live.fail_profile_update(true);
        let app = app(&live).await;
        let (_, session) = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "email": "ana@example.com", "password": "secret1" })),
        )
        .await;

        let mut user = session["currentUser"].clone();
        user["location"] = json!("Recife, PE");
        let (status, body) = send(&app, "PUT", "/api/v1/profile", Some(user)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "PERSISTENCE_FAILED");

        let (_, session) = send(&app, "GET", "/api/v1/session", None).await;
        assert_eq!(session["currentUser"]["location"], "Recife, PE");
        assert_eq!(session["pendingSync"], true);
    }

    #[tokio::test]
    async fn test_demo_logout_is_reset() {
        let live = ScriptedBackend::new(ProbeScript::Network);
        let (status, body) = send(&app(&live).await, "POST", "/api/v1/auth/logout", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "demo_reset");
        assert_eq!(body["user"]["id"], "cand1");
    }

    #[tokio::test]
    async fn test_password_mismatch_is_400() {
        let live = ScriptedBackend::new(ProbeScript::Network);
        let (status, _) = send(
            &app(&live).await,
            "POST",
            "/api/v1/auth/password",
            Some(json!({ "newPassword": "secret1", "confirmPassword": "secret2" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_jobs_listing_and_lookup() {
        let live = ScriptedBackend::new(ProbeScript::Network);
        let app = app(&live).await;
        let (status, jobs) = send(&app, "GET", "/api/v1/jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(jobs.as_array().unwrap().len(), 3);

        let (status, _) = send(&app, "GET", "/api/v1/jobs/404", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, apps) = send(&app, "GET", "/api/v1/applications?job_ids=1,2", None).await;
        assert_eq!(apps.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_candidate_cannot_post_jobs_but_company_can() {
        let live = ScriptedBackend::new(ProbeScript::Network);
        let app = app(&live).await;
        let draft = json!({
            "title": "Rust Engineer",
            "description": "Build services",
            "location": "Remote",
            "type": "PJ",
            "model": "Remoto",
            "area": "Tecnologia"
        });

        let (status, _) = send(&app, "POST", "/api/v1/jobs", Some(draft.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        send(&app, "POST", "/api/v1/auth/switch-role", None).await;
        let (status, job) = send(&app, "POST", "/api/v1/jobs", Some(draft)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(job["companyName"], "TechNova Solutions");
    }

    #[tokio::test]
    async fn test_duplicate_application_is_conflict() {
        let live = ScriptedBackend::new(ProbeScript::Network);
        let app = app(&live).await;
        let (status, _) = send(&app, "POST", "/api/v1/jobs/1/apply", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, body) = send(&app, "POST", "/api/v1/jobs/3/apply", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["id"].as_str().unwrap().starts_with("mock-app-"));
        let (status, _) = send(&app, "POST", "/api/v1/jobs/3/apply", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    fn job_ids(body: &Value) -> Vec<&str> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|j| j["id"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_job_listing_query_filters() {
        let live = ScriptedBackend::new(ProbeScript::Network);
        let app = app(&live).await;

        let (_, body) = send(&app, "GET", "/api/v1/jobs?q=green", None).await;
        assert_eq!(job_ids(&body), vec!["2"]);
        let (_, body) = send(&app, "GET", "/api/v1/jobs?type=PJ", None).await;
        assert_eq!(job_ids(&body), vec!["3"]);
        let (_, body) = send(&app, "GET", "/api/v1/jobs?area=Design", None).await;
        assert_eq!(job_ids(&body), vec!["3"]);
        let (_, body) = send(&app, "GET", "/api/v1/jobs?model=H%C3%ADbrido", None).await;
        assert_eq!(job_ids(&body), vec!["2"]);
        let (_, body) = send(&app, "GET", "/api/v1/jobs?location=paulo&model=Remoto", None).await;
        assert_eq!(job_ids(&body), vec!["1"]);

        let (status, _) = send(&app, "GET", "/api/v1/jobs?type=Temporary", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_moderation_requires_admin() {
        let live = ScriptedBackend::new(ProbeScript::Network);
        let app = app(&live).await;

        let (status, _) = send(&app, "GET", "/api/v1/admin/users", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, "DELETE", "/api/v1/admin/jobs/1", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_moderates_users_and_jobs() {
        let live = ScriptedBackend::new(ProbeScript::Network);
        let app = app(&live).await;
        send(
            &app,
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "email": "admin@jobflow.com", "password": "" })),
        )
        .await;

        let (status, companies) =
            send(&app, "GET", "/api/v1/admin/users?role=COMPANY", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job_ids(&companies), vec!["comp1"]);
        let (_, found) = send(&app, "GET", "/api/v1/admin/users?q=silva", None).await;
        assert_eq!(job_ids(&found), vec!["cand1"]);

        let (status, _) = send(&app, "DELETE", "/api/v1/admin/users/cand1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "DELETE", "/api/v1/admin/users/cand1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", "/api/v1/admin/users/admin1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, job) = send(&app, "POST", "/api/v1/admin/jobs/1/close", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["status"], "CLOSED");
        let (_, active) = send(&app, "GET", "/api/v1/jobs", None).await;
        assert_eq!(job_ids(&active), vec!["2", "3"]);
        let (_, all) = send(&app, "GET", "/api/v1/admin/jobs", None).await;
        assert_eq!(all.as_array().unwrap().len(), 3);

        let (status, _) = send(&app, "DELETE", "/api/v1/admin/jobs/2", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "POST", "/api/v1/admin/jobs/2/close", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_setup_script_is_served() {
        let live = ScriptedBackend::new(ProbeScript::SchemaMissing);
        let request = Request::builder()
            .uri("/api/v1/setup/script")
            .body(Body::empty())
            .unwrap();
        let response = app(&live).await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let sql = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS public.profiles"));
    }
}
