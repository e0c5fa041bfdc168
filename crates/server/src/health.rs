use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use cloudquote_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: Option<DbPool>,
    catalog_services: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub sessions: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: Option<DbPool>, catalog_services: usize) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, catalog_services })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let sessions = match &state.db_pool {
        Some(pool) => database_check(pool).await,
        None => HealthCheck { status: "ready", detail: "sessions held in memory".to_string() },
    };
    let ready = sessions.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: format!("{} catalog services loaded", state.catalog_services),
        },
        sessions,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "session database reachable".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("session database query failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use cloudquote_db::connect_with_settings;

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_is_ready_for_memory_sessions() {
        let (status, Json(payload)) =
            health(State(HealthState { db_pool: None, catalog_services: 3 })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.service.detail, "3 catalog services loaded");
    }

    #[tokio::test]
    async fn health_returns_ready_when_database_is_reachable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: Some(pool.clone()), catalog_services: 3 })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.sessions.status, "ready");

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: Some(pool), catalog_services: 3 })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.sessions.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }
}
