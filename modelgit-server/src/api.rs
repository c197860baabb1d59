use crate::libraries::LibraryRegistry;
use crate::repositories::Repositories;
use axum::{
    extract::{Query, State},
    http::{header::COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use modelgit_core::{Commit, Error, PushPack};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "JSESSIONID";

#[derive(Clone)]
pub struct AppState {
    pub repositories: Arc<Mutex<Repositories>>,
    pub libraries: Arc<LibraryRegistry>,
    pub sessions: Arc<Mutex<HashSet<Uuid>>>,
    /// Username to password. Empty accepts every non-empty username.
    pub accounts: Arc<HashMap<String, String>>,
}

impl AppState {
    pub fn new(repositories: Repositories, libraries: LibraryRegistry) -> Self {
        Self {
            repositories: Arc::new(Mutex::new(repositories)),
            libraries: Arc::new(libraries),
            sessions: Arc::new(Mutex::new(HashSet::new())),
            accounts: Arc::new(HashMap::new()),
        }
    }

    pub fn with_accounts(mut self, accounts: HashMap<String, String>) -> Self {
        self.accounts = Arc::new(accounts);
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/login", post(login))
        .route("/library", post(check_libraries))
        .route("/push", post(push))
        .route("/commits", get(list_commits))
        .with_state(state)
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

fn api_error(e: Error) -> (StatusCode, String) {
    let status = match &e {
        Error::Precondition(_) => StatusCode::BAD_REQUEST,
        Error::InvalidOperation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::CommitNotFound(_) | Error::ObjectNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> ApiResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "state lock poisoned".to_string()))
}

fn session_cookie(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let known = match session_cookie(headers) {
        Some(id) => lock(&state.sessions)?.contains(&id),
        None => false,
    };
    if known {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "No valid session".to_string()))
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    session_id: String,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let accepted = if state.accounts.is_empty() {
        !req.username.trim().is_empty()
    } else {
        state.accounts.get(&req.username) == Some(&req.password)
    };
    if !accepted {
        warn!("Rejected login for {}", req.username);
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()));
    }

    let id = Uuid::new_v4();
    lock(&state.sessions)?.insert(id);
    info!("Opened session for {}", req.username);
    Ok(Json(LoginResponse {
        session_id: id.to_string(),
    }))
}

#[derive(Deserialize)]
struct RepositoryQuery {
    group: String,
    name: String,
}

async fn check_libraries(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(repo): Query<RepositoryQuery>,
    Json(ref_ids): Json<Vec<String>>,
) -> ApiResult<Response> {
    authorize(&state, &headers)?;

    let restrictions = state.libraries.restrictions(&ref_ids);
    debug!(
        "Library check for {}/{}: {} of {} datasets restricted",
        repo.group,
        repo.name,
        restrictions.len(),
        ref_ids.len()
    );
    if restrictions.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(restrictions).into_response())
}

async fn push(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(repo): Query<RepositoryQuery>,
    Json(pack): Json<PushPack>,
) -> ApiResult<Response> {
    authorize(&state, &headers)?;

    let mut repositories = lock(&state.repositories)?;
    let storage = repositories.get(&repo.group, &repo.name).map_err(api_error)?;
    let result = storage.receive(&pack).map_err(api_error)?;

    if result.is_ok() {
        info!(
            "Accepted {} commits into {}/{}",
            result.new_commits.len(),
            repo.group,
            repo.name
        );
        Ok((StatusCode::OK, Json(result)).into_response())
    } else {
        Ok((StatusCode::CONFLICT, Json(result)).into_response())
    }
}

#[derive(Deserialize)]
struct LogQuery {
    group: String,
    name: String,
    limit: Option<usize>,
}

async fn list_commits(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<Vec<Commit>>> {
    let mut repositories = lock(&state.repositories)?;
    let storage = repositories
        .get(&query.group, &query.name)
        .map_err(api_error)?;
    storage.log(query.limit).map(Json).map_err(api_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use modelgit_core::library::RemoteRestriction;
    use modelgit_core::{CommitResult, PersonIdent, PushStatus, Storage};
    use tower::ServiceExt;

    fn state() -> AppState {
        let libraries = LibraryRegistry::new().with_library("ecoinvent", ["A"]);
        AppState::new(Repositories::new(None), libraries)
    }

    async fn session(router: &Router) -> String {
        let response = router
            .clone()
            .oneshot(
                Request::post("/login")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"username":"ann","password":"x"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap())
                .unwrap();
        body["sessionId"].as_str().unwrap().to_string()
    }

    fn json_post(uri: &str, session: Option<&str>, body: String) -> Request<Body> {
        let mut builder = Request::post(uri).header("content-type", "application/json");
        if let Some(id) = session {
            builder = builder.header("cookie", format!("{}={}", SESSION_COOKIE, id));
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn pack_with_one_commit() -> PushPack {
        let local = Storage::in_memory().unwrap();
        let commit = local
            .write_commit(None, &[], &[], "first", &PersonIdent::new("Ann", "a@x"))
            .unwrap();
        local.pack(None, &commit.id).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = create_router(state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_library_requires_session() {
        let router = create_router(state());
        let response = router
            .oneshot(json_post("/library?group=lca&name=steel", None, r#"["A"]"#.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_library_no_content_when_unrestricted() {
        let router = create_router(state());
        let id = session(&router).await;
        let response = router
            .oneshot(json_post(
                "/library?group=lca&name=steel",
                Some(&id),
                r#"["B", "C"]"#.to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_library_lists_restrictions() {
        let router = create_router(state());
        let id = session(&router).await;
        let response = router
            .oneshot(json_post(
                "/library?group=lca&name=steel",
                Some(&id),
                r#"["B", "A"]"#.to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let restrictions: Vec<RemoteRestriction> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            restrictions,
            vec![RemoteRestriction {
                dataset_ref_id: "A".to_string(),
                library_name: "ecoinvent".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_login_with_accounts() {
        let accounts = HashMap::from([("ann".to_string(), "secret".to_string())]);
        let router = create_router(state().with_accounts(accounts));
        let response = router
            .oneshot(json_post(
                "/login",
                None,
                r#"{"username":"ann","password":"wrong"}"#.to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_push_then_conflict() {
        let router = create_router(state());
        let id = session(&router).await;
        let pack = pack_with_one_commit();
        let body = serde_json::to_string(&pack).unwrap();

        let first = router
            .clone()
            .oneshot(json_post("/push?group=lca&name=steel", Some(&id), body.clone()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let bytes = to_bytes(first.into_body(), usize::MAX).await.unwrap();
        let result: CommitResult = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(result.status, PushStatus::Ok);
        assert_eq!(result.new_commits.len(), 1);

        // The same pack again no longer builds on the server head.
        let second = router
            .clone()
            .oneshot(json_post("/push?group=lca&name=steel", Some(&id), body))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let bytes = to_bytes(second.into_body(), usize::MAX).await.unwrap();
        let result: CommitResult = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(result.status, PushStatus::RejectedNonFastForward);

        let log = router
            .oneshot(
                Request::get("/commits?group=lca&name=steel")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = to_bytes(log.into_body(), usize::MAX).await.unwrap();
        let commits: Vec<Commit> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, "first");
    }
}
