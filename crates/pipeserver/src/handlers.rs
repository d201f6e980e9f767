use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder, Result as ActixResult};
use actix_ws::Message;
use pipecore::{ExecutionEvent, FlowError, Payload, RecordStore, StoreError, Workflow};
use piperuntime::{ExecuteRequest, WorkflowEngine};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Header carrying the authenticated caller id
pub const USER_HEADER: &str = "X-User-Id";

/// Application state shared across handlers
pub struct AppState {
    pub engine: WorkflowEngine,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(mut builder: actix_web::HttpResponseBuilder, message: impl Into<String>) -> HttpResponse {
    builder.json(ErrorResponse {
        error: message.into(),
    })
}

fn caller(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// The workflow if it exists and belongs to `user`, otherwise a ready 404/500 response
async fn owned_workflow(
    engine: &WorkflowEngine,
    workflow_id: &str,
    user: &str,
) -> Result<Workflow, HttpResponse> {
    match engine.store().get_workflow(workflow_id).await {
        Ok(workflow) if workflow.owner == user => Ok(workflow),
        Ok(_) | Err(StoreError::NotFound { .. }) => Err(error_response(
            HttpResponse::NotFound(),
            "Workflow not found",
        )),
        Err(e) => {
            error!("Failed to load workflow {}: {}", workflow_id, e);
            Err(error_response(
                HttpResponse::InternalServerError(),
                "Failed to load workflow",
            ))
        }
    }
}

async fn start_execution(
    data: &AppState,
    workflow_id: &str,
    user: String,
    request: ExecuteRequest,
) -> HttpResponse {
    if let Err(response) = owned_workflow(&data.engine, workflow_id, &user).await {
        return response;
    }

    match data.engine.execute_workflow(request.with_caller(user)).await {
        Ok(handle) => {
            info!(
                "Workflow {} execution started: {}",
                workflow_id,
                handle.id()
            );
            HttpResponse::Accepted().json(&handle.execution)
        }
        Err(e) => {
            error!("Workflow {} execution failed to start: {}", workflow_id, e);
            error_response(
                HttpResponse::BadRequest(),
                format!("Failed to start workflow execution: {}", e),
            )
        }
    }
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "pipeline"
    }))
}

/// List available connector kinds with their config schemas
#[get("/api/workflows/connectors")]
async fn list_connectors(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "connectors": data.engine.connector_catalog(),
    })))
}

/// Start a workflow execution in the background
#[post("/api/workflows/{id}/execute")]
async fn execute_workflow(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let Some(user) = caller(&req) else {
        return Ok(error_response(HttpResponse::Unauthorized(), "Authentication required"));
    };
    let workflow_id = path.into_inner();

    info!("Executing workflow: {}", workflow_id);
    Ok(start_execution(&data, &workflow_id, user, ExecuteRequest::manual(&workflow_id)).await)
}

/// Start a workflow execution triggered by an external JSON payload
#[post("/api/workflows/{id}/webhook")]
async fn webhook_trigger(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> ActixResult<impl Responder> {
    let Some(user) = caller(&req) else {
        return Ok(error_response(HttpResponse::Unauthorized(), "Authentication required"));
    };
    let workflow_id = path.into_inner();

    let payload: Payload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Rejected webhook payload for {}: {}", workflow_id, e);
            return Ok(error_response(
                HttpResponse::BadRequest(),
                "Webhook payload must be a JSON object",
            ));
        }
    };

    info!(
        "Webhook received for workflow {} ({} keys)",
        workflow_id,
        payload.len()
    );
    Ok(start_execution(
        &data,
        &workflow_id,
        user,
        ExecuteRequest::webhook(&workflow_id, payload),
    )
    .await)
}

/// Decoded status of one execution
#[get("/api/workflows/executions/{id}")]
async fn execution_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let Some(user) = caller(&req) else {
        return Ok(error_response(HttpResponse::Unauthorized(), "Authentication required"));
    };

    let Ok(execution_id) = Uuid::parse_str(&path.into_inner()) else {
        return Ok(error_response(HttpResponse::NotFound(), "Execution not found"));
    };

    let view = match data.engine.get_status(execution_id).await {
        Ok(view) => view,
        Err(FlowError::ExecutionNotFound(_)) => {
            return Ok(error_response(HttpResponse::NotFound(), "Execution not found"))
        }
        Err(e) => {
            error!("Failed to load execution {}: {}", execution_id, e);
            return Ok(error_response(
                HttpResponse::InternalServerError(),
                "Failed to load execution",
            ));
        }
    };

    if let Err(response) = owned_workflow(&data.engine, &view.workflow_id, &user).await {
        return Ok(response);
    }

    Ok(HttpResponse::Ok().json(view))
}

#[derive(Debug, Default, Deserialize)]
struct EventsQuery {
    execution_id: Option<String>,
}

/// Which execution events a websocket client follows
#[derive(Debug, Clone, Copy, PartialEq)]
enum EventScope {
    All,
    Execution(Uuid),
}

impl EventScope {
    fn parse(query: &EventsQuery) -> Result<Self, String> {
        match query.execution_id.as_deref().map(str::trim) {
            None | Some("") => Ok(EventScope::All),
            Some(raw) => Uuid::parse_str(raw)
                .map(EventScope::Execution)
                .map_err(|_| format!("Invalid execution id: {}", raw)),
        }
    }

    fn includes(&self, event: &ExecutionEvent) -> bool {
        match self {
            EventScope::All => true,
            EventScope::Execution(id) => event.execution_id() == *id,
        }
    }

    /// A scoped stream ends with its execution
    fn is_last(&self, event: &ExecutionEvent) -> bool {
        matches!(self, EventScope::Execution(_))
            && matches!(event, ExecutionEvent::ExecutionFinished { .. })
    }
}

/// WebSocket stream of execution events, optionally scoped with `?execution_id=`
#[get("/api/events")]
async fn websocket_events(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<EventsQuery>,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let scope = match EventScope::parse(&query) {
        Ok(scope) => scope,
        Err(message) => return Ok(error_response(HttpResponse::BadRequest(), message)),
    };

    let mut events = data.engine.subscribe_events();
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected ({:?})", scope);

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) if scope.includes(&event) => {
                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Failed to encode execution event: {}", e),
                        }
                        if scope.is_last(&event) {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("WebSocket client lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                msg = msg_stream.recv() => match msg {
                    Some(Ok(Message::Ping(bytes))) => {
                        if session.pong(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }

        info!("WebSocket client disconnected ({:?})", scope);
        let _ = session.close(None).await;
    });

    Ok(res)
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(list_connectors)
        .service(execution_status)
        .service(execute_workflow)
        .service(webhook_trigger)
        .service(websocket_events);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use pipecore::{ExecutionStatus, ExecutionView, NodeCategory, NodeRecord, WorkflowBundle, WorkflowExecution};
    use pipeconnectors::{register_all, ConnectorSettings};
    use piperuntime::{ConnectorRegistry, EngineConfig, MemoryStore};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    async fn state() -> web::Data<AppState> {
        let mut bundle = WorkflowBundle::new(Workflow::new("notes export", "alice").with_id("wf"));
        let fetch = bundle.add_node(
            NodeRecord::new("wf", NodeCategory::Source, "record_store_source")
                .with_id("fetch")
                .with_config("collection", "notes"),
        );
        let log = bundle.add_node(
            NodeRecord::new("wf", NodeCategory::Destination, "log_destination").with_id("log"),
        );
        bundle.connect(&fetch, &log);

        let store = Arc::new(MemoryStore::new());
        store.load_bundle(bundle).await;

        let mut registry = ConnectorRegistry::new();
        register_all(&mut registry, Arc::new(ConnectorSettings::default()));

        web::Data::new(AppState {
            engine: WorkflowEngine::new(Arc::new(registry), store, EngineConfig::default()),
        })
    }

    async fn wait_terminal(engine: &WorkflowEngine, id: Uuid) -> ExecutionView {
        for _ in 0..100 {
            let view = engine.get_status(id).await.unwrap();
            if view.status.is_terminal() {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("execution {} did not finish", id);
    }

    #[actix_web::test]
    async fn health_reports_healthy() {
        let app = test::init_service(App::new().configure(routes)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn connectors_lists_catalog() {
        let app = test::init_service(App::new().app_data(state().await).configure(routes)).await;
        let body: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/workflows/connectors")
                .to_request(),
        )
        .await;

        let connectors = body["connectors"].as_array().unwrap();
        assert_eq!(connectors.len(), 10);
        let csv = connectors
            .iter()
            .find(|c| c["id"] == "csv_source")
            .unwrap();
        assert_eq!(csv["type"], "source");
        assert_eq!(csv["configSchema"]["file_path"]["required"], true);
    }

    #[actix_web::test]
    async fn execute_requires_identity() {
        let app = test::init_service(App::new().app_data(state().await).configure(routes)).await;
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/workflows/wf/execute")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn execute_hides_foreign_and_missing_workflows() {
        let app = test::init_service(App::new().app_data(state().await).configure(routes)).await;
        for (uri, user) in [
            ("/api/workflows/wf/execute", "mallory"),
            ("/api/workflows/nope/execute", "alice"),
        ] {
            let resp = test::call_service(
                &app,
                test::TestRequest::post()
                    .uri(uri)
                    .insert_header((USER_HEADER, user))
                    .to_request(),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{} as {}", uri, user);
        }
    }

    #[actix_web::test]
    async fn execute_accepts_and_status_reports_completion() {
        let data = state().await;
        let engine = data.engine.clone();
        let app = test::init_service(App::new().app_data(data).configure(routes)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/workflows/wf/execute")
                .insert_header((USER_HEADER, "alice"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let execution: WorkflowExecution = test::read_body_json(resp).await;
        assert_eq!(execution.workflow_id, "wf");
        assert_eq!(execution.status, ExecutionStatus::Running);

        let view = wait_terminal(&engine, execution.id).await;
        assert_eq!(view.status, ExecutionStatus::Completed, "{:?}", view.error_message);

        let uri = format!("/api/workflows/executions/{}", execution.id);
        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&uri)
                .insert_header((USER_HEADER, "alice"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["results"]["log"]["status"], "success");
        assert!(body["logs"].as_array().unwrap().len() > 2);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&uri)
                .insert_header((USER_HEADER, "mallory"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn status_of_unknown_or_malformed_id_is_not_found() {
        let app = test::init_service(App::new().app_data(state().await).configure(routes)).await;
        let missing = format!("/api/workflows/executions/{}", Uuid::new_v4());
        for uri in ["/api/workflows/executions/not-a-uuid", missing.as_str()] {
            let resp = test::call_service(
                &app,
                test::TestRequest::get()
                    .uri(uri)
                    .insert_header((USER_HEADER, "alice"))
                    .to_request(),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }
    }

    #[actix_web::test]
    async fn webhook_requires_json_object() {
        let data = state().await;
        let engine = data.engine.clone();
        let app = test::init_service(App::new().app_data(data).configure(routes)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/workflows/wf/webhook")
                .insert_header((USER_HEADER, "alice"))
                .set_payload("[1, 2]")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/workflows/wf/webhook")
                .insert_header((USER_HEADER, "alice"))
                .set_json(json!({ "event": "push", "ref": "main" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let execution: WorkflowExecution = test::read_body_json(resp).await;

        let view = wait_terminal(&engine, execution.id).await;
        assert!(view
            .logs
            .iter()
            .any(|l| l.message == "Triggered by webhook with 2 payload keys"));
    }

    fn event(kind: &str, execution_id: Uuid) -> ExecutionEvent {
        let mut value = json!({
            "type": kind,
            "execution_id": execution_id,
            "timestamp": "2026-01-01T00:00:00Z",
        });
        let extra = match kind {
            "ExecutionFinished" => json!({ "success": true, "duration_ms": 5, "error": null }),
            _ => json!({ "node_id": "fetch", "connector": "record_store_source" }),
        };
        for (key, field) in extra.as_object().unwrap() {
            value[key] = field.clone();
        }
        serde_json::from_value(value).unwrap()
    }

    #[::core::prelude::v1::test]
    fn event_scope_follows_one_execution_until_it_finishes() {
        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();

        let scope = EventScope::parse(&EventsQuery {
            execution_id: Some(watched.to_string()),
        })
        .unwrap();
        assert_eq!(scope, EventScope::Execution(watched));

        assert!(scope.includes(&event("NodeStarted", watched)));
        assert!(!scope.includes(&event("NodeStarted", other)));
        assert!(!scope.is_last(&event("NodeStarted", watched)));
        assert!(scope.is_last(&event("ExecutionFinished", watched)));
    }

    #[::core::prelude::v1::test]
    fn unscoped_stream_sees_everything_and_never_ends() {
        for raw in [None, Some("  ".to_string())] {
            let scope = EventScope::parse(&EventsQuery { execution_id: raw }).unwrap();
            assert_eq!(scope, EventScope::All);
            assert!(scope.includes(&event("NodeStarted", Uuid::new_v4())));
            assert!(!scope.is_last(&event("ExecutionFinished", Uuid::new_v4())));
        }
    }

    #[actix_web::test]
    async fn events_reject_malformed_execution_id() {
        let app = test::init_service(App::new().app_data(state().await).configure(routes)).await;
        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/events?execution_id=not-a-uuid")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid execution id: not-a-uuid");
    }
}
