use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use todd_api::{create_router, ApiState};
use todd_core::Settings;
use todd_github::{
    Artifact, CiProvider, Error, Repository, Result, WorkflowInfo, WorkflowJob, WorkflowRun,
};
use todd_resolver::{IntentResolver, ResolverConfig};
use tower::ServiceExt;

/// Knows the web repository's workflows; every run stays in progress.
struct StubProvider;

#[async_trait]
impl CiProvider for StubProvider {
    async fn list_workflows(&self, repo: &Repository) -> Result<Vec<WorkflowInfo>> {
        if repo.full_name() != "acme/web-e2e" {
            return Err(Error::ApiError {
                status: 404,
                message: "Not Found".to_string(),
            });
        }
        Ok(vec![WorkflowInfo {
            name: "QA US - CORE UX SMOKE E2E".to_string(),
            path: ".github/workflows/core-ux-smoke.yml".to_string(),
            state: "active".to_string(),
        }])
    }

    async fn trigger_workflow(
        &self,
        _repo: &Repository,
        _workflow_file: &str,
        _inputs: &BTreeMap<String, String>,
    ) -> Result<u64> {
        Ok(42)
    }

    async fn get_run(&self, repo: &Repository, run_id: u64) -> Result<WorkflowRun> {
        let now = chrono::Utc::now();
        Ok(WorkflowRun {
            id: run_id,
            name: None,
            status: "in_progress".to_string(),
            conclusion: None,
            html_url: repo.run_url(run_id),
            created_at: now,
            updated_at: now,
        })
    }

    async fn list_jobs(&self, _repo: &Repository, _run_id: u64) -> Result<Vec<WorkflowJob>> {
        Ok(Vec::new())
    }

    async fn job_logs(&self, _repo: &Repository, _job_id: u64) -> Result<String> {
        Ok(String::new())
    }

    async fn list_artifacts(&self, _repo: &Repository, _run_id: u64) -> Result<Vec<Artifact>> {
        Ok(Vec::new())
    }

    async fn cancel_run(&self, _repo: &Repository, _run_id: u64) -> Result<()> {
        Ok(())
    }
}

fn app() -> (Router, ApiState) {
    let mut settings = tokio_test::assert_ok!(Settings::load(None));
    settings.github_org = "acme".to_string();
    settings.default_environment = "qa".to_string();

    let resolver = IntentResolver::new(ResolverConfig::from_settings(&settings), None);
    let state = ApiState::new(settings, Arc::new(StubProvider), resolver, None);
    (create_router(state.clone()), state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_preview() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        "POST",
        "/commands/preview",
        Some(json!({ "command": "run ios tests in prod" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["technologies"], json!(["selenium"]));
    assert_eq!(body["targets"][0]["workflowName"], "Prod iOS Regression");
    assert_eq!(body["targets"][0]["repositoryFullName"], "acme/automation-framework");
    assert_eq!(
        body["targets"][0]["inputParameters"],
        json!({ "environment": "prod", "groups": "mobile" })
    );

    let (status, body) = send(
        &app,
        "POST",
        "/commands/preview",
        Some(json!({ "command": "do the nightly thing" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("Could not interpret command"));
}

#[tokio::test]
async fn test_run_command_and_history() {
    let (app, state) = app();

    let (status, body) = send(
        &app,
        "POST",
        "/commands/run",
        Some(json!({ "command": "run smoke core ux tests" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["triggered"][0]["runId"], 42);
    assert_eq!(body["failures"], json!([]));
    assert!(state.tracker.is_polling().await);

    let (status, body) = send(&app, "GET", "/runs/42", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["handle"]["target"]["inputParameters"]["groups"], "@coreUx");
    assert_eq!(body["isTerminal"], false);

    let (status, _) = send(&app, "GET", "/runs/7", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, "GET", "/chat", None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = send(&app, "GET", "/stats", None).await;
    assert_eq!(body["totalRuns"], 1);
    assert_eq!(body["phase"], "polling");

    let (status, _) = send(&app, "DELETE", "/runs", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!state.tracker.is_polling().await);

    let (_, body) = send(&app, "GET", "/runs", None).await;
    assert_eq!(body["runs"], json!([]));
    assert_eq!(body["phase"], "idle");
}

#[tokio::test]
async fn test_trigger_failure_is_reported_per_workflow() {
    let (app, _) = app();

    // The selenium repository is unknown to the stub provider.
    let (status, body) = send(
        &app,
        "POST",
        "/commands/run",
        Some(json!({ "command": "run ios tests in prod; run smoke core ux tests" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["triggered"].as_array().unwrap().len(), 1);
    assert_eq!(body["failures"].as_array().unwrap().len(), 1);
    assert_eq!(body["failures"][0]["target"]["workflowName"], "Prod iOS Regression");
}

#[tokio::test]
async fn test_cancel_untracked_run() {
    let (app, _) = app();
    let (status, _) = send(&app, "POST", "/runs/9/cancel", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_workflows() {
    let (app, _) = app();

    let (status, body) = send(&app, "GET", "/repos/acme/web-e2e/workflows", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "QA US - CORE UX SMOKE E2E");

    let (status, _) = send(&app, "GET", "/repos/acme/missing/workflows", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
