use std::sync::Arc;

use anyhow::{anyhow, Result};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::figment::Figment;
use rocket::http::{Header, Status};
use rocket::request::Request;
use rocket::serde::json::{Error as JsonError, Json};
use rocket::{catch, catchers, get, options, post, routes, Build, Response, Rocket, State};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use common::Config;

use crate::error::{ErrorBody, SummariseError};
use crate::extraction::ContentExtractor;
use crate::job_status::JobStatus;
use crate::service::{validate_text, SummarisationService, SummaryMetadata, SummaryParams, SummaryResult};
use crate::tasks::{TaskState, TaskStore};

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SummarisationService>,
    pub extractor: Arc<ContentExtractor>,
    pub tasks: Arc<TaskStore<SummaryResponse>>,
    /// Extracted pages shorter than this are rejected as insufficient content
    pub min_content_chars: usize,
}

/// Optional generation settings shared by every summarise request.
#[derive(Debug, Default, Deserialize)]
pub struct SummaryOptions {
    pub max_length: Option<usize>,
    pub min_length: Option<usize>,
    pub do_sample: Option<bool>,
    pub temperature: Option<f32>,
}

impl SummaryOptions {
    /// Fill defaults and validate ranges.
    pub fn into_params(self) -> Result<SummaryParams, SummariseError> {
        let defaults = SummaryParams::default();
        let params = SummaryParams {
            max_length: self.max_length.unwrap_or(defaults.max_length),
            min_length: self.min_length.unwrap_or(defaults.min_length),
            do_sample: self.do_sample.unwrap_or(defaults.do_sample),
            temperature: self.temperature.unwrap_or(defaults.temperature),
        };
        params.validate()?;
        Ok(params)
    }
}

#[derive(Debug, Deserialize)]
pub struct TextSummaryRequest {
    pub text: String,
    #[serde(flatten)]
    pub options: SummaryOptions,
}

#[derive(Debug, Deserialize)]
pub struct UrlSummaryRequest {
    pub url: String,
    #[serde(flatten)]
    pub options: SummaryOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Text,
    Url,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub original_text_length: usize,
    pub summary: String,
    pub summary_length: usize,
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub metadata: SummaryMetadata,
}

impl SummaryResponse {
    fn new(original: &str, result: SummaryResult, source_type: SourceType, source_url: Option<String>) -> Self {
        Self {
            original_text_length: original.chars().count(),
            summary_length: result.summary.chars().count(),
            summary: result.summary,
            source_type,
            source_url,
            metadata: result.metadata,
        }
    }
}

#[derive(Debug, Serialize)]
struct TaskAccepted {
    task_id: Uuid,
    status: &'static str,
}

type ApiResult<T> = std::result::Result<Json<T>, SummariseError>;

fn parse_body<T>(body: std::result::Result<Json<T>, JsonError<'_>>) -> std::result::Result<T, SummariseError> {
    body.map(Json::into_inner)
        .map_err(|e| SummariseError::Validation(format!("Invalid request body: {}", e)))
}

#[get("/health")]
async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

#[post("/api/summarise", data = "<body>")]
async fn summarise(
    state: &State<AppState>,
    body: std::result::Result<Json<TextSummaryRequest>, JsonError<'_>>,
) -> ApiResult<SummaryResponse> {
    let req = parse_body(body)?;
    validate_text(&req.text)?;
    let params = req.options.into_params()?;

    let result = state.service.summarise(&req.text, &params).await?;
    Ok(Json(SummaryResponse::new(&req.text, result, SourceType::Text, None)))
}

#[post("/api/summarise-url", data = "<body>")]
async fn summarise_url(
    state: &State<AppState>,
    body: std::result::Result<Json<UrlSummaryRequest>, JsonError<'_>>,
) -> ApiResult<SummaryResponse> {
    let req = parse_body(body)?;
    let params = req.options.into_params()?;

    let content = state.extractor.extract(&req.url).await?;
    let found = content.chars().count();
    if found < state.min_content_chars {
        warn!(url = %req.url, found, "insufficient content extracted");
        return Err(SummariseError::InsufficientContent {
            found,
            required: state.min_content_chars,
        });
    }

    let result = state.service.summarise_web_content(&content, &params).await?;
    Ok(Json(SummaryResponse::new(&content, result, SourceType::Url, Some(req.url))))
}

/// Snapshot of the most recent summarisation job.
#[get("/api/status")]
async fn status(state: &State<AppState>) -> Json<JobStatus> {
    Json(state.service.tracker().snapshot())
}

/// Accept a summarisation and run it in the background. Validation errors are
/// still reported synchronously; later failures land in the task record.
#[post("/api/async/summarise-async", data = "<body>")]
async fn summarise_async(
    state: &State<AppState>,
    body: std::result::Result<Json<TextSummaryRequest>, JsonError<'_>>,
) -> ApiResult<TaskAccepted> {
    let TextSummaryRequest { text, options } = parse_body(body)?;
    validate_text(&text)?;
    let params = options.into_params()?;

    let task_id = state.tasks.create()?;
    let service = Arc::clone(&state.service);
    let tasks = Arc::clone(&state.tasks);
    tokio::spawn(async move {
        match service.summarise(&text, &params).await {
            Ok(result) => {
                tasks.complete(task_id, SummaryResponse::new(&text, result, SourceType::Text, None));
                info!(%task_id, "background summary completed");
            }
            Err(e) => {
                error!(%task_id, error = ?e, "background summary failed");
                tasks.fail(task_id, e.to_string());
            }
        }
    });

    Ok(Json(TaskAccepted {
        task_id,
        status: "processing",
    }))
}

#[get("/api/async/summary-status/<task_id>")]
async fn summary_status(
    state: &State<AppState>,
    task_id: &str,
) -> std::result::Result<Json<TaskState<SummaryResponse>>, (Status, Json<ErrorBody>)> {
    Uuid::parse_str(task_id)
        .ok()
        .and_then(|id| state.tasks.get(&id))
        .map(Json)
        .ok_or_else(|| (Status::NotFound, ErrorBody::new("Task not found")))
}

/// CORS preflight for any path; headers are added by the `Cors` fairing.
#[options("/<_..>")]
async fn preflight() -> Status {
    Status::NoContent
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request<'_>) -> (Status, Json<ErrorBody>) {
    (status, ErrorBody::new(status.reason_lossy()))
}

/// Adds CORS headers for requests whose `Origin` is on the allow list.
pub struct Cors {
    allowed_origins: Vec<String>,
}

impl Cors {
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self { allowed_origins }
    }

    fn allows(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == "*" || o == origin)
    }
}

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let Some(origin) = req.headers().get_one("Origin") else {
            return;
        };
        if !self.allows(origin) {
            return;
        }
        let allow_headers = req
            .headers()
            .get_one("Access-Control-Request-Headers")
            .unwrap_or("Content-Type, Authorization")
            .to_string();

        res.set_header(Header::new("Access-Control-Allow-Origin", origin.to_string()));
        res.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
        res.set_header(Header::new("Access-Control-Allow-Methods", "GET, POST, OPTIONS"));
        res.set_header(Header::new("Access-Control-Allow-Headers", allow_headers));
        res.set_header(Header::new("Vary", "Origin"));
    }
}

/// Assemble the Rocket instance without launching it.
pub fn build_rocket(state: AppState, figment: Figment, cors_origins: Vec<String>) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(state)
        .attach(Cors::new(cors_origins))
        .mount(
            "/",
            routes![
                health,
                summarise,
                summarise_url,
                status,
                summarise_async,
                summary_status,
                preflight,
            ],
        )
        .register("/", catchers![default_catcher])
}

/// Build and launch the HTTP server, binding to `server.bind`/`server.port`.
///
/// Blocks until Rocket shuts down and returns an error if it fails to start.
pub async fn launch_rocket(state: AppState, config: &Config) -> Result<()> {
    let figment = rocket::Config::figment()
        .merge(("address", config.bind()))
        .merge(("port", config.port()));

    let rocket = build_rocket(state, figment, config.cors_origins());

    info!(bind = %config.bind(), port = config.port(), "Starting Rocket HTTP server");
    rocket
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    info!("Rocket HTTP server has shut down");
    Ok(())
}
