//! HTTP server for the NLQ assistant
//! Small HTTP/1.1 server on a raw tokio listener, one request per connection.

use anyhow::Context;
use clap::Parser;
use indexmap::IndexMap;
use nlq_assistant::llm::{LlmClient, TextGenerator};
use nlq_assistant::{AppConfig, DataAssistant, NlqError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const MAX_HEADER_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 1024 * 1024;
const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "HTTP API for natural-language questions over tabular datasets")]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

struct AppState {
    /// In configuration order; the first one serves `POST /ask`
    assistants: IndexMap<String, Arc<DataAssistant>>,
}

impl AppState {
    fn default_assistant(&self) -> Option<&Arc<DataAssistant>> {
        self.assistants.values().next()
    }
}

struct Request {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: String,
}

#[derive(Deserialize)]
struct AskBody {
    #[serde(default)]
    question: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    if config.llm.api_key.is_some() {
        info!("✅ LLM API key found");
    } else {
        warn!("⚠️  No LLM API key set; only keyless endpoints (e.g. a local Ollama) will work");
    }
    let llm = LlmClient::new(&config.llm)?;
    info!("🤖 Model: {}", llm.model());
    let generator: Arc<dyn TextGenerator> = Arc::new(llm);

    let mut assistants = IndexMap::new();
    for dataset in &config.datasets {
        let assistant = DataAssistant::from_config(dataset, &config, generator.clone())
            .with_context(|| format!("failed to load dataset '{}'", dataset.name))?;
        info!("📊 Dataset '{}' ready", dataset.name);
        assistants.insert(dataset.name.clone(), Arc::new(assistant));
    }
    let state = Arc::new(AppState { assistants });

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("🚀 Server listening on http://{}", config.bind_addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("📥 New connection from: {}", addr);
        tokio::spawn(handle_connection(stream, state.clone()));
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<AppState>) {
    let request_id = Uuid::new_v4();
    let response = match read_request(&mut stream).await {
        Ok(Some(request)) => {
            info!(%request_id, "🔍 Request: {} {}", request.method, request.path);
            handle_request(&state, &request).await
        }
        Ok(None) => create_response(400, r#"{"detail":"Bad Request"}"#, None),
        Err(e) => {
            error!(%request_id, "Failed to read from stream: {}", e);
            return;
        }
    };

    if let Err(e) = stream.write_all(response.as_bytes()).await {
        error!(%request_id, "Failed to write response: {}", e);
    }
}

/// Read the head, then as many body bytes as `Content-Length` announces.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<Request>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let size = stream.read(&mut chunk).await?;
        if size == 0 {
            return Ok(None);
        }
        buffer.extend_from_slice(&chunk[..size]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if buffer.len() > MAX_HEADER_BYTES {
            return Ok(None);
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Ok(None);
    }

    let method = parts[0].to_string();
    let mut path = parts[1].to_string();
    if let Some(query_start) = path.find('?') {
        path.truncate(query_start);
    }

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Ok(None);
    }
    while buffer.len() < header_end + content_length {
        let size = stream.read(&mut chunk).await?;
        if size == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..size]);
    }
    let body_end = (header_end + content_length).min(buffer.len());
    let body = String::from_utf8_lossy(&buffer[header_end..body_end]).to_string();

    Ok(Some(Request {
        method,
        path,
        headers,
        body,
    }))
}

async fn handle_request(state: &AppState, request: &Request) -> String {
    let segments: Vec<&str> = request.path.split('/').filter(|s| !s.is_empty()).collect();

    match (request.method.as_str(), segments.as_slice()) {
        ("OPTIONS", _) => create_response(204, "", None),
        ("GET", ["api", "health"]) => {
            create_response(200, r#"{"status":"ok","service":"nlq-assistant"}"#, None)
        }
        ("GET", ["api", "datasets"]) => {
            let datasets: Vec<serde_json::Value> = state
                .assistants
                .values()
                .map(|a| {
                    serde_json::json!({
                        "name": a.name(),
                        "table": a.engine().table_name(),
                        "columns": a.catalog().len(),
                        "rows": a.engine().frame().height(),
                    })
                })
                .collect();
            json_response(200, &serde_json::json!({ "datasets": datasets }), None)
        }
        ("POST", ["ask"]) => match state.default_assistant() {
            Some(assistant) => ask(assistant, request).await,
            None => not_found("no dataset configured"),
        },
        ("POST", [dataset, action]) => {
            let Some(assistant) = state.assistants.get(*dataset) else {
                return not_found(&format!("unknown dataset: {}", dataset));
            };
            match *action {
                "ask" => ask(assistant, request).await,
                "keywords" => keywords(assistant, request),
                "reset" => {
                    let from_body = serde_json::from_str::<AskBody>(&request.body)
                        .ok()
                        .and_then(|body| body.session_id);
                    let session_id = match session_id(request, from_body.as_deref()) {
                        Ok(id) => id,
                        Err(response) => return response,
                    };
                    let cleared = assistant.reset(&session_id).await;
                    json_response(
                        200,
                        &serde_json::json!({ "session_id": session_id, "cleared": cleared }),
                        Some(&session_id),
                    )
                }
                _ => not_found("Not Found"),
            }
        }
        _ => not_found("Not Found"),
    }
}

async fn ask(assistant: &DataAssistant, request: &Request) -> String {
    let body = match parse_body(request) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let session_id = match session_id(request, body.session_id.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match assistant.ask(&session_id, &body.question).await {
        Ok(outcome) => json_response(200, &outcome, Some(&session_id)),
        Err(e) => error_response(&e, Some(&session_id)),
    }
}

fn keywords(assistant: &DataAssistant, request: &Request) -> String {
    let body = match parse_body(request) {
        Ok(body) => body,
        Err(response) => return response,
    };
    match assistant.analyze(&body.question) {
        Ok(report) => json_response(200, &report, None),
        Err(NlqError::NoKeywordsFound) => {
            json_response(200, &serde_json::json!({ "keywords": [], "mapping": {} }), None)
        }
        Err(e) => error_response(&e, None),
    }
}

fn parse_body(request: &Request) -> Result<AskBody, String> {
    let body: AskBody = serde_json::from_str(&request.body).map_err(|e| {
        json_response(400, &serde_json::json!({ "detail": format!("Invalid JSON body: {}", e) }), None)
    })?;
    if body.question.trim().is_empty() {
        return Err(create_response(400, r#"{"detail":"question is required"}"#, None));
    }
    Ok(body)
}

/// `X-Session-Id` header, else the body's `session_id`, else a fresh id the
/// client reads back from the response header. Supplied ids must be visible
/// ASCII, since they are echoed in a header.
fn session_id(request: &Request, from_body: Option<&str>) -> Result<String, String> {
    let supplied = request
        .headers
        .get("x-session-id")
        .map(String::as_str)
        .or(from_body)
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match supplied {
        Some(id) if id.len() <= MAX_SESSION_ID_LEN && id.chars().all(|c| c.is_ascii_graphic()) => {
            Ok(id.to_string())
        }
        Some(_) => Err(create_response(
            400,
            r#"{"detail":"session id must be at most 128 visible ASCII characters"}"#,
            None,
        )),
        None => Ok(Uuid::new_v4().to_string()),
    }
}

fn error_response(err: &NlqError, session_id: Option<&str>) -> String {
    let body = match err {
        NlqError::TooManyClarificationValues { .. } => serde_json::json!({ "message": err.user_message() }),
        _ => serde_json::json!({ "detail": err.user_message() }),
    };
    json_response(err.status_code(), &body, session_id)
}

fn not_found(detail: &str) -> String {
    json_response(404, &serde_json::json!({ "detail": detail }), None)
}

fn json_response<T: serde::Serialize>(status: u16, body: &T, session_id: Option<&str>) -> String {
    match serde_json::to_string(body) {
        Ok(json) => create_response(status, &json, session_id),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            create_response(500, r#"{"detail":"Failed to serialize response"}"#, session_id)
        }
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => "Internal Server Error",
    }
}

fn create_response(status: u16, body: &str, session_id: Option<&str>) -> String {
    let session_header = session_id
        .map(|id| format!("X-Session-Id: {}\r\n", id))
        .unwrap_or_default();
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type, X-Session-Id\r\n\
         Access-Control-Expose-Headers: X-Session-Id\r\n\
         {}\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text(status),
        session_header,
        body.len(),
        body
    )
}
