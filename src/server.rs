//! HTTP surface: an upload form and a multipart endpoint that answers with
//! one linearized PDF or a streamed ZIP of many.
//!
//! ```text
//! GET  /           upload form
//! POST /linearize  multipart/form-data, repeated field `files`
//! GET  /healthz    liveness check
//! ```
//!
//! Response bodies are produced by a spawned pipeline task writing into an
//! in-memory pipe whose read half becomes the body stream. A client that
//! disconnects closes the pipe; the pipeline then sees a write error, stops,
//! and cleans up after itself.

use crate::batch;
use crate::config::LinearizeConfig;
use crate::error::LinearizeError;
use crate::output::ResponseShape;
use crate::pipeline::adapter::Linearizer;
use crate::pipeline::input::{display_name, Input, InputSource};
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

/// Capacity of the pipe between the pipeline task and the response body.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Multipart field carrying the uploaded documents.
const FILES_FIELD: &str = "files";

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>PDF Linearizer</title>
  <style>
    body { font-family: system-ui, sans-serif; max-width: 40rem; margin: 4rem auto; }
    form { display: flex; flex-direction: column; gap: 1rem; }
  </style>
</head>
<body>
  <h1>PDF Linearizer</h1>
  <p>Upload one PDF to get it back linearized, or several to get a ZIP.</p>
  <form action="/linearize" method="post" enctype="multipart/form-data">
    <input type="file" name="files" accept="application/pdf" multiple required>
    <button type="submit">Linearize</button>
  </form>
</body>
</html>
"#;

#[derive(Clone)]
struct AppState {
    linearizer: Linearizer,
    config: Arc<LinearizeConfig>,
}

/// Build the router with a qpdf-backed linearizer from `config`.
pub fn router(config: LinearizeConfig) -> Router {
    let linearizer = Linearizer::from_config(&config);
    router_with(linearizer, config)
}

/// Build the router around an explicit [`Linearizer`].
pub fn router_with(linearizer: Linearizer, config: LinearizeConfig) -> Router {
    let body_limit = config.max_upload_bytes;
    let state = AppState {
        linearizer,
        config: Arc::new(config),
    };
    Router::new()
        .route("/", get(index))
        .route("/linearize", post(linearize))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind `config.bind_addr` and serve until Ctrl-C.
pub async fn serve(config: LinearizeConfig) -> Result<(), LinearizeError> {
    let addr = config.bind_addr;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| LinearizeError::Bind { addr, source: e })?;
    serve_on(listener, router(config)).await
}

/// Serve `app` on an already-bound listener until Ctrl-C.
pub async fn serve_on(listener: TcpListener, app: Router) -> Result<(), LinearizeError> {
    match listener.local_addr() {
        Ok(addr) => info!("Listening on http://{}", addr),
        Err(e) => warn!("Listening on an unknown address: {}", e),
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(LinearizeError::Server)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn linearize(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let inputs = match multipart {
        Ok(multipart) => read_batch(multipart).await,
        Err(rejection) => Err(LinearizeError::MalformedBatch {
            detail: rejection.body_text(),
        }),
    };
    let inputs = match inputs {
        Ok(inputs) => inputs,
        Err(e) => return error_response(e),
    };
    let shape = match batch::plan_response(&inputs, &state.config) {
        Ok(shape) => shape,
        Err(e) => return error_response(e),
    };

    match shape {
        ResponseShape::Single { .. } => match inputs.into_iter().next() {
            Some(input) => single_response(state.linearizer, input, shape).await,
            None => error_response(LinearizeError::NoInputs),
        },
        ResponseShape::Archive { .. } => archive_response(state, inputs, shape),
    }
}

/// Collect every `files` part into an [`Input`].
///
/// Browsers submit an empty part with no filename when nothing was picked;
/// those are ignored.
async fn read_batch(mut multipart: Multipart) -> Result<Vec<Input>, LinearizeError> {
    let malformed = |e: axum::extract::multipart::MultipartError| LinearizeError::MalformedBatch {
        detail: e.body_text(),
    };

    let mut inputs = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let raw_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(malformed)?;
        if bytes.is_empty() && raw_name.as_deref().unwrap_or("").is_empty() {
            continue;
        }
        let name = display_name(raw_name.as_deref(), inputs.len() + 1);
        info!("Received '{}' ({} bytes)", name, bytes.len());
        inputs.push(Input::with_name(name, InputSource::Bytes(bytes)));
    }
    Ok(inputs)
}

async fn single_response(linearizer: Linearizer, input: Input, shape: ResponseShape) -> Response {
    let name = input.name().to_string();
    let (reader, mut writer) = tokio::io::duplex(PIPE_CAPACITY);
    let task = tokio::spawn(async move {
        let result = batch::linearize_single(&linearizer, &input, &mut writer).await;
        if result.is_ok() {
            let _ = writer.shutdown().await;
        }
        result
    });

    // Headers are committed with the first byte; until then a failure can
    // still become a proper error response.
    let mut body = ReaderStream::new(reader);
    match body.next().await {
        Some(Ok(first)) => {
            let rest = futures::stream::once(async move { Ok::<_, std::io::Error>(first) })
                .chain(body);
            attachment(&shape, Body::from_stream(rest))
        }
        Some(Err(e)) => error_response(LinearizeError::Internal(e.to_string())),
        None => match task.await {
            Ok(Err(e)) => error_response(e),
            Ok(Ok(())) => error_response(LinearizeError::Transform {
                name,
                detail: "produced no output".into(),
            }),
            Err(e) => error_response(LinearizeError::Internal(e.to_string())),
        },
    }
}

fn archive_response(state: AppState, inputs: Vec<Input>, shape: ResponseShape) -> Response {
    let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
    tokio::spawn(async move {
        let mut writer = BufWriter::with_capacity(PIPE_CAPACITY, writer);
        match batch::linearize_batch(&state.linearizer, inputs, &mut writer, &state.config).await
        {
            Ok(summary) => {
                if let Err(e) = writer.shutdown().await {
                    warn!("Closing archive stream failed: {}", e);
                }
                info!(
                    "Sent archive with {}/{} documents",
                    summary.succeeded, summary.total
                );
            }
            Err(e) => warn!("Archive response aborted: {}", e),
        }
    });
    attachment(&shape, Body::from_stream(ReaderStream::new(reader)))
}

fn attachment(shape: &ResponseShape, body: Body) -> Response {
    let disposition = HeaderValue::from_bytes(shape.content_disposition().as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(shape.content_type())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

fn error_response(e: LinearizeError) -> Response {
    let (status, message) = match e {
        LinearizeError::NoInputs => (StatusCode::BAD_REQUEST, "no files uploaded".to_string()),
        LinearizeError::MalformedBatch { ref detail } => {
            warn!("Rejected upload: {}", detail);
            (StatusCode::BAD_REQUEST, "could not read form".to_string())
        }
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    };
    (status, message).into_response()
}
