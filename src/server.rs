//! HTTP front door.
//!
//! `GET /prompt/{prompt}[/{seed}]` answers with JPEG bytes; `/feed` streams
//! dispatch announcements as server-sent events; `/models` and `/stats`
//! report the catalogue and service counters.

use actix_web::{
    http::{header::ContentType, StatusCode},
    web, App, HttpResponse, HttpServer, ResponseError,
};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    config::Config,
    error::GenError,
    models::{supported_models, GenerationRequest, RawParams},
    service::ImageService,
};

impl ResponseError for GenError {
    fn status_code(&self) -> StatusCode {
        match self {
            GenError::RetriesExhausted { .. }
            | GenError::Backend { .. }
            | GenError::InvalidOutput(_)
            | GenError::Network(_) => StatusCode::BAD_GATEWAY,
            GenError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type(ContentType::plaintext())
            .body(self.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptQuery {
    pub width: Option<String>,
    pub height: Option<String>,
    pub model: Option<String>,
    pub nologo: Option<String>,
    pub nofeed: Option<String>,
}

fn flag(value: &Option<String>) -> bool {
    matches!(value.as_deref().map(str::trim), Some("true") | Some("1") | Some(""))
}

/// Percent-decoding is done by the router; underscores stand for spaces.
pub fn prompt_from_segment(segment: &str) -> String {
    segment.replace('_', " ")
}

fn build_request(prompt: &str, seed: Option<String>, query: &PromptQuery) -> GenerationRequest {
    let raw = RawParams {
        width: query.width.clone(),
        height: query.height.clone(),
        seed,
        model: query.model.clone(),
    };
    GenerationRequest::from_prompt(prompt_from_segment(prompt), &raw)
        .with_nologo(flag(&query.nologo))
        .with_nofeed(flag(&query.nofeed))
}

async fn respond_with_image(service: &ImageService, request: GenerationRequest) -> Result<HttpResponse, GenError> {
    log::info!("Generating image for {:?}", request.prompts);
    let generation = service.generate(request).await?;
    let image = generation
        .result
        .first()
        .ok_or_else(|| GenError::InvalidOutput("Backend returned no images".to_string()))?;

    Ok(HttpResponse::Ok()
        .content_type(ContentType::jpeg())
        .insert_header(("X-Seed", generation.seed.to_string()))
        .body(image.bytes.clone()))
}

async fn prompt_image(
    service: web::Data<ImageService>,
    path: web::Path<String>,
    query: web::Query<PromptQuery>,
) -> Result<HttpResponse, GenError> {
    let prompt = path.into_inner();
    respond_with_image(&service, build_request(&prompt, None, &query)).await
}

async fn prompt_image_with_seed(
    service: web::Data<ImageService>,
    path: web::Path<(String, String)>,
    query: web::Query<PromptQuery>,
) -> Result<HttpResponse, GenError> {
    let (prompt, seed) = path.into_inner();
    respond_with_image(&service, build_request(&prompt, Some(seed), &query)).await
}

async fn feed_events(service: web::Data<ImageService>) -> HttpResponse {
    let events = BroadcastStream::new(service.feed().subscribe()).filter_map(|item| async move {
        // lagged listeners just skip what they missed
        let event = item.ok()?;
        let json = serde_json::to_string(&event).ok()?;
        Some(Ok::<_, Infallible>(web::Bytes::from(format!("data: {}\n\n", json))))
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(events)
}

async fn models() -> HttpResponse {
    HttpResponse::Ok().json(supported_models())
}

async fn stats(service: web::Data<ImageService>) -> HttpResponse {
    HttpResponse::Ok().json(service.stats())
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound()
        .content_type(ContentType::plaintext())
        .body("404: Not Found")
}

/// Register every route; shared by the binary and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/prompt/{prompt}", web::get().to(prompt_image))
        .route("/prompt/{prompt}/{seed}", web::get().to(prompt_image_with_seed))
        .route("/feed", web::get().to(feed_events))
        .route("/models", web::get().to(models))
        .route("/stats", web::get().to(stats));
}

pub async fn run(config: Config, service: Arc<ImageService>) -> std::io::Result<()> {
    let port = config.port.unwrap_or(8080);
    let data = web::Data::from(service);

    log::info!("🌐 Listening on http://{}:{}", config.bind_address, port);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(configure)
            .default_service(web::to(not_found))
    })
    .bind((config.bind_address.as_str(), port))?
    .run()
    .await
}
