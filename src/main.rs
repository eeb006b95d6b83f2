// Campus transit board API server
// Shuttle commute plans for two campus origins plus the nearby subway stop

use actix_web::{web, App, HttpServer, HttpResponse, middleware};
use actix_cors::Cors;
use clap::Parser;
use log::{error, info};
use std::sync::Arc;

mod commute_board;
mod commute_plan_client;
mod commute_plan_models;
mod subway_models;
mod time_authority;
mod transit_config;
mod transit_error;

use commute_plan_client::CommutePlanClient;
use time_authority::{Clock, SystemClock};
use transit_config::{Args, TransitConfig};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
struct AppState {
    config: Arc<TransitConfig>,
    clock: Arc<dyn Clock>,
    client: Arc<CommutePlanClient>,
}

fn request_failed() -> HttpResponse {
    HttpResponse::BadGateway().json(serde_json::json!({ "error": "request failed" }))
}

// ============================================================================
// API Endpoints
// ============================================================================

async fn get_commute_board(state: web::Data<AppState>) -> HttpResponse {
    match state.client.fetch_both().await {
        Ok(plans) => {
            let board = commute_board::build_commute_board(&state.config, state.clock.as_ref(), &plans);
            HttpResponse::Ok().json(board)
        }
        Err(e) => {
            error!("❌ Commute plan fetch failed: {}", e);
            request_failed()
        }
    }
}

async fn get_subway(state: web::Data<AppState>) -> HttpResponse {
    match subway_models::fetch_subway(state.client.http(), &state.config).await {
        Ok(doc) => {
            let board = subway_models::normalize_subway(&doc, &state.config, &state.clock.now());
            info!("🚇 Subway board: {} upcoming at {}", board.departures.len(), board.stop_name);
            HttpResponse::Ok().json(board)
        }
        Err(e) => {
            error!("❌ Subway fetch failed: {}", e);
            request_failed()
        }
    }
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "Campus Transit Board API",
        "version": SERVICE_VERSION,
        "timestamp": state.clock.now().to_rfc3339(),
    }))
}

// ============================================================================
// Server Setup
// ============================================================================

fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check)).service(
        web::scope("/api")
            .route("/commute", web::get().to(get_commute_board))
            .route("/subway", web::get().to(get_subway)),
    );
}

async fn run_server(config: TransitConfig) -> std::io::Result<()> {
    let config = Arc::new(config);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.timezone));
    let client = CommutePlanClient::new(config.clone(), clock.clone())
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let app_state = AppState {
        config: config.clone(),
        clock,
        client: Arc::new(client),
    };

    info!("🚀 Campus transit board listening on http://{}:{}", config.bind_address, config.port);
    info!("   GET  /api/commute   - shuttle arrivals for {} and {}", config.ecs.name, config.s120.name);
    info!("   GET  /api/subway    - departures at {}", config.subway.name);
    info!("   GET  /health        - health check");
    info!("🕒 Reference timezone: {}", config.timezone);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(configure_routes)
    })
        .bind((config.bind_address.as_str(), config.port))?
        .run()
        .await
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match TransitConfig::from_args(Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    actix_web::rt::System::new().block_on(run_server(config))
}
