// Stride - Main Entry Point
// Replays a recorded run through the tracking engine
// Licensed under AGPL v3

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use stride::config::Config;
use stride::engine::{RunExit, StartOptions, StopOutcome, TrackingEngine};
use stride::error::{GatewayError, RoutingError};
use stride::gateway::{FinalizedSession, PersistenceGateway, SessionSummary};
use stride::net::{HttpGateway, HttpRouter, RouteDocument};
use stride::observer::LogObserver;
use stride::output::{CsvOutput, OutputHandler};
use stride::reroute::{RerouteRequest, RerouteResult, RoutingProvider, StraightLineRouter};
use stride::source::ReplaySource;
use stride::track::{PositionSample, TrackPoint};

/// Backend selected on the command line
enum Backend {
    Http(HttpGateway),
    /// No backend configured; every call fails
    Offline,
}

fn offline() -> GatewayError {
    GatewayError::Http("no backend configured".to_string())
}

impl PersistenceGateway for Backend {
    async fn start_session(&self, route_id: Option<&str>, is_public: bool) -> Result<String, GatewayError> {
        match self {
            Backend::Http(gateway) => gateway.start_session(route_id, is_public).await,
            Backend::Offline => Err(offline()),
        }
    }

    async fn upload_points(&self, session_id: &str, points: &[TrackPoint]) -> Result<(), GatewayError> {
        match self {
            Backend::Http(gateway) => gateway.upload_points(session_id, points).await,
            Backend::Offline => Err(offline()),
        }
    }

    async fn end_session(
        &self,
        session_id: &str,
        summary: &SessionSummary,
    ) -> Result<FinalizedSession, GatewayError> {
        match self {
            Backend::Http(gateway) => gateway.end_session(session_id, summary).await,
            Backend::Offline => Err(offline()),
        }
    }
}

/// Routing provider selected on the command line
enum Router {
    Http(HttpRouter),
    StraightLine(StraightLineRouter),
}

impl RoutingProvider for Router {
    async fn compute_route(&self, request: &RerouteRequest) -> Result<RerouteResult, RoutingError> {
        match self {
            Router::Http(router) => router.compute_route(request).await,
            Router::StraightLine(router) => router.compute_route(request).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    info!("Starting stride replay");

    let samples: Vec<PositionSample> = serde_json::from_str(&std::fs::read_to_string(&config.track)?)?;
    info!("Loaded {} samples from {}", samples.len(), config.track);

    let route = match &config.route {
        Some(path) => {
            let doc: RouteDocument = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            info!("Loaded route {} ({} points)", path, doc.points.len());
            Some(doc)
        }
        None => None,
    };
    let route_id = route.as_ref().and_then(|doc| doc.id.clone());
    let plan = route.map(RouteDocument::into_plan).transpose()?;

    let mut engine_config = config.engine_config();
    let backend = match &config.backend_url {
        Some(url) => {
            info!("Backend at {}", url);
            Backend::Http(HttpGateway::new(url, config.auth_token.clone())?)
        }
        None => {
            if engine_config.live_upload {
                warn!("--live-upload needs --backend-url, ignoring");
                engine_config.live_upload = false;
            }
            info!("No backend configured, session will be discarded");
            Backend::Offline
        }
    };
    let save = matches!(backend, Backend::Http(_));

    let router = match &config.routing_url {
        Some(url) => {
            info!("Routing service at {}", url);
            Router::Http(HttpRouter::new(url, config.routing_key.clone())?)
        }
        None => Router::StraightLine(StraightLineRouter::new(engine_config.fallback_pace_s_per_m)),
    };

    let mut engine = TrackingEngine::new(engine_config, Arc::new(backend), Arc::new(router));
    engine.subscribe(Box::new(LogObserver));

    let source = ReplaySource::new(samples).with_speed(config.replay_speed);
    let rx = engine.start(
        source,
        StartOptions {
            route: plan,
            route_id,
            is_public: config.public,
        },
    )?;

    // Ctrl+C ends the run early
    let handle = engine.handle();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal (Ctrl+C)");
                if let Err(e) = handle.stop(save).await {
                    error!("Stop failed: {}", e);
                }
            }
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
    });

    let result = match engine.run(rx).await {
        RunExit::Stopped(outcome) => Ok(outcome),
        RunExit::SourceEnded => engine.stop(save).await,
    };

    let stats = engine.stats();
    info!(
        "Run finished: {:.0} m in {:.0} s, {} points, {} reroutes",
        stats.distance_m,
        stats.duration_s,
        stats.point_count,
        engine.reroutes_issued()
    );

    if let Some(path) = &config.write_csv {
        if let Some(session) = engine.session() {
            info!("Writing CSV track to {}", path);
            match CsvOutput::create(path) {
                Ok(mut csv_out) => {
                    for point in session.points() {
                        csv_out.handle_point(point);
                    }
                    if let Err(e) = csv_out.finish() {
                        error!("Failed to write CSV output file {}: {}", path, e);
                    }
                }
                Err(e) => error!("Failed to open CSV output file {}: {}", path, e),
            }
        }
    }

    match result {
        Ok(StopOutcome::Saved(session)) => {
            info!("Session saved as {}", session.id);
            Ok(())
        }
        Ok(StopOutcome::Discarded) => {
            info!("Session discarded");
            Ok(())
        }
        Err(e) => {
            error!("Saving session failed: {}", e);
            if let Err(e) = engine.stop(false).await {
                warn!("Discard failed: {}", e);
            }
            Err(e.into())
        }
    }
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_span_events(if verbose {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    if verbose {
        subscriber.with_max_level(tracing::Level::DEBUG).init();
        info!("Verbose logging enabled (DEBUG level)");
    } else {
        subscriber.with_max_level(tracing::Level::INFO).init();
    }
}
