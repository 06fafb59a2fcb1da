use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;

mod api;
mod cli;
mod error;
mod metrics;
mod models;
mod services;
mod state;

use cli::CommandArgs;
use services::{spawn_schedule, Collector, Distributor, PsStatSource, QueryBuilder, Sampler, Store};
use state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CommandArgs::parse();
    let bind_address = args.bind_address();

    let store = Store::connect(&args.database_url, args.max_connections, args.query_deadline())
        .await
        .with_context(|| format!("failed to open database {}", args.database_url))?;
    store.migrate().await.context("failed to apply schema")?;
    log::info!("Database ready at {}", args.database_url);

    let collector = Arc::new(Collector::new(
        Sampler::new(PsStatSource::new()),
        store.clone(),
    ));
    let schedule = spawn_schedule(collector.clone(), args.collect_every());
    log::info!("Collecting processes every {}s", args.collect_interval);

    let builder = QueryBuilder::new(args.max_page_size);
    let distributor = Distributor::new(store.clone(), builder, args.realtime_every());
    let state = AppState::new(store.clone(), builder, distributor);

    print_banner(&args);

    let served = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(api::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("failed to bind {}", bind_address))?
    .run()
    .await;

    schedule.abort();
    collector.wait_idle().await;
    store.close().await;
    log::info!("Shut down");

    served.context("HTTP server failed")
}

fn print_banner(args: &CommandArgs) {
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║      procwatch v{:<42}║", env!("CARGO_PKG_VERSION"));
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();
    println!("🚀 Server starting on http://{}:{}", args.address, args.port);
    println!();
    println!("📋 Available endpoints:");
    println!("  GET|POST /api/processes           - Filtered, paginated process list");
    println!("  GET      /api/processes/users     - Distinct users");
    println!("  GET      /api/processes/counts    - Process and user counts");
    println!("  GET      /api/processes/reports   - Per-user totals");
    println!("  GET      /api/processes/realtime  - WebSocket snapshot feed");
    println!("  GET      /metrics                 - Prometheus metrics");
    println!("  GET      /health                  - Health check");
    println!();
    println!("💡 Intervals:");
    println!("  • collect  every {}s", args.collect_interval);
    println!("  • realtime every {}s", args.realtime_interval);
    println!("═══════════════════════════════════════════════════════════");
}
