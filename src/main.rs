use order_relay::call_store::{CallStore, MemoryCallStore, PgCallStore};
use order_relay::config::RelayConfig;
use order_relay::handlers;
use order_relay::types::AppState;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            ("tower_http", tracing_subscriber::filter::LevelFilter::DEBUG),
            ("order_relay", tracing_subscriber::filter::LevelFilter::DEBUG),
        ]));
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let config = RelayConfig::from_env().expect("relay configuration error");

    // With a database configured, call correlation survives restarts and can
    // be shared across instances; otherwise it lives for the process only.
    let calls: Arc<dyn CallStore> = match config.database_url.clone() {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
                .expect("failed to connect to call store database");
            sqlx::migrate!()
                .run(&pool)
                .await
                .expect("failed to run call store migrations");
            info!("using postgres call store");
            Arc::new(PgCallStore::new(pool))
        }
        None => {
            info!("no DATABASE_URL set; using in-memory call store");
            Arc::new(MemoryCallStore::new())
        }
    };

    let port = config.port;
    let app_state =
        Arc::new(AppState::new(config, calls).expect("relay signing configuration error"));
    let app = handlers::router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "order relay listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
