use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use tracing::info;

use socio::config;
use socio::handlers::{configure, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "socio=info,actix_web=info".into()),
        )
        .init();

    let bind = config::bind_address();
    let state = web::Data::new(AppState::from_env());
    info!(bind = %bind, backend = %state.api.base_url(), "socio frontend listening");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind(&bind)?
    .run()
    .await?;

    Ok(())
}
