use anyhow::Result;
use tracing::info;

use img2img_studio::{
    api::{AppState, create_app},
    build_backend, build_service,
    config::AppConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env()?;
    let backend = build_backend(&config)?;
    info!(
        backend = backend.kind(),
        backend_url = config.backend_url.as_ref().map(|url| url.as_str()).unwrap_or("-"),
        "image backend selected"
    );

    let service = build_service(&config, backend);
    let router = create_app(AppState::new(service.clone(), config.max_upload_bytes));
    let tcp_listener = tokio::net::TcpListener::bind(&config.bind_address).await?;

    info!(
        "img2img studio started at http://{} (public url {})",
        config.bind_address, config.public_base_url
    );

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            service.shutdown();
        })
        .await?;
    info!("server stopped");
    Ok(())
}
