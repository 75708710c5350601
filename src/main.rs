use std::{process, time::Duration};

use tokio::try_join;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use trellis::{
    application::error::AppError,
    config,
    infra::{
        bootstrap::{self, ApplicationContext},
        error::InfraError,
        http::{self, AdminState, HttpState},
        telemetry,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Check(_) => run_check(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let ApplicationContext { http, admin, .. } = bootstrap::load_application(&settings).await?;
    serve_http(&settings, http, admin).await
}

async fn run_check(settings: config::Settings) -> Result<(), AppError> {
    let context = bootstrap::load_application(&settings).await?;
    info!(
        file = %settings.content.file.display(),
        sites = context.summary.sites,
        pages = context.summary.pages,
        contents = context.summary.contents,
        "content archive is valid"
    );
    println!(
        "{}: {} site(s), {} page(s), {} content(s)",
        settings.content.file.display(),
        context.summary.sites,
        context.summary.pages,
        context.summary.contents
    );
    Ok(())
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listening"
    );

    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());

    tokio::select! {
        result = async { try_join!(public_server, admin_server) } => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = shutdown_deadline(settings.server.graceful_shutdown) => {
            warn!(
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn shutdown_deadline(grace: Duration) {
    shutdown_signal().await;
    tokio::time::sleep(grace).await;
}
