use std::sync::Arc;

use email_responder::channels::{MailTransport, MailgunTransport, Mailer, SmtpMailTransport, Templates};
use email_responder::config::ResponderConfig;
use email_responder::pipeline::EmailPipeline;
use email_responder::responder::{AnswerService, HttpAnswerService};
use email_responder::store::{Database, LibSqlBackend};
use email_responder::webhook::{AppState, webhook_routes};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ResponderConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export MAILGUN_API_KEY=... MAILGUN_DOMAIN=... RESPONDER_API_URL=...");
        std::process::exit(1);
    });

    eprintln!("📬 Email Responder v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhooks: http://0.0.0.0:{}/email/inbound", config.port);
    eprintln!("   Responder API: {}", config.responder_api_url);
    eprintln!("   Relay domain: {}", config.mailgun.domain);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Outbound mail ────────────────────────────────────────────────────
    let transport: Arc<dyn MailTransport> = match &config.smtp {
        Some(smtp) => {
            eprintln!("   Outbound: SMTP via {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpMailTransport::new(smtp)?)
        }
        None => {
            eprintln!("   Outbound: Mailgun API");
            Arc::new(MailgunTransport::new(&config.mailgun))
        }
    };
    let mailer = Arc::new(Mailer::new(transport, config.mailgun.domain.clone()));

    let responder: Arc<dyn AnswerService> =
        Arc::new(HttpAnswerService::new(config.responder_api_url.clone()));

    let templates = Templates {
        sender_name: config.sender_name.clone(),
        site_url: config.site_url.clone(),
        ui_url: config.ui_url.clone(),
    };
    let pipeline = EmailPipeline::new(Arc::clone(&db), responder, mailer, templates)
        .with_default_email(config.default_email.clone());

    let app = webhook_routes(AppState {
        db,
        pipeline: Arc::new(pipeline),
        signing_key: config.mailgun.signing_key.clone(),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "Webhook server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
