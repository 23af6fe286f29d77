use adjoin_daemon::config::DaemonConfig;
use adjoin_daemon::features::domain_join::controller::DomainJoinController;
use adjoin_daemon::features::domain_join::service::DomainJoinService;
use adjoin_daemon::features::instance_directory::repo::http::HttpInstanceDirectory;
use adjoin_daemon::features::notification::repo::mqtt::MqttNotificationSink;
use adjoin_daemon::features::observability::controller::ObservabilityController;
use adjoin_daemon::features::observability::repo::ObservabilityRepository;
use adjoin_daemon::features::observability::service::ObservabilityService;
use adjoin_daemon::features::remote_shell::repo::process::ProcessCommandChannel;
use adjoin_daemon::{runtime, server};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("adjoin_daemon=info,info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = DaemonConfig::from_env()?;
    info!(
        domain = %config.ad.domain,
        directory = %config.directory_url,
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        "Starting domain join daemon"
    );

    let metrics = ObservabilityService::new(Arc::new(ObservabilityRepository::new()?));
    if let Some(addr) = config.metrics_addr {
        let controller = Arc::new(ObservabilityController::new(metrics.clone()));
        tokio::spawn(async move {
            if let Err(error) = server::serve(addr, controller).await {
                error!(error = %error, "Metrics server stopped");
            }
        });
    }

    let directory = Arc::new(HttpInstanceDirectory::new(
        &config.directory_url,
        config.directory_timeout,
    )?);
    let channel = Arc::new(ProcessCommandChannel::new(
        &config.remote_shell_program,
        config.remote_shell_args.clone(),
        config.remote_shell_timeout,
    ));
    let (sink, event_loop) = MqttNotificationSink::new(&config.mqtt);
    let sink = Arc::new(sink);
    let event_loop = sink.spawn_event_loop(event_loop);

    let service = Arc::new(
        DomainJoinService::new(
            directory,
            channel,
            sink.clone(),
            config.ad.clone(),
            metrics.clone(),
        )
        .with_admin_user(&config.admin_user),
    );
    let controller = DomainJoinController::new(service, metrics);

    let stdin = BufReader::new(tokio::io::stdin());
    let stats = runtime::run_json_lines(stdin, &controller, config.redelivery_delay).await;
    info!(
        delivered = stats.delivered,
        acked = stats.acked,
        redelivered = stats.redelivered,
        rejected = stats.rejected,
        "Input exhausted; shutting down"
    );
    sink.shutdown(event_loop).await;

    Ok(())
}
