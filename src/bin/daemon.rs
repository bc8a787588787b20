use clap::Parser;
use garden_monitoring::actors::{alert::AlertHandle, poller::PollerHandle};
use garden_monitoring::config::{AcquisitionConfig, read_config_file};
use tokio::sync::broadcast;
use tracing::{debug, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (JSON); defaults apply when omitted
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("garden_monitoring", LevelFilter::TRACE),
        ("gardend", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => AcquisitionConfig::default(),
    };

    info!(
        "acquiring from {} every {}ms",
        config.endpoint_url, config.poll_interval_ms
    );

    let poller = PollerHandle::spawn(config);
    let alerts = AlertHandle::spawn(poller.subscribe());

    // mirror the stream to the log so an attached operator can follow
    // acquisition without a frontend
    let mut events = poller.subscribe();
    let stream_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match event.reading {
                    Some(reading) => info!(
                        "reading: {:.1}°C, {:.1}% humidity, {:.1}% soil moisture",
                        reading.temperature, reading.humidity, reading.soil_moisture
                    ),
                    None => debug!("tick without reading (disconnected)"),
                },
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    poller.shutdown().await?;
    alerts.shutdown().await;
    stream_logger.abort();

    Ok(())
}
