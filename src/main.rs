//! `gpsntpd`: GPS-disciplined time server daemon.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use gpsntp::gps::DEFAULT_SENTENCE_TAG;
use gpsntp::protocol::ntp::NTP_PORT;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "gpsntpd",
    version,
    about = "Serve time disciplined by a GPS receiver's NMEA stream and PPS pulse."
)]
struct Args {
    /// Serial device of the GPS receiver
    #[arg(long, value_name = "PATH", default_value = "/dev/ttyACM0")]
    device: PathBuf,

    /// Serial line speed
    #[arg(long, default_value_t = 38_400)]
    baud: u32,

    /// GPIO pin carrying the PPS signal
    #[arg(long, value_name = "PIN", default_value_t = 18)]
    gpio_pin: u32,

    /// PPS edge to capture (rising, falling or both)
    #[arg(long, default_value = "falling")]
    edge: String,

    /// Minimum spacing between accepted PPS edges
    #[arg(long, value_name = "MS", default_value_t = 300)]
    debounce_ms: u64,

    /// Address to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// UDP port to listen on
    #[arg(long, default_value_t = NTP_PORT)]
    port: u16,

    /// Oldest PPS edge a date/time sentence may pair with
    #[arg(long, value_name = "MS", default_value_t = 2_000)]
    max_edge_age_ms: u64,

    /// Date/time sentence to use ($GNZDA for multi-constellation receivers)
    #[arg(long, default_value = DEFAULT_SENTENCE_TAG)]
    sentence_tag: String,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "gpsntpd exiting");
            ExitCode::FAILURE
        }
    }
}

#[cfg(target_os = "linux")]
async fn run(args: Args) -> gpsntp::Result<()> {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use gpsntp::hardware::{Edge, GpioConfig, GpioEdgeSource, SerialDevice};
    use gpsntp::{EdgeCapture, GpsNtpError, ServerConfig, TimeServer, system_clock};

    let edge = args
        .edge
        .parse::<Edge>()
        .map_err(|message| GpsNtpError::InvalidConfig {
            name: "edge".to_string(),
            message,
        })?;
    let config = ServerConfig::builder()
        .bind_addr(SocketAddr::new(args.bind, args.port))
        .max_edge_age(Duration::from_millis(args.max_edge_age_ms))
        .sentence_tag(args.sentence_tag)
        .build();

    let clock = system_clock();
    let capture = Arc::new(EdgeCapture::with_clock(clock.clone()));
    let server = TimeServer::bind(config, capture.clone(), clock).await?;
    let device = SerialDevice::open(&args.device, args.baud)?;
    let edges = GpioEdgeSource::start(
        &GpioConfig {
            pin: args.gpio_pin,
            edge,
            debounce: Duration::from_millis(args.debounce_ms),
            ..GpioConfig::default()
        },
        capture,
    )?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let report = server.run(device, edges, cancel).await?;
    tracing::info!(
        served = report.responder.served,
        published = report.ingest.published,
        "gpsntpd stopped"
    );
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn run(_args: Args) -> gpsntp::Result<()> {
    Err(gpsntp::GpsNtpError::InvalidConfig {
        name: "platform".to_string(),
        message: "serial and GPIO access is only implemented for Linux".to_string(),
    })
}

/// Cancel on SIGINT or SIGTERM.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
async fn cancel_on_signal(cancel: CancellationToken) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => tracing::info!("SIGINT received, shutting down"),
        () = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
    cancel.cancel();
}
