//! `ntpquery`: ask a time server for the time and print every reply field.

use std::process::ExitCode;
use std::time::Duration;

use chrono::DateTime;
use clap::Parser;
use gpsntp::client::{QueryResult, query};
use gpsntp::protocol::ntp::{NTP_PORT, NtpTimestamp};
use gpsntp::{GpsNtpError, SystemClock, WallClock};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ntpquery", version, about = "Query a time server once.")]
struct Args {
    /// Server host name or address
    #[arg(short, long, default_value = "127.0.0.1")]
    server: String,

    /// Server UDP port
    #[arg(short, long, default_value_t = NTP_PORT)]
    port: u16,

    /// How long to wait for the reply
    #[arg(long, value_name = "MS", default_value_t = 5_000)]
    timeout_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
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

    match run(&args).await {
        Ok(result) => {
            print_result(&result);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("ntpquery: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> gpsntp::Result<QueryResult> {
    let server = tokio::net::lookup_host((args.server.as_str(), args.port))
        .await?
        .next()
        .ok_or_else(|| GpsNtpError::InvalidConfig {
            name: "server".to_string(),
            message: format!("{} did not resolve to an address", args.server),
        })?;
    query(server, Duration::from_millis(args.timeout_ms)).await
}

fn print_result(result: &QueryResult) {
    let reply = &result.reply;
    let fields: [(&str, String); 15] = [
        ("li", reply.leap_indicator.to_string()),
        ("status", reply.status.to_string()),
        ("type", reply.packet_type.to_string()),
        ("prec", reply.precision.to_string()),
        ("est_error", reply.estimated_error.to_string()),
        ("est_drift_rate", reply.estimated_drift_rate.to_string()),
        (
            "ref_clock_id",
            format!(
                "{:#010x} ({:?})",
                reply.reference_clock_id,
                reply.reference_id_tag()
            ),
        ),
        ("ref_time_int", reply.reference_time.seconds.to_string()),
        ("ref_time_frac", reply.reference_time.fraction.to_string()),
        ("orig_time_int", reply.originate_time.seconds.to_string()),
        ("orig_time_frac", reply.originate_time.fraction.to_string()),
        ("rec_time_int", reply.receive_time.seconds.to_string()),
        ("rec_time_frac", reply.receive_time.fraction.to_string()),
        ("trans_time_int", reply.transmit_time.seconds.to_string()),
        ("trans_time_frac", reply.transmit_time.fraction.to_string()),
    ];
    for (name, value) in &fields {
        println!("{name:>17} {value}");
    }
    println!("{:>17} {}", "rec_time", utc(reply.receive_time));
    println!("{:>17} {}", "trans_time", utc(reply.transmit_time));

    println!("Response received from: {}", result.server);
    println!(
        "\tTime={} Now={}",
        utc(reply.transmit_time),
        utc(NtpTimestamp::from_unix(SystemClock.now()))
    );
    println!(
        "\tOffset={:+.6}s Delay={:.6}s",
        result.clock_offset_secs(),
        result.round_trip_secs()
    );
}

fn utc(timestamp: NtpTimestamp) -> String {
    i64::try_from(timestamp.to_unix_nanos())
        .map(DateTime::from_timestamp_nanos)
        .map_or_else(
            |_| timestamp.to_string(),
            |t| t.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
        )
}
