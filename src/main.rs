use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use multicast_tester::aggregator::CounterTable;
use multicast_tester::config::{parse_group_spec, ReceiverConfig};
use multicast_tester::logging::{Facility, Logger, Severity};
use multicast_tester::metrics::{install_prometheus_recorder, PrometheusSink};
use multicast_tester::sender::{SendSettings, DEFAULT_TTL};
use multicast_tester::supervisor::{run_groups, FailurePolicy, Role};
use multicast_tester::{MulticastGroup, RunContext};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Restart budget per group with --restart-failed-groups
const MAX_RESTARTS: u32 = 5;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multicast sender/receiver test tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log every packet and every aggregated report
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable debug logging for one facility only (repeatable)
    #[arg(long = "debug-facility", value_name = "FACILITY", global = true)]
    debug_facilities: Vec<Facility>,

    /// Restart a failed group with backoff instead of exiting
    #[arg(long, global = true)]
    restart_failed_groups: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Send test packets to one or more groups
    Sender {
        /// Group as ADDRESS:PORT@INTERFACE, e.g. 239.1.2.3:5000@eth0 or [ff03::123]:5000@eth0
        #[arg(required = true, value_parser = parse_group_spec)]
        groups: Vec<MulticastGroup>,

        /// Multicast TTL / hop limit
        #[arg(long, default_value_t = DEFAULT_TTL)]
        ttl: u32,

        /// Stop each group after this many packets
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        count: Option<u64>,

        /// Serve Prometheus metrics on this port
        #[arg(long)]
        prometheus_port: Option<u16>,
    },
    /// Join the groups listed in a config file (JSON5, or YAML for .yaml/.yml) and measure them
    Receiver {
        config_file: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

fn build_logger(args: &Args) -> Logger {
    let logger = match args.log_format {
        LogFormat::Text => Logger::text(),
        LogFormat::Json => Logger::json(),
    };
    for facility in &args.debug_facilities {
        logger.set_facility_level(*facility, Severity::Debug);
    }
    logger
}

fn prometheus_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

fn summarize(ctx: &RunContext, table: &CounterTable) {
    for (key, counters) in table.iter() {
        ctx.logger.info(
            Facility::Supervisor,
            &format!(
                "{} -> {}:{}: sent {} packets ({} bytes), received {} packets ({} bytes), {} out of order",
                key.source_address.map_or_else(|| "*".to_string(), |addr| addr.to_string()),
                key.group_address,
                key.port,
                counters.packets_sent,
                counters.bytes_sent,
                counters.packets_received,
                counters.bytes_received,
                counters.out_of_order,
            ),
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let logger = build_logger(&args);
    let mut ctx = RunContext::new(logger, args.debug);
    // Per-packet lines still pass through the facility filter
    ctx.debug |= !args.debug_facilities.is_empty();

    let policy = if args.restart_failed_groups {
        FailurePolicy::Restart {
            max_restarts: MAX_RESTARTS,
        }
    } else {
        FailurePolicy::Exit
    };

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        let logger = ctx.logger.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                logger.notice(Facility::Supervisor, "Interrupted, leaving groups");
                shutdown.cancel();
            }
        });
    }

    let (role, groups, prometheus_port) = match args.command {
        Command::Sender {
            groups,
            ttl,
            count,
            prometheus_port,
        } => {
            let settings = SendSettings {
                ttl,
                count,
                ..SendSettings::default()
            };
            (Role::Sender(settings), groups, prometheus_port)
        }
        Command::Receiver { config_file } => {
            let config = ReceiverConfig::load_from_file(&config_file)
                .with_context(|| format!("failed to load {}", config_file.display()))?;
            config
                .validate()
                .with_context(|| format!("invalid configuration in {}", config_file.display()))?;
            ctx.logger.info(
                Facility::Config,
                &format!(
                    "Loaded {} multicast channel(s) from {}",
                    config.multicast_channels.len(),
                    config_file.display()
                ),
            );
            let port = config.prometheus.enabled.then_some(config.prometheus.port);
            (Role::Receiver, config.multicast_channels, port)
        }
    };

    if let Some(port) = prometheus_port {
        let addr = prometheus_addr(port);
        install_prometheus_recorder(addr)?;
        ctx.logger
            .info(Facility::Metrics, &format!("Serving Prometheus metrics on {}", addr));
    }

    let (_, table) = run_groups(
        role,
        groups,
        &ctx,
        (PrometheusSink, CounterTable::new()),
        policy,
        shutdown,
    )
    .await?;

    summarize(&ctx, &table);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_arg_parsing() {
        let args = Args::parse_from([
            "multicast_tester",
            "sender",
            "239.1.2.3:5000@eth0",
            "[ff03::123]:5001@eth1",
            "--ttl",
            "4",
            "--count",
            "10",
            "-d",
        ]);
        assert!(args.debug);
        match args.command {
            Command::Sender {
                groups,
                ttl,
                count,
                prometheus_port,
            } => {
                assert_eq!(groups.len(), 2);
                assert_eq!(groups[0].interface, "eth0");
                assert_eq!(groups[1].group_address, "ff03::123".parse::<std::net::IpAddr>().unwrap());
                assert_eq!(groups[1].port, 5001);
                assert_eq!(ttl, 4);
                assert_eq!(count, Some(10));
                assert_eq!(prometheus_port, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_receiver_arg_parsing() {
        let args = Args::parse_from([
            "multicast_tester",
            "receiver",
            "channels.json5",
            "--restart-failed-groups",
            "--log-format",
            "json",
            "--debug-facility",
            "receiver",
        ]);
        assert_eq!(
            args.command,
            Command::Receiver {
                config_file: PathBuf::from("channels.json5")
            }
        );
        assert!(args.restart_failed_groups);
        assert_eq!(args.log_format, LogFormat::Json);
        assert_eq!(args.debug_facilities, vec![Facility::Receiver]);
        assert!(!args.debug);
    }

    #[test]
    fn test_bad_group_spec_rejected() {
        let result = Args::try_parse_from(["multicast_tester", "sender", "239.1.2.3@eth0"]);
        assert!(result.is_err());

        let result = Args::try_parse_from(["multicast_tester", "sender", "10.0.0.1:5000@eth0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_count_rejected() {
        let result = Args::try_parse_from([
            "multicast_tester",
            "sender",
            "239.1.2.3:5000@eth0",
            "--count",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sender_defaults() {
        let args = Args::parse_from(["multicast_tester", "sender", "239.1.2.3:5000@eth0"]);
        assert_eq!(args.log_format, LogFormat::Text);
        match args.command {
            Command::Sender { ttl, count, .. } => {
                assert_eq!(ttl, 1);
                assert_eq!(count, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_prometheus_binds_all_interfaces() {
        assert_eq!(prometheus_addr(9100), "0.0.0.0:9100".parse().unwrap());
    }
}
