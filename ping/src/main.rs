mod cli;

use clap::Parser;
use cli::Cli;
use tokio_icmp_echo::resolve::{DnsResolver, NumericResolver, Resolver};
use tokio_icmp_echo::socket::RawSocket;
use tokio_icmp_echo::{ConsoleReporter, PingConfiguration, Pinger, RunError, Session};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(error) = run(cli).await {
        eprintln!("{}: {}", program_name(), error);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), RunError> {
    let configuration = cli.configuration();
    configuration.validate()?;
    let endpoint = RawSocket::open(cli.source)?;
    if cli.numeric {
        ping(cli.host, configuration, endpoint, NumericResolver).await
    } else {
        ping(cli.host, configuration, endpoint, DnsResolver::new()).await
    }
}

async fn ping<R: Resolver>(
    host: String,
    configuration: PingConfiguration,
    endpoint: RawSocket,
    resolver: R,
) -> Result<(), RunError> {
    let target = resolver.resolve(&host)?;
    let session = Session::new(host, target, &configuration)?;
    log::debug!(
        "pinging {} as identifier {} every {:?}",
        target,
        session.identifier(),
        session.interval()
    );

    let mut pinger = Pinger::new(session, endpoint, resolver, ConsoleReporter);
    pinger
        .run(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                log::warn!("cannot listen for interrupts: {}", error);
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

fn program_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .and_then(|arg| std::path::Path::new(arg).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ping".to_string())
}
