use clap::{Parser, ValueEnum};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio_icmp_echo::ping::DEFAULT_DATA_SIZE;
use tokio_icmp_echo::{Pacing, PingConfiguration};

#[derive(Parser, Debug)]
#[command(
    name = "ping",
    version,
    about = "Send ICMP ECHO_REQUEST packets to a single IPv4 host"
)]
pub struct Cli {
    /// Host name or IPv4 address to ping
    pub host: String,

    /// Number of data bytes after the ICMP header
    #[arg(short, long, default_value_t = DEFAULT_DATA_SIZE)]
    pub size: u32,

    /// Milliseconds between probes
    #[arg(short, long, default_value_t = 500)]
    pub interval: u64,

    /// Source address to send from
    #[arg(short = 'I', long)]
    pub source: Option<Ipv4Addr>,

    /// Print numeric addresses only
    #[arg(short, long)]
    pub numeric: bool,

    /// When the next probe is sent
    #[arg(long, value_enum, default_value_t = PacingArg::Fixed)]
    pub pacing: PacingArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingArg {
    /// Every interval, answered or not
    Fixed,
    /// One interval after each reply
    ReplyGated,
}

impl From<PacingArg> for Pacing {
    fn from(arg: PacingArg) -> Self {
        match arg {
            PacingArg::Fixed => Pacing::Fixed,
            PacingArg::ReplyGated => Pacing::ReplyGated,
        }
    }
}

impl Cli {
    pub fn configuration(&self) -> PingConfiguration {
        PingConfiguration {
            interval: Duration::from_millis(self.interval),
            data_size: self.size,
            pacing: self.pacing.into(),
        }
    }
}
