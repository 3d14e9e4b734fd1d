use {
    anyhow::{Context as _, Result, bail},
    clap::Parser,
    std::{
        net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
        path::PathBuf,
        str::FromStr,
    },
};

/// Sends files to a sealpost receiver.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Comma-separated list of files to send.
    #[arg(short, long, value_delimiter = ',', required_unless_present = "burn")]
    pub files: Vec<PathBuf>,
    /// Receiver address: `ip:port`, `:port` for localhost or `ip` for the default port.
    #[arg(short, long, default_value = "127.0.0.1")]
    pub remote: AddrArg,
    /// Local address to connect from. The receiver identifies senders by it.
    #[arg(short, long)]
    pub local: Option<AddrArg>,
    /// File containing the 32-byte transfer key.
    #[arg(short, long, default_value = ".key")]
    pub key: PathBuf,
    /// Ask the receiver to delete this sender's key instead of sending files.
    #[arg(long, conflicts_with = "files")]
    pub burn: bool,
    /// Limit for connecting and for every socket read and write.
    #[arg(long, default_value = "30s")]
    pub timeout: humantime::Duration,
    /// Log filter, e.g. `info` or `sealpost=debug`. Defaults to `RUST_LOG`, then `info`.
    #[arg(long)]
    pub log_filter: Option<String>,
}

/// Socket address where either part may be left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrArg {
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
}

impl AddrArg {
    #[must_use]
    #[inline]
    pub fn resolve(self, default_ip: IpAddr, default_port: u16) -> SocketAddr {
        SocketAddr::new(
            self.ip.unwrap_or(default_ip),
            self.port.unwrap_or(default_port),
        )
    }
}

impl FromStr for AddrArg {
    type Err = anyhow::Error;

    #[inline]
    fn from_str(input: &str) -> Result<Self> {
        if let Ok(addr) = input.parse::<SocketAddr>() {
            return Ok(Self {
                ip: Some(addr.ip()),
                port: Some(addr.port()),
            });
        }
        if let Some(port) = input.strip_prefix(':') {
            return Ok(Self {
                ip: None,
                port: Some(port.parse().with_context(|| format!("invalid port: {port:?}"))?),
            });
        }
        let ip = input.trim_start_matches('[').trim_end_matches(']');
        match ip.parse::<IpAddr>() {
            Ok(ip) => Ok(Self {
                ip: Some(ip),
                port: None,
            }),
            Err(_) => bail!("invalid address: {input:?}"),
        }
    }
}

/// Address to bind to when only a local port is given.
#[must_use]
#[inline]
pub fn unspecified_for(remote: SocketAddr) -> IpAddr {
    if remote.is_ipv4() {
        Ipv4Addr::UNSPECIFIED.into()
    } else {
        Ipv6Addr::UNSPECIFIED.into()
    }
}
