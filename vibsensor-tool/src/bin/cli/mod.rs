use clap::{Parser, Subcommand};
use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ArgError {
    #[error("invalid address '{0}'")]
    BadAddress(String),
    #[error("invalid duration '{0}'")]
    BadSeconds(String),
    #[error("packet size must be 1..=4096, got '{0}'")]
    BadPacketSize(String),
}

/// Device address, decimal or `0x` hex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Address(u8);

impl Deref for Address {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for Address {
    type Err = ArgError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^(?:0[xX]([[:xdigit:]]{1,2})|(\d{1,3}))$").unwrap();
        }

        let bad = || ArgError::BadAddress(input.to_string());
        let c = RE.captures(input).ok_or_else(bad)?;

        let value = match (c.get(1), c.get(2)) {
            (Some(hex), _) => u8::from_str_radix(hex.as_str(), 16).map_err(|_| bad())?,
            (_, Some(dec)) => dec.as_str().parse::<u8>().map_err(|_| bad())?,
            _ => return Err(bad()),
        };
        Ok(Address(value))
    }
}

fn parse_seconds(input: &str) -> Result<Duration, ArgError> {
    match input.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(Duration::from_secs_f64(secs)),
        _ => Err(ArgError::BadSeconds(input.to_string())),
    }
}

fn parse_packet_size(input: &str) -> Result<usize, ArgError> {
    match input.parse::<usize>() {
        Ok(size) if (1..=4096).contains(&size) => Ok(size),
        _ => Err(ArgError::BadPacketSize(input.to_string())),
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Skip sanity checks
    #[clap(long, short)]
    pub force: bool,

    /// enable debug output
    #[clap(long, short)]
    pub debug: bool,

    /// UART device or 'auto'
    #[clap(long, short, default_value = "auto")]
    pub port: String,

    /// UART baud rate
    #[clap(long, short, default_value_t = 9600)]
    pub baudrate: u32,

    /// Device address
    #[clap(long, short, default_value = "0x00")]
    pub address: Address,

    /// Response timeout, seconds
    #[clap(long, short, default_value = "2", parse(try_from_str = parse_seconds))]
    pub timeout: Duration,

    /// Use json-formatted output
    #[clap(long, short)]
    pub json: bool,

    /// Check CRC on discovery and OTA acknowledgements only
    #[clap(long)]
    pub lenient_crc: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List serial ports
    ListPorts,

    /// Read feature report
    #[clap(visible_alias = "feat")]
    Features,

    /// Capture waveform snapshot
    Wave,

    /// Read feature report, then capture waveform
    Read,

    /// Broadcast discovery request
    Discover,

    /// Set sampling frequency
    SetRate { hz: u16 },

    /// Upload firmware
    Ota {
        firmware: PathBuf,

        /// Flash erase wait, seconds
        #[clap(long, default_value = "8", parse(try_from_str = parse_seconds))]
        erase_time: Duration,

        /// Data packet size, bytes
        #[clap(long, default_value = "256", parse(try_from_str = parse_packet_size))]
        packet_size: usize,

        /// Acknowledgement deadline, seconds
        #[clap(long, default_value = "3", parse(try_from_str = parse_seconds))]
        ack_timeout: Duration,
    },
}
