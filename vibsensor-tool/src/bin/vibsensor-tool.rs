pub mod cli;

use std::fmt::Display;
use std::io;

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells::Bash};
use json::JsonValue;
use log::{error, info, warn};

use vibsensor_lib::firmware::FirmwareImage;
use vibsensor_lib::port;
use vibsensor_lib::protocol::{
    is_supported_sample_rate, AxisFeatures, Device, DeviceConfig, DeviceIdentity, FeatureReport,
    ProtocolError,
};

use cli::{Cli, Commands};

enum OutputFormat {
    Plain,
    Json,
}

fn slice_to_column<T>(data: &[T]) -> String
where
    T: Display,
{
    data.iter()
        .map(|x| x.to_string())
        .collect::<Vec<String>>()
        .join("\n")
}

fn axis_to_json(axis: &AxisFeatures) -> JsonValue {
    let mut obj = JsonValue::new_object();
    obj["mean"] = axis.mean.into();
    obj["rms"] = axis.rms.into();
    obj["peak_to_peak"] = axis.peak_to_peak.into();
    obj["kurtosis"] = axis.kurtosis.into();
    obj
}

fn report_to_json(report: &FeatureReport) -> JsonValue {
    let mut obj = JsonValue::new_object();
    obj["device"] = report.device.into();
    obj["x"] = axis_to_json(&report.x);
    obj["y"] = axis_to_json(&report.y);
    obj["z"] = axis_to_json(&report.z);
    obj["dominant_frequency"] = report.dominant_frequency.into();
    obj["dominant_amplitude"] = report.dominant_amplitude.into();
    obj["second_harmonic_amplitude"] = report.second_harmonic_amplitude.into();
    obj["envelope_rms"] = report.envelope_rms.into();
    obj["envelope_peak"] = report.envelope_peak.into();
    obj["temperature"] = report.temperature.into();
    obj
}

fn identity_to_json(identity: &DeviceIdentity) -> JsonValue {
    let mut obj = JsonValue::new_object();
    obj["uid"] = hex::encode_upper(identity.uid).into();
    obj["address"] = identity.address.into();
    obj
}

/// Runs the capture; a sequence that stops early still yields what was read.
fn capture(device: &mut Device) -> Result<Vec<f32>> {
    match device.capture_waveform() {
        Ok(samples) => Ok(samples),
        Err(ProtocolError::PacketSequenceAborted {
            seq,
            samples,
            cause,
        }) => {
            error!(
                "waveform truncated at packet {}: {}, keeping {} samples",
                seq,
                cause,
                samples.len()
            );
            Ok(samples)
        }
        Err(e) => Err(e).context("Failed to capture waveform"),
    }
}

fn cmd_list_ports(fmt: OutputFormat) -> Result<String> {
    let ports = port::list_ports()?;

    Ok(match fmt {
        OutputFormat::Plain => slice_to_column(
            &ports
                .iter()
                .map(|(name, compatible)| {
                    if *compatible {
                        format!("{} *", name)
                    } else {
                        name.clone()
                    }
                })
                .collect::<Vec<_>>(),
        ),
        OutputFormat::Json => json::stringify(
            ports
                .into_iter()
                .map(|(name, _)| name)
                .collect::<Vec<_>>(),
        ),
    })
}

fn cmd_features(device: &mut Device, fmt: OutputFormat) -> Result<String> {
    let report = device
        .read_features()
        .context("Failed to read feature report")?;

    Ok(match fmt {
        OutputFormat::Plain => report.to_string(),
        OutputFormat::Json => json::stringify(report_to_json(&report)),
    })
}

fn cmd_wave(device: &mut Device, fmt: OutputFormat) -> Result<String> {
    let samples = capture(device)?;

    Ok(match fmt {
        OutputFormat::Plain => slice_to_column(&samples),
        OutputFormat::Json => json::stringify(samples),
    })
}

fn cmd_read(device: &mut Device, fmt: OutputFormat) -> Result<String> {
    let report = match device.read_features() {
        Ok(report) => Some(report),
        Err(e) => {
            error!("Failed to read feature report: {}", e);
            None
        }
    };
    let samples = capture(device)?;

    Ok(match fmt {
        OutputFormat::Plain => match report {
            Some(report) => format!("{}\n{}", report, slice_to_column(&samples)),
            None => slice_to_column(&samples),
        },
        OutputFormat::Json => {
            let mut obj = JsonValue::new_object();
            obj["features"] = report.as_ref().map_or(JsonValue::Null, report_to_json);
            obj["waveform"] = samples.into();
            json::stringify(obj)
        }
    })
}

fn cmd_discover(device: &mut Device, fmt: OutputFormat) -> Result<String> {
    let identity = device.discover().context("Discovery failed")?;

    if identity.address != device.address() {
        info!(
            "device answers at 0x{:02X}, pass --address 0x{:02X} to reach it",
            identity.address, identity.address
        );
    }

    Ok(match fmt {
        OutputFormat::Plain => identity.to_string(),
        OutputFormat::Json => json::stringify(identity_to_json(&identity)),
    })
}

fn cmd_set_rate(device: &mut Device, hz: u16, force: bool) -> Result<String> {
    if !is_supported_sample_rate(hz) {
        if !force {
            return Err(anyhow!(
                "Unsupported sample rate {} Hz (use --force to send anyway)",
                hz
            ));
        }
        warn!("sending unsupported sample rate {} Hz", hz);
    }

    device
        .set_sample_rate(hz)
        .with_context(|| format!("Failed to set sample rate {} Hz", hz))?;
    Ok(String::new())
}

fn cmd_ota(device: &mut Device, image: &FirmwareImage) -> Result<String> {
    let summary = device
        .update_firmware(image)
        .context("Firmware update failed")?;

    if !summary.end_acknowledged {
        warn!("image transferred but end of update was not acknowledged");
    }
    Ok(format!(
        "firmware updated: {} bytes in {} packets",
        summary.image_len, summary.chunks
    ))
}

fn do_main() -> Result<String> {
    if std::env::var("GENERATE_COMPLETION").is_ok() {
        generate(
            Bash,
            &mut cli::Cli::command(),
            "vibsensor-tool",
            &mut io::stdout(),
        );

        return Ok(String::default());
    }

    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.debug {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp(None)
    .format_target(false)
    .init();

    let fmt = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Plain
    };

    let mut config = DeviceConfig {
        address: *cli.address,
        verify_crc: !cli.lenient_crc,
        ..DeviceConfig::default()
    };

    // The firmware is read before the port is touched.
    let image = match &cli.command {
        Commands::ListPorts => return cmd_list_ports(fmt),
        Commands::Ota {
            firmware,
            erase_time,
            packet_size,
            ack_timeout,
        } => {
            config.erase_time = *erase_time;
            config.ota_packet_size = *packet_size;
            config.ack_timeout = *ack_timeout;

            let image = FirmwareImage::load(firmware)?;
            info!(
                "firmware {:?}: {} bytes, {} after padding",
                firmware,
                image.source_len(),
                image.len()
            );
            Some(image)
        }
        _ => None,
    };

    let mut port = port::open_port(&cli.port, cli.baudrate, cli.timeout, cli.force)
        .with_context(|| format!("Can't open port '{}'", cli.port))?;
    let mut device = Device::new(&mut port, config);

    match (cli.command, image) {
        (Commands::Features, _) => cmd_features(&mut device, fmt),
        (Commands::Wave, _) => cmd_wave(&mut device, fmt),
        (Commands::Read, _) => cmd_read(&mut device, fmt),
        (Commands::Discover, _) => cmd_discover(&mut device, fmt),
        (Commands::SetRate { hz }, _) => cmd_set_rate(&mut device, hz, cli.force),
        (Commands::Ota { .. }, Some(image)) => cmd_ota(&mut device, &image),
        _ => Err(anyhow!("unexpected command (this is a bug!)")),
    }
}

fn main() {
    match do_main() {
        Ok(s) if s.is_empty() => {}
        Ok(s) => println!("{}", s),
        Err(e) => error!("{:#}", e),
    }
}
