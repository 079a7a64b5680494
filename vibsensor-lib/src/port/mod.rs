#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
use linux::is_port_open;

use anyhow::Result;
use core::time::Duration;
use log::debug;
use serialport::{self, SerialPortInfo, SerialPortType};
use thiserror::Error;

use crate::transport::SerialTransport;

#[derive(Error, Debug)]
pub enum OpenPortError {
    #[error("no compatible serial ports found")]
    NoCompatiblePort,
    #[error("{port_name:?} busy")]
    PortBusy { port_name: String },
    #[error("failed to open {port_name:?}")]
    TransportOpenFailed {
        port_name: String,
        #[source]
        source: serialport::Error,
    },
}

#[derive(PartialEq)]
struct UsbId(u16, u16);

static COMPATIBLE_IDS: &[UsbId] = &[
    UsbId(0x0403, 0x6001), // FTDI FT232R USB UART
    UsbId(0x0403, 0x6014), // FTDI FT232H Single HS USB-UART/FIFO IC
    UsbId(0x10c4, 0xea60), // Silicon Labs CP210x UART Bridge
    UsbId(0x1a86, 0x7523), // QinHeng Electronics HL-340 USB-Serial adapter
    UsbId(0x0483, 0x5740), // STMicroelectronics Virtual COM Port
];

#[cfg(not(target_os = "linux"))]
fn is_port_open(_port_name: &str) -> bool {
    false
}

/// Opens `port_name` (or the first compatible adapter for `"auto"`) with
/// `timeout` as the read timeout. The port closes when the transport is
/// dropped.
pub fn open_port(
    port_name: &str,
    baudrate: u32,
    timeout: Duration,
    force: bool,
) -> Result<SerialTransport> {
    let true_name: String = if port_name == "auto" {
        guess_port()?
    } else {
        port_name.to_string()
    };

    if !force && is_port_open(&true_name) {
        return Err(OpenPortError::PortBusy {
            port_name: true_name,
        }
        .into());
    }

    let port = serialport::new(&true_name, baudrate)
        .timeout(timeout)
        .open()
        .map_err(|source| OpenPortError::TransportOpenFailed {
            port_name: true_name.clone(),
            source,
        })?;

    debug!("open_port OK: {} @ {} baud", &true_name, baudrate);
    Ok(SerialTransport::new(port, timeout)?)
}

fn is_compatible(info: &SerialPortInfo) -> bool {
    match &info.port_type {
        SerialPortType::UsbPort(usb_info) => {
            COMPATIBLE_IDS.contains(&UsbId(usb_info.vid, usb_info.pid))
        }
        SerialPortType::PciPort | SerialPortType::BluetoothPort | SerialPortType::Unknown => false,
    }
}

/// All serial ports, compatible adapters first.
pub fn list_ports() -> Result<Vec<(String, bool)>> {
    let mut ports: Vec<_> = serialport::available_ports()?
        .into_iter()
        .map(|info| {
            let compatible = is_compatible(&info);
            (info.port_name, compatible)
        })
        .collect();

    ports.sort_by_key(|(name, compatible)| (!compatible, name.clone()));
    Ok(ports)
}

fn guess_port() -> Result<String> {
    serialport::available_ports()?
        .into_iter()
        .filter(|info| is_compatible(info) && !is_port_open(&info.port_name))
        .map(|info| info.port_name)
        .next()
        .ok_or_else(|| OpenPortError::NoCompatiblePort.into())
}
