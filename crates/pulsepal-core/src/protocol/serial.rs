//! Serial port handling
//!
//! Opens the dedicated link to the device with its fixed configuration:
//! 12 Mbaud, 8 data bits, 1 stop bit, no parity, DTR off, RTS on.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ProtocolError, SerialTransport, BAUD_RATE};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// List available serial ports, USB ports first
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by_key(|p| (p.vid.is_none(), p.name.clone()));
    ports
}

/// Open a serial port with the fixed link configuration.
///
/// `read_timeout` bounds each blocking read so the reader loop can observe
/// cancellation.
pub fn open_port(name: &str, read_timeout: Duration) -> Result<SerialTransport, ProtocolError> {
    debug!("Opening {} at {} baud", name, BAUD_RATE);
    let mut port = serialport::new(name, BAUD_RATE)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .flow_control(serialport::FlowControl::None)
        .timeout(read_timeout)
        .open()
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

    configure_control_lines(port.as_mut())?;
    Ok(SerialTransport::new(port))
}

/// Hold DTR low and RTS high
fn configure_control_lines(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.write_data_terminal_ready(false)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

    // Some USB CDC drivers reject RTS changes
    if let Err(e) = port.write_request_to_send(true) {
        warn!("Failed to set RTS high: {} (continuing)", e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports() {
        // Only checks that enumeration does not panic
        let ports = list_ports();
        for port in &ports {
            println!("Found port: {} - {:?}", port.name, port.product);
        }
    }

    #[test]
    fn test_open_missing_port_fails() {
        let result = open_port("/dev/pulsepal-does-not-exist", Duration::from_millis(10));
        assert!(matches!(result, Err(ProtocolError::SerialError(_))));
    }
}
