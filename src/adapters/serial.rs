//! USB serial transport and rig discovery.
use bytes::BytesMut;
use serialport::{ClearBuffer, SerialPort, SerialPortInfo, SerialPortType};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info};

use super::Transport;
use crate::error::{AppResult, RigError};
use crate::protocol::BAUDRATE;

/// Board the rig firmware runs on.
pub const DEVICE_NAME: &str = "Arduino MKRZero";
/// USB vendor id of the rig board.
pub const RIG_VID: u16 = 0x2341;
/// USB product id of the rig board.
pub const RIG_PID: u16 = 0x804F;

/// List connected serial ports belonging to the rig board.
///
/// Fails with `DeviceNotFound` when none is plugged in.
pub fn find_rig_ports() -> AppResult<Vec<SerialPortInfo>> {
    let ports: Vec<SerialPortInfo> = serialport::available_ports()?
        .into_iter()
        .filter(is_rig_port)
        .collect();
    if ports.is_empty() {
        return Err(RigError::DeviceNotFound(DEVICE_NAME.to_string()));
    }
    debug!(count = ports.len(), "Found rig serial ports");
    Ok(ports)
}

fn is_rig_port(port: &SerialPortInfo) -> bool {
    matches!(
        &port.port_type,
        SerialPortType::UsbPort(usb) if usb.vid == RIG_VID && usb.pid == RIG_PID
    )
}

/// Serial link to the rig.
pub struct SerialTransport {
    port_name: String,
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `port_name` at the given baud rate.
    pub fn open(port_name: &str, baud_rate: u32) -> AppResult<Self> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()?;
        info!(port = port_name, baud_rate, "Opened rig serial port");
        Ok(Self {
            port_name: port_name.to_string(),
            port,
        })
    }

    /// Open the first connected rig board at the firmware baud rate.
    pub fn open_first() -> AppResult<Self> {
        let ports = find_rig_ports()?;
        // find_rig_ports never returns an empty list
        let first = ports
            .first()
            .ok_or_else(|| RigError::DeviceNotFound(DEVICE_NAME.to_string()))?;
        Self::open(&first.port_name, BAUDRATE)
    }
}

impl Transport for SerialTransport {
    fn bytes_available(&mut self) -> AppResult<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_available(&mut self, buffer: &mut BytesMut) -> AppResult<usize> {
        let available = self.bytes_available()?;
        if available == 0 {
            return Ok(0);
        }
        let mut chunk = vec![0u8; available];
        self.port.read_exact(&mut chunk)?;
        buffer.extend_from_slice(&chunk);
        Ok(available)
    }

    fn write_all(&mut self, frame: &[u8]) -> AppResult<()> {
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }

    fn reset_input_buffer(&mut self) -> AppResult<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("serial:{}", self.port_name)
    }
}
