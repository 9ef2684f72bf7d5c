//! Ronoth LoStik driver.
//!
//! The LoStik is a Microchip RN2903 LoRa module behind a CH340 USB serial
//! bridge. It speaks a line-oriented ASCII command set at 57600 baud; every
//! command is answered with one line, and `radio tx` / `radio rx` answer a
//! second time once the radio operation finishes:
//!
//! ```text
//! > radio tx 5245414459      > radio rx 0
//! < ok                       < ok
//! < radio_tx_ok              < radio_rx  5245414459   (or radio_err on watchdog)
//! ```
//!
//! The LoRaWAN stack is paused on open so the raw radio commands are usable.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use serialport::{SerialPort, SerialPortType};

use super::{AppliedParams, LinkQuality, Received, Transmission, Transport, TransportError};
use crate::profile::{Channel, CodingRate, Profile, RadioParams};

/// Default serial speed of the RN2903.
pub const BAUD_RATE: u32 = 57_600;

/// USB vendor and product id of the LoStik's serial bridge.
pub const USB_ID: (u16, u16) = (0x1A86, 0x7523);

/// Firmware prefix reported by `sys get ver`.
pub const FIRMWARE_PREFIX: &str = "RN2903";

/// Reply to `mac pause` when the LoRaWAN stack can stay paused indefinitely.
const MAC_PAUSE_FOREVER: &str = "4294967245";

const RX_LED: &str = "GPIO10";
const TX_LED: &str = "GPIO11";

/// Read timeout on the serial port itself; lines are assembled across reads.
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Slack on top of the radio watchdog before we give up on the device.
const RX_GRACE: Duration = Duration::from_secs(2);

const TX_TIMEOUT: Duration = Duration::from_secs(30);

/// How to find and open the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoStikConfig {
    /// Explicit serial port, or `None` to auto-detect by USB id
    pub port: Option<String>,
    /// Serial speed
    pub baud_rate: u32,
    /// USB vendor and product id used for auto-detection
    pub usb_id: (u16, u16),
}

impl Default for LoStikConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: BAUD_RATE,
            usb_id: USB_ID,
        }
    }
}

/// Parse a `VVVV:PPPP` hex USB id.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidConfiguration`] if the text is not two hex
/// words separated by a colon.
pub fn parse_usb_id(text: &str) -> crate::Result<(u16, u16)> {
    let invalid = || crate::Error::InvalidConfiguration(format!("invalid USB id '{text}'"));
    let (vid, pid) = text.split_once(':').ok_or_else(invalid)?;
    let vid = u16::from_str_radix(vid.trim(), 16).map_err(|_| invalid())?;
    let pid = u16::from_str_radix(pid.trim(), 16).map_err(|_| invalid())?;
    Ok((vid, pid))
}

fn format_usb_id((vid, pid): (u16, u16)) -> String {
    format!("{vid:04X}:{pid:04X}")
}

/// Find the single serial port whose USB id matches.
///
/// # Errors
///
/// Returns [`TransportError::NotFound`] if no port matches and
/// [`TransportError::Ambiguous`] if several do.
pub fn detect(usb_id: (u16, u16)) -> Result<String, TransportError> {
    let ports = serialport::available_ports().map_err(|e| TransportError::Open {
        port: "auto".to_string(),
        reason: e.to_string(),
    })?;

    let matching: Vec<String> = ports
        .into_iter()
        .filter(|p| {
            matches!(&p.port_type, SerialPortType::UsbPort(info)
                if (info.vid, info.pid) == usb_id)
        })
        .map(|p| p.port_name)
        .collect();

    match matching.as_slice() {
        [] => Err(TransportError::NotFound(format_usb_id(usb_id))),
        [only] => Ok(only.clone()),
        many => Err(TransportError::Ambiguous {
            count: many.len(),
            usb_id: format_usb_id(usb_id),
        }),
    }
}

/// Pause before each transmit so the peer has turned its radio around.
fn settle_delay(watchdog_ms: u32) -> Duration {
    match watchdog_ms {
        0..=1000 => Duration::from_millis(100),
        1001..=2000 => Duration::from_millis(150),
        _ => Duration::from_millis(200),
    }
}

/// An open LoStik.
pub struct LoStik {
    port_name: String,
    reader: BufReader<Box<dyn SerialPort>>,
    writer: Box<dyn SerialPort>,
    firmware: String,
    watchdog_ms: u32,
}

impl std::fmt::Debug for LoStik {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoStik")
            .field("port_name", &self.port_name)
            .field("firmware", &self.firmware)
            .field("watchdog_ms", &self.watchdog_ms)
            .finish_non_exhaustive()
    }
}

impl LoStik {
    /// Open the radio, check its firmware and pause LoRaWAN.
    ///
    /// # Errors
    ///
    /// Returns an error if no single device can be found, the port cannot be
    /// opened, or the device is not an RN2903.
    pub fn open(config: &LoStikConfig) -> Result<Self, TransportError> {
        let port_name = match &config.port {
            Some(port) => port.clone(),
            None => detect(config.usb_id)?,
        };

        tracing::info!(port = %port_name, baud = config.baud_rate, "Opening radio");

        let port = serialport::new(&port_name, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|e| TransportError::Open {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;
        let writer = port.try_clone().map_err(|e| TransportError::Open {
            port: port_name.clone(),
            reason: e.to_string(),
        })?;

        let mut radio = Self {
            port_name,
            reader: BufReader::new(port),
            writer,
            firmware: String::new(),
            watchdog_ms: 0,
        };

        radio.firmware = radio.command("sys get ver")?;
        if !radio.firmware.starts_with(FIRMWARE_PREFIX) {
            return Err(TransportError::UnsupportedFirmware(radio.firmware));
        }
        radio.expect("mac pause", MAC_PAUSE_FOREVER)?;
        radio.set_led(RX_LED, false);
        radio.set_led(TX_LED, false);

        tracing::debug!(firmware = %radio.firmware, "Radio ready");
        Ok(radio)
    }

    /// Name of the serial port in use.
    #[must_use]
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Firmware version string.
    #[must_use]
    pub fn firmware(&self) -> &str {
        &self.firmware
    }

    fn write_line(&mut self, command: &str) -> Result<(), TransportError> {
        tracing::trace!(command, "radio <");
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(b"\r\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_line(&mut self, limit: Duration) -> Result<String, TransportError> {
        let deadline = Instant::now() + limit;
        let mut line = Vec::new();
        loop {
            match self.reader.read_until(b'\n', &mut line) {
                Ok(0) => return Err(TransportError::Disconnected),
                Ok(_) if line.ends_with(b"\n") => break,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Unresponsive(limit));
            }
        }
        let reply = String::from_utf8_lossy(&line).trim().to_string();
        tracing::trace!(reply = %reply, "radio >");
        Ok(reply)
    }

    fn command(&mut self, command: &str) -> Result<String, TransportError> {
        self.write_line(command)?;
        self.read_line(COMMAND_TIMEOUT)
    }

    fn expect(&mut self, command: &str, expected: &str) -> Result<(), TransportError> {
        let reply = self.command(command)?;
        if reply == expected {
            Ok(())
        } else if reply == "busy" {
            Err(TransportError::Busy)
        } else {
            Err(TransportError::Command {
                command: command.to_string(),
                reply,
            })
        }
    }

    fn set(&mut self, parameter: &str, value: &str) -> Result<(), TransportError> {
        self.expect(&format!("radio set {parameter} {value}"), "ok")
    }

    fn get<T: std::str::FromStr>(&mut self, parameter: &str) -> Result<T, TransportError> {
        let command = format!("radio get {parameter}");
        let reply = self.command(&command)?;
        reply
            .trim_start_matches(parameter)
            .parse()
            .map_err(|_| TransportError::Command { command, reply })
    }

    fn set_watchdog(&mut self, watchdog_ms: u32) -> Result<(), TransportError> {
        if self.watchdog_ms != watchdog_ms {
            self.set("wdt", &watchdog_ms.to_string())?;
            self.watchdog_ms = watchdog_ms;
        }
        Ok(())
    }

    fn set_led(&mut self, pin: &str, on: bool) {
        let command = format!("sys set pindig {pin} {}", u8::from(on));
        if let Err(e) = self.expect(&command, "ok") {
            tracing::debug!(pin, error = %e, "LED update failed");
        }
    }
}

impl Transport for LoStik {
    fn apply_profile(&mut self, profile: &Profile, channel: &Channel) -> Result<(), TransportError> {
        let params = &profile.params;
        self.set("pwr", &params.power.to_string())?;
        self.set("bw", &params.bandwidth_khz.to_string())?;
        self.set("sf", &format!("sf{}", params.spreading_factor))?;
        self.set("cr", &params.coding_rate.to_string())?;
        self.set("freq", &channel.frequency.to_string())?;
        self.watchdog_ms = 0;
        self.set_watchdog(params.watchdog_ms)
    }

    fn applied_params(&mut self) -> Result<AppliedParams, TransportError> {
        let reply: String = self.get("cr")?;
        let coding_rate: CodingRate = reply.parse().map_err(|_| TransportError::Command {
            command: "radio get cr".to_string(),
            reply: reply.clone(),
        })?;

        let radio = RadioParams {
            power: self.get("pwr")?,
            bandwidth_khz: self.get("bw")?,
            spreading_factor: self.get("sf")?,
            coding_rate,
            watchdog_ms: self.get("wdt")?,
        };
        let frequency = self.get("freq")?;
        Ok(AppliedParams { radio, frequency })
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<Transmission, TransportError> {
        thread::sleep(settle_delay(self.watchdog_ms));

        let command = format!("radio tx {}", String::from_utf8_lossy(frame));
        self.expect(&command, "ok")?;
        let started = Instant::now();
        self.set_led(TX_LED, true);

        let reply = self.read_line(TX_TIMEOUT);
        self.set_led(TX_LED, false);
        match reply?.as_str() {
            "radio_tx_ok" => Ok(Transmission {
                sent_at: Utc::now(),
                air_time: started.elapsed(),
            }),
            other => Err(TransportError::TransmitFailed(other.to_string())),
        }
    }

    fn receive(&mut self, timeout: Duration) -> Result<Received, TransportError> {
        let watchdog_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        self.set_watchdog(watchdog_ms)?;
        self.expect("radio rx 0", "ok")?;
        self.set_led(RX_LED, true);

        let reply = self.read_line(timeout + RX_GRACE);
        self.set_led(RX_LED, false);
        let reply = reply?;

        if reply == "radio_err" {
            return Ok(Received::Timeout);
        }
        if reply == "busy" {
            return Err(TransportError::Busy);
        }
        match reply.strip_prefix("radio_rx") {
            Some(hex) => Ok(Received::Frame(hex.trim().to_ascii_lowercase().into_bytes())),
            None => Err(TransportError::Command {
                command: "radio rx 0".to_string(),
                reply,
            }),
        }
    }

    fn link_quality(&mut self) -> Option<LinkQuality> {
        let rssi = self.get("rssi").ok()?;
        let snr = self.get("snr").ok()?;
        Some(LinkQuality { rssi, snr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usb_id() {
        assert_eq!(parse_usb_id("1A86:7523").unwrap(), USB_ID);
        assert_eq!(parse_usb_id("1a86:7523").unwrap(), USB_ID);
        assert!(parse_usb_id("1A86").is_err());
        assert!(parse_usb_id("ZZZZ:7523").is_err());
    }

    #[test]
    fn test_format_usb_id() {
        assert_eq!(format_usb_id(USB_ID), "1A86:7523");
    }

    #[test]
    fn test_settle_delay_scales_with_watchdog() {
        assert_eq!(settle_delay(1000), Duration::from_millis(100));
        assert_eq!(settle_delay(2000), Duration::from_millis(150));
        assert_eq!(settle_delay(5000), Duration::from_millis(200));
        assert!(settle_delay(15_000) >= settle_delay(5000));
    }
}
