use crate::data::{AntennaPoint, AntennaPosition};
use crate::decode::sign_extend;
use deku::prelude::*;

/**
 * ## Stationary RTK reference station ARP (1005, 1006)
 *
 * 1006 appends the antenna height to the 1005 content.
 */
#[derive(Debug, PartialEq, DekuRead, Clone)]
#[deku(endian = "big")]
pub struct ReferenceStation {
    #[deku(bits = 12)]
    pub message_number: u16,
    #[deku(bits = 12)]
    pub station_id: u16,
    #[deku(bits = 6)]
    pub itrf_year: u8,
    #[deku(bits = 1)]
    pub gps: bool,
    #[deku(bits = 1)]
    pub glonass: bool,
    #[deku(bits = 1)]
    pub galileo: bool,
    #[deku(bits = 1)]
    pub reference_station: bool,
    /// 0.0001 m, signed on 38 bits
    #[deku(bits = 38)]
    pub x: u64,
    #[deku(bits = 1)]
    pub single_oscillator: bool,
    #[deku(bits = 1)]
    pub reserved: u8,
    #[deku(bits = 38)]
    pub y: u64,
    #[deku(bits = 2)]
    pub quarter_cycle: u8,
    #[deku(bits = 38)]
    pub z: u64,
    #[deku(bits = 16, cond = "*message_number == 1006")]
    pub height: Option<u16>,
}

impl ReferenceStation {
    pub fn position(&self) -> AntennaPosition {
        AntennaPosition {
            point: AntennaPoint::Arp,
            x: sign_extend(self.x, 38) as f64 * 1e-4,
            y: sign_extend(self.y, 38) as f64 * 1e-4,
            z: sign_extend(self.z, 38) as f64 * 1e-4,
            height: self.height.map(|h| h as f64 * 1e-4),
        }
    }
}

/**
 * ## Antenna descriptor (1007, 1008)
 *
 * 1008 appends the antenna serial number.
 */
#[derive(Debug, PartialEq, DekuRead, Clone)]
#[deku(endian = "big")]
pub struct AntennaDescriptor {
    #[deku(bits = 12)]
    pub message_number: u16,
    #[deku(bits = 12)]
    pub station_id: u16,
    pub descriptor_len: u8,
    #[deku(count = "descriptor_len")]
    pub descriptor: Vec<u8>,
    pub setup_id: u8,
    #[deku(cond = "*message_number == 1008")]
    pub serial_len: Option<u8>,
    #[deku(count = "serial_len.unwrap_or(0)")]
    pub serial: Vec<u8>,
}

impl AntennaDescriptor {
    pub fn descriptor(&self) -> String {
        String::from_utf8_lossy(&self.descriptor).trim().to_string()
    }

    pub fn serial(&self) -> String {
        String::from_utf8_lossy(&self.serial).trim().to_string()
    }
}
