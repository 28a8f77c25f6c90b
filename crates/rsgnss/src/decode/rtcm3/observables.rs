use deku::prelude::*;

/**
 * ## GPS RTK observables (1001 to 1004)
 *
 * | message | L1 | L2 | ambiguity and CNR |
 * | ------- | -- | -- | ----------------- |
 * | 1001    | x  |    |                   |
 * | 1002    | x  |    | x                 |
 * | 1003    | x  | x  |                   |
 * | 1004    | x  | x  | x                 |
 */
#[derive(Debug, PartialEq, DekuRead, Clone)]
#[deku(endian = "big")]
pub struct GpsObservables {
    #[deku(bits = 12)]
    pub message_number: u16,
    #[deku(bits = 12)]
    pub station_id: u16,
    /// GPS epoch time, milliseconds of the week (no week number)
    #[deku(bits = 30)]
    pub tow_ms: u32,
    /// More messages follow for the same epoch
    #[deku(bits = 1)]
    pub synchronous: bool,
    #[deku(bits = 5)]
    pub num_sats: u8,
    #[deku(bits = 1)]
    pub smoothing: bool,
    #[deku(bits = 3)]
    pub smoothing_interval: u8,
    #[deku(
        count = "num_sats",
        ctx = "*message_number"
    )]
    pub satellites: Vec<GpsSatellite>,
}

#[derive(Debug, PartialEq, DekuRead, Clone)]
#[deku(
    endian = "endian",
    ctx = "endian: deku::ctx::Endian, message_number: u16"
)]
pub struct GpsSatellite {
    #[deku(bits = 6)]
    pub prn: u8,
    /// 0: C/A code, 1: P(Y) code
    #[deku(bits = 1)]
    pub l1_code: u8,
    /// Pseudorange modulo one light-millisecond, 0.02 m
    #[deku(bits = 24)]
    pub l1_pseudorange: u32,
    /// Phaserange minus pseudorange, 0.0005 m (signed, 20 bits)
    #[deku(bits = 20)]
    pub l1_phase_diff: u32,
    #[deku(bits = 7)]
    pub l1_lock: u8,
    /// Integer number of light-milliseconds
    #[deku(
        bits = 8,
        cond = "message_number == 1002 || message_number == 1004"
    )]
    pub l1_ambiguity: Option<u8>,
    /// 0.25 dBHz
    #[deku(
        bits = 8,
        cond = "message_number == 1002 || message_number == 1004"
    )]
    pub l1_cnr: Option<u8>,
    #[deku(bits = 2, cond = "message_number >= 1003")]
    pub l2_code: Option<u8>,
    /// L2 minus L1 pseudorange, 0.02 m (signed, 14 bits)
    #[deku(bits = 14, cond = "message_number >= 1003")]
    pub l2_pseudorange_diff: Option<u16>,
    /// L2 phaserange minus L1 pseudorange, 0.0005 m (signed, 20 bits)
    #[deku(bits = 20, cond = "message_number >= 1003")]
    pub l2_phase_diff: Option<u32>,
    #[deku(bits = 7, cond = "message_number >= 1003")]
    pub l2_lock: Option<u8>,
    #[deku(bits = 8, cond = "message_number == 1004")]
    pub l2_cnr: Option<u8>,
}

/**
 * ## GLONASS RTK observables (1009 to 1012)
 *
 * Same structure as the GPS messages, with the epoch counted in
 * milliseconds of the GLONASS day and the frequency channel of each
 * satellite.
 */
#[derive(Debug, PartialEq, DekuRead, Clone)]
#[deku(endian = "big")]
pub struct GlonassObservables {
    #[deku(bits = 12)]
    pub message_number: u16,
    #[deku(bits = 12)]
    pub station_id: u16,
    /// GLONASS epoch time, milliseconds of the day (Moscow time)
    #[deku(bits = 27)]
    pub tod_ms: u32,
    #[deku(bits = 1)]
    pub synchronous: bool,
    #[deku(bits = 5)]
    pub num_sats: u8,
    #[deku(bits = 1)]
    pub smoothing: bool,
    #[deku(bits = 3)]
    pub smoothing_interval: u8,
    #[deku(
        count = "num_sats",
        ctx = "*message_number"
    )]
    pub satellites: Vec<GlonassSatellite>,
}

#[derive(Debug, PartialEq, DekuRead, Clone)]
#[deku(
    endian = "endian",
    ctx = "endian: deku::ctx::Endian, message_number: u16"
)]
pub struct GlonassSatellite {
    #[deku(bits = 6)]
    pub slot: u8,
    #[deku(bits = 1)]
    pub l1_code: u8,
    /// Frequency channel number, transmitted with an offset of 7
    #[deku(
        bits = 5,
        map = "|v: u8| -> Result<_, DekuError> { Ok(v as i8 - 7) }"
    )]
    pub channel: i8,
    #[deku(bits = 25)]
    pub l1_pseudorange: u32,
    #[deku(bits = 20)]
    pub l1_phase_diff: u32,
    #[deku(bits = 7)]
    pub l1_lock: u8,
    /// Integer number of 599584.916 m
    #[deku(
        bits = 7,
        cond = "message_number == 1010 || message_number == 1012"
    )]
    pub l1_ambiguity: Option<u8>,
    #[deku(
        bits = 8,
        cond = "message_number == 1010 || message_number == 1012"
    )]
    pub l1_cnr: Option<u8>,
    #[deku(bits = 2, cond = "message_number >= 1011")]
    pub l2_code: Option<u8>,
    #[deku(bits = 14, cond = "message_number >= 1011")]
    pub l2_pseudorange_diff: Option<u16>,
    #[deku(bits = 20, cond = "message_number >= 1011")]
    pub l2_phase_diff: Option<u32>,
    #[deku(bits = 7, cond = "message_number >= 1011")]
    pub l2_lock: Option<u8>,
    #[deku(bits = 8, cond = "message_number == 1012")]
    pub l2_cnr: Option<u8>,
}
