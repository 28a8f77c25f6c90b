/// CRC-24Q (Qualcomm), as used by RTCM 3 frames
const CRC24Q_POLY: u32 = 0x1864cfb;

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            crc <<= 1;
            if crc & 0x1000000 != 0 {
                crc ^= CRC24Q_POLY;
            }
            bit += 1;
        }
        table[i] = crc & 0xffffff;
        i += 1;
    }
    table
}

static CRC24Q_TABLE: [u32; 256] = build_table();

pub fn crc24q(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |crc, &byte| {
        let idx = ((crc >> 16) as u8 ^ byte) as usize;
        ((crc << 8) ^ CRC24Q_TABLE[idx]) & 0xffffff
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc24q(b"123456789"), 0xcde703);
        assert_eq!(crc24q(&[]), 0);
    }
}
