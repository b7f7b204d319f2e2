use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crc::crc16_ccitt;

/// Size of every report frame on the air, checksum included.
pub const FRAME_LEN: usize = 20;
const CRC_OFFSET: usize = FRAME_LEN - 2;

pub type Frame = [u8; FRAME_LEN];

/// One node's position/status sample.
///
/// Layout (little-endian):
/// `origin u16 | seq u16 | lat_e7 i32 | lon_e7 i32 | speed_cms u16 |
///  heading_cdeg u16 | battery u8 | hops u8 | crc u16`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPacket {
    pub origin_id: u16,
    pub sequence: u16,
    pub latitude_e7: i32,
    pub longitude_e7: i32,
    pub speed_cms: u16,
    pub heading_cdeg: u16,
    pub battery_pct: u8,
    pub hop_count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("frame length {got}, expected {}", FRAME_LEN)]
    Length { got: usize },
    #[error("checksum mismatch: frame carries {carried:#06x}, computed {computed:#06x}")]
    Checksum { carried: u16, computed: u16 },
}

impl ReportPacket {
    pub fn encode(&self) -> Frame {
        let mut f = [0u8; FRAME_LEN];
        f[0..2].copy_from_slice(&self.origin_id.to_le_bytes());
        f[2..4].copy_from_slice(&self.sequence.to_le_bytes());
        f[4..8].copy_from_slice(&self.latitude_e7.to_le_bytes());
        f[8..12].copy_from_slice(&self.longitude_e7.to_le_bytes());
        f[12..14].copy_from_slice(&self.speed_cms.to_le_bytes());
        f[14..16].copy_from_slice(&self.heading_cdeg.to_le_bytes());
        f[16] = self.battery_pct;
        f[17] = self.hop_count;
        // checksum goes in last, over everything before it
        let crc = crc16_ccitt(&f[..CRC_OFFSET]);
        f[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        f
    }

    /// Whole-frame decode. Anything that is not exactly one intact frame
    /// is rejected without looking at the fields.
    pub fn decode(bytes: &[u8]) -> Result<Self, Rejected> {
        if bytes.len() != FRAME_LEN {
            return Err(Rejected::Length { got: bytes.len() });
        }
        let carried = u16::from_le_bytes([bytes[CRC_OFFSET], bytes[CRC_OFFSET + 1]]);
        let computed = crc16_ccitt(&bytes[..CRC_OFFSET]);
        if carried != computed {
            return Err(Rejected::Checksum { carried, computed });
        }

        Ok(Self {
            origin_id: u16::from_le_bytes([bytes[0], bytes[1]]),
            sequence: u16::from_le_bytes([bytes[2], bytes[3]]),
            latitude_e7: i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            longitude_e7: i32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            speed_cms: u16::from_le_bytes([bytes[12], bytes[13]]),
            heading_cdeg: u16::from_le_bytes([bytes[14], bytes[15]]),
            battery_pct: bytes[16],
            hop_count: bytes[17],
        })
    }

    /// Copy as it goes back on the air after one more relay.
    pub fn relayed(&self) -> Self {
        Self { hop_count: self.hop_count.saturating_add(1), ..*self }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude_e7 as f64 / 1e7
    }

    pub fn longitude(&self) -> f64 {
        self.longitude_e7 as f64 / 1e7
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReportPacket {
        ReportPacket {
            origin_id: 7,
            sequence: 3,
            latitude_e7: 130_800_000,
            longitude_e7: 802_700_000,
            speed_cms: 150,
            heading_cdeg: 18_000,
            battery_pct: 85,
            hop_count: 0,
        }
    }

    #[test]
    fn roundtrip_reference_report() {
        let p = sample();
        let f = p.encode();
        assert_eq!(f.len(), FRAME_LEN);
        assert_eq!(ReportPacket::decode(&f), Ok(p));
    }

    #[test]
    fn roundtrip_extremes() {
        let p = ReportPacket {
            origin_id: u16::MAX,
            sequence: u16::MAX,
            latitude_e7: -900_000_000,
            longitude_e7: i32::MIN,
            speed_cms: u16::MAX,
            heading_cdeg: 35_999,
            battery_pct: 100,
            hop_count: 4,
        };
        assert_eq!(ReportPacket::decode(&p.encode()), Ok(p));
    }

    #[test]
    fn roundtrip_random_fields() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x0B0A7);
        for _ in 0..2_000 {
            let p = ReportPacket {
                origin_id: rng.gen(),
                sequence: rng.gen(),
                latitude_e7: rng.gen_range(-900_000_000..=900_000_000),
                longitude_e7: rng.gen_range(-1_800_000_000..=1_800_000_000),
                speed_cms: rng.gen(),
                heading_cdeg: rng.gen_range(0..36_000),
                battery_pct: rng.gen_range(0..=100),
                hop_count: rng.gen(),
            };
            let f = p.encode();
            assert_eq!(ReportPacket::decode(&f), Ok(p));
            assert_eq!(ReportPacket::decode(&f).map(|d| d.encode()), Ok(f));
        }
    }

    #[test]
    fn layout_is_little_endian_in_field_order() {
        let f = sample().encode();
        assert_eq!(&f[0..2], &[7, 0]);
        assert_eq!(&f[2..4], &[3, 0]);
        assert_eq!(&f[4..8], &130_800_000i32.to_le_bytes());
        assert_eq!(f[16], 85);
        assert_eq!(f[17], 0);
        let crc = crc16_ccitt(&f[..18]);
        assert_eq!(&f[18..20], &crc.to_le_bytes());
    }

    #[test]
    fn corrupted_payload_byte_is_rejected() {
        let mut f = sample().encode();
        f[5] ^= 0x01;
        assert!(matches!(ReportPacket::decode(&f), Err(Rejected::Checksum { .. })));
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut f = sample().encode();
        f[19] = f[19].wrapping_add(1);
        assert!(matches!(ReportPacket::decode(&f), Err(Rejected::Checksum { .. })));
    }

    #[test]
    fn every_single_bit_flip_is_rejected() {
        let good = sample().encode();
        for byte in 0..FRAME_LEN {
            for bit in 0..8 {
                let mut f = good;
                f[byte] ^= 1 << bit;
                assert!(ReportPacket::decode(&f).is_err(), "flip byte {byte} bit {bit}");
            }
        }
    }

    #[test]
    fn wrong_length_is_rejected() {
        let f = sample().encode();
        assert_eq!(ReportPacket::decode(&f[..19]), Err(Rejected::Length { got: 19 }));
        let mut long = f.to_vec();
        long.push(0);
        assert_eq!(ReportPacket::decode(&long), Err(Rejected::Length { got: 21 }));
        assert_eq!(ReportPacket::decode(&[]), Err(Rejected::Length { got: 0 }));
    }

    #[test]
    fn relayed_bumps_hops_and_reencodes_valid() {
        let r = sample().relayed();
        assert_eq!(r.hop_count, 1);
        assert_eq!(r.sequence, 3);
        assert_eq!(ReportPacket::decode(&r.encode()), Ok(r));
    }
}
