use crc::Crc;

/// CRC-16/ARC: poly 0x8005 (reflected), seed 0x0000, no final xor.
/// Both ends of a link must agree on this.
pub static CRC16: Crc<u16> = Crc::<u16>::new(&crc::CRC_16_ARC);

/// Running CRC accumulator. Owned by whoever is walking the byte stream and
/// handed back from every update, never kept anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunningCrc(u16);

impl RunningCrc {
    pub const fn new() -> RunningCrc {
        RunningCrc(0)
    }

    #[must_use]
    pub fn update(self, byte: u8) -> RunningCrc {
        self.update_slice(&[byte])
    }

    #[must_use]
    pub fn update_slice(self, bytes: &[u8]) -> RunningCrc {
        // ARC is reflected, the digest reflects a custom seed on the way in
        let mut d = CRC16.digest_with_initial(self.0.reverse_bits());
        d.update(bytes);
        RunningCrc(d.finalize())
    }

    /// Current checksum over everything folded in so far.
    pub const fn value(&self) -> u16 {
        self.0
    }
}

/// Fold one byte into `acc` and return the new accumulator.
#[must_use]
pub fn update(acc: RunningCrc, byte: u8) -> RunningCrc {
    acc.update(byte)
}

/// One-shot checksum of a complete byte range.
pub fn checksum(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        // Catalogue check value for CRC-16/ARC
        assert_eq!(checksum(b"123456789"), 0xBB3D);
    }

    #[test]
    fn seed_is_zero() {
        assert_eq!(RunningCrc::new().value(), 0);
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn byte_at_a_time_matches_one_shot() {
        let data = [0x01, 0x02, 0x0A, 0x0B, 0xFF, 0x00, 0x7E];
        let acc = data.iter().fold(RunningCrc::new(), |acc, b| update(acc, *b));
        assert_eq!(acc.value(), checksum(&data));
        assert_eq!(acc, RunningCrc::new().update_slice(&data));
    }

    #[test]
    fn resumes_from_any_split() {
        let data = b"FF FF 01 02 resume me";
        for split in 0..=data.len() {
            let head = RunningCrc::new().update_slice(&data[..split]);
            assert_eq!(head.update_slice(&data[split..]).value(), checksum(data));
        }
    }
}
