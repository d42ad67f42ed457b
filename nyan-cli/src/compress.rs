use anyhow::{ensure, Result};
use nyanos::ice::{MAGIC_WORD_0, MAGIC_WORD_1};

/// Largest zero-run a single token can carry.
const MAX_RUN_BITS: u32 = (1 << 23) - 1;

/// MSB-first bit packer for the token stream.
struct BitWriter {
    bytes: Vec<u8>,
    bits_used: u8,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            bits_used: 0,
        }
    }

    fn push_bit(&mut self, bit: bool) {
        if self.bits_used % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let idx = self.bytes.len() - 1;
            self.bytes[idx] |= 1 << (7 - self.bits_used % 8);
        }
        self.bits_used = (self.bits_used + 1) % 8;
    }

    fn push_int(&mut self, value: u32, bits: u32) {
        for i in (0..bits).rev() {
            self.push_bit((value >> i) & 1 != 0);
        }
    }

    /// Final byte stays zero-padded; the trailing token self-delimits so
    /// the decoder never reads the padding.
    fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// One zero-run followed by a one bit, shortest token that fits.
fn emit_run(writer: &mut BitWriter, run: u32) {
    if run < 4 {
        writer.push_bit(true);
        writer.push_int(run, 2);
    } else if run < 32 {
        writer.push_int(0b01, 2);
        writer.push_int(run, 5);
    } else if run < 256 {
        writer.push_int(0b001, 3);
        writer.push_int(run, 8);
    } else {
        writer.push_int(0b0000_1, 5);
        writer.push_int(run, 23);
    }
}

/// Compress a raw iCE40 bitstream into the zero-run token container the
/// keyboard decompresses on the fly.
///
/// Only run tokens are emitted; the literal-copy token exists for
/// pathological inputs and the device decodes it, but runs always suffice
/// and compress better on real bitstreams, which are mostly zeros.
pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    ensure!(
        (input.len() as u64) * 8 <= MAX_RUN_BITS as u64,
        "bitstream too large to encode: {} bytes",
        input.len()
    );

    let mut writer = BitWriter::new();
    writer.push_int(MAGIC_WORD_0, 32);
    writer.push_int(MAGIC_WORD_1, 32);

    let mut run: u32 = 0;
    for bit_idx in 0..input.len() * 8 {
        let bit = (input[bit_idx / 8] >> (7 - bit_idx % 8)) & 1;
        if bit == 0 {
            run += 1;
        } else {
            emit_run(&mut writer, run);
            run = 0;
        }
    }

    // Trailing zeros go out as the unterminated final run; a zero-length
    // run is valid and just marks the end of the stream.
    writer.push_int(0, 5);
    writer.push_int(run, 23);

    Ok(writer.finish())
}

/// True if `data` already starts with the container magic.
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= 8
        && data[..4] == MAGIC_WORD_0.to_be_bytes()
        && data[4..8] == MAGIC_WORD_1.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nyanos::ice;

    fn round_trip(input: &[u8]) -> Vec<u8> {
        let compressed = compress(input).unwrap();
        let mut out = Vec::new();
        ice::uncompress(&compressed, &mut out).unwrap();
        out
    }

    #[test]
    fn test_round_trip_empty() {
        assert_eq!(round_trip(&[]), Vec::<u8>::new());
    }

    #[test]
    fn test_round_trip_all_zeros() {
        let input = vec![0u8; 1024];
        assert_eq!(round_trip(&input), input);
    }

    #[test]
    fn test_round_trip_all_ones() {
        let input = vec![0xFFu8; 64];
        assert_eq!(round_trip(&input), input);
    }

    #[test]
    fn test_round_trip_mixed_payload() {
        // Pseudo-random but deterministic byte soup exercising every
        // run-length token class.
        let mut input = Vec::new();
        let mut state: u32 = 0x1234_5678;
        for i in 0..4096usize {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            input.push(if i % 37 == 0 { (state >> 24) as u8 } else { 0 });
        }
        assert_eq!(round_trip(&input), input);
    }

    #[test]
    fn test_run_token_boundaries() {
        // Runs of length 3, 4, 31, 32, 255 and 256 each land in a
        // different (or boundary) token class.
        for run in [3usize, 4, 31, 32, 255, 256] {
            let mut bits = vec![false; run];
            bits.push(true);
            // Pack the bit vector into bytes.
            let mut input = vec![0u8; (bits.len() + 7) / 8];
            for (i, &bit) in bits.iter().enumerate() {
                if bit {
                    input[i / 8] |= 1 << (7 - i % 8);
                }
            }
            assert_eq!(round_trip(&input), input, "run length {}", run);
        }
    }

    #[test]
    fn test_sparse_input_compresses() {
        let mut input = vec![0u8; 4096];
        input[100] = 0x80;
        input[4000] = 0x01;
        let compressed = compress(&input).unwrap();
        assert!(compressed.len() < 32);
    }

    #[test]
    fn test_magic_header_present() {
        let compressed = compress(&[0x00]).unwrap();
        assert!(is_compressed(&compressed));
        assert_eq!(&compressed[..4], b"ICEC");
        assert_eq!(&compressed[4..8], b"OMPR");
    }

    #[test]
    fn test_oversized_input_rejected() {
        let input = vec![0u8; (MAX_RUN_BITS as usize / 8) + 1];
        assert!(compress(&input).is_err());
    }
}
