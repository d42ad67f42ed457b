//! Streaming decompressor for the compressed iCE40 bitstream container.
//!
//! The container is two 32-bit magic words followed by a bit-level token
//! stream of zero-runs and literal copies. Decoded bits accumulate in an
//! 8-bit shift register and every completed byte is pushed straight out to
//! the configuration port, so only the compressed input and one output
//! byte are ever held in memory; the decompressed bitstream never is.

/// First magic word ("ICEC").
pub const MAGIC_WORD_0: u32 = 0x4943_4543;
/// Second magic word ("OMPR").
pub const MAGIC_WORD_1: u32 = 0x4F4D_5052;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceError {
    /// The stream does not begin with the two required magic words.
    BadMagic,
    /// The stream ended in the middle of a token.
    UnexpectedEof,
}

/// Byte sink for decompressed output. On hardware this is the FPGA's
/// configuration SPI; in tests, a growable buffer.
pub trait ConfigPort {
    fn send_byte(&mut self, byte: u8);
}

impl ConfigPort for alloc::vec::Vec<u8> {
    fn send_byte(&mut self, byte: u8) {
        self.push(byte);
    }
}

/// MSB-first bit reader over the compressed input.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bits_left: u8,
    current: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bits_left: 0,
            current: 0,
        }
    }

    fn read_bit(&mut self) -> Result<bool, IceError> {
        if self.bits_left == 0 {
            if self.pos >= self.data.len() {
                return Err(IceError::UnexpectedEof);
            }
            self.current = self.data[self.pos];
            self.pos += 1;
            self.bits_left = 8;
        }
        self.bits_left -= 1;
        Ok((self.current >> self.bits_left) & 1 != 0)
    }

    fn read_int(&mut self, bits: u32) -> Result<u32, IceError> {
        let mut value = 0u32;
        for _ in 0..bits {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Ok(value)
    }
}

/// MSB-first output shift register that emits each completed byte.
struct ByteWriter<'a, P: ConfigPort> {
    port: &'a mut P,
    shift: u8,
    bits_left: u8,
}

impl<'a, P: ConfigPort> ByteWriter<'a, P> {
    fn new(port: &'a mut P) -> Self {
        Self {
            port,
            shift: 0,
            bits_left: 8,
        }
    }

    fn write_bit(&mut self, value: bool) {
        self.bits_left -= 1;
        if value {
            self.shift |= 1 << self.bits_left;
        }
        if self.bits_left == 0 {
            self.port.send_byte(self.shift);
            self.shift = 0;
            self.bits_left = 8;
        }
    }

    fn write_zeros(&mut self, mut bits: u32) {
        while bits > 0 {
            self.write_bit(false);
            bits -= 1;
        }
    }

    /// Pad the in-progress byte with zeros and emit it, if any bits are
    /// pending.
    fn flush(&mut self) {
        if self.bits_left < 8 {
            self.port.send_byte(self.shift);
            self.shift = 0;
            self.bits_left = 8;
        }
    }
}

/// Decompress `input` onto `port`.
///
/// Tokens are tested in fixed priority order each iteration:
/// 2/5/8-bit-length zero-run + terminator, 6-bit-length literal copy +
/// terminator, 23-bit-length zero-run + terminator, and finally an
/// unterminated 23-bit zero-run that self-delimits the stream.
pub fn uncompress<P: ConfigPort>(input: &[u8], port: &mut P) -> Result<(), IceError> {
    let mut reader = BitReader::new(input);

    if reader.read_int(32)? != MAGIC_WORD_0 || reader.read_int(32)? != MAGIC_WORD_1 {
        return Err(IceError::BadMagic);
    }

    let mut writer = ByteWriter::new(port);
    loop {
        if reader.read_bit()? {
            let n = reader.read_int(2)?;
            writer.write_zeros(n);
            writer.write_bit(true);
        } else if reader.read_bit()? {
            let n = reader.read_int(5)?;
            writer.write_zeros(n);
            writer.write_bit(true);
        } else if reader.read_bit()? {
            let n = reader.read_int(8)?;
            writer.write_zeros(n);
            writer.write_bit(true);
        } else if reader.read_bit()? {
            let mut n = reader.read_int(6)?;
            while n > 0 {
                let bit = reader.read_bit()?;
                writer.write_bit(bit);
                n -= 1;
            }
            writer.write_bit(true);
        } else if reader.read_bit()? {
            let n = reader.read_int(23)?;
            writer.write_zeros(n);
            writer.write_bit(true);
        } else {
            // Final zero-run with no terminator: end of stream.
            let n = reader.read_int(23)?;
            writer.write_zeros(n);
            break;
        }
    }
    writer.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-rolled MSB-first bit packer for building token streams.
    struct BitVec {
        bytes: Vec<u8>,
        bits: u8,
    }

    impl BitVec {
        fn new() -> Self {
            Self {
                bytes: Vec::new(),
                bits: 0,
            }
        }

        fn push_bit(&mut self, bit: bool) {
            if self.bits % 8 == 0 {
                self.bytes.push(0);
            }
            if bit {
                let last = self.bytes.last_mut().unwrap();
                *last |= 1 << (7 - self.bits % 8);
            }
            self.bits = (self.bits + 1) % 8;
        }

        fn push_int(&mut self, value: u32, bits: u32) {
            for i in (0..bits).rev() {
                self.push_bit((value >> i) & 1 != 0);
            }
        }

        fn with_magic() -> Self {
            let mut v = Self::new();
            v.push_int(MAGIC_WORD_0, 32);
            v.push_int(MAGIC_WORD_1, 32);
            v
        }
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut out = Vec::new();
        let mut v = BitVec::new();
        v.push_int(0xDEADBEEF, 32);
        v.push_int(MAGIC_WORD_1, 32);
        v.push_int(0, 24);
        assert_eq!(uncompress(&v.bytes, &mut out), Err(IceError::BadMagic));
        assert!(out.is_empty());
    }

    #[test]
    fn test_truncated_stream() {
        let mut out = Vec::new();
        let v = BitVec::with_magic();
        assert_eq!(uncompress(&v.bytes, &mut out), Err(IceError::UnexpectedEof));
    }

    #[test]
    fn test_final_zero_run_emits_exactly_l_bits() {
        // Single final (non-terminated) 23-bit zero-run of length 24.
        let mut v = BitVec::with_magic();
        v.push_int(0, 5); // token prefix 00000
        v.push_int(24, 23);
        let mut out = Vec::new();
        uncompress(&v.bytes, &mut out).unwrap();
        assert_eq!(out, vec![0u8; 3]);
    }

    #[test]
    fn test_final_zero_run_pads_to_full_byte() {
        // 20 zero bits pad out to 3 bytes.
        let mut v = BitVec::with_magic();
        v.push_int(0, 5);
        v.push_int(20, 23);
        let mut out = Vec::new();
        uncompress(&v.bytes, &mut out).unwrap();
        assert_eq!(out, vec![0u8; 3]);
    }

    #[test]
    fn test_short_zero_run_tokens() {
        // "1" + len 2 -> two zeros then a one: 0b0010_0000 after the
        // final run pads the byte out.
        let mut v = BitVec::with_magic();
        v.push_bit(true);
        v.push_int(2, 2);
        v.push_int(0, 5); // end: zero-length final run
        v.push_int(0, 23);
        let mut out = Vec::new();
        uncompress(&v.bytes, &mut out).unwrap();
        assert_eq!(out, vec![0b0010_0000]);
    }

    #[test]
    fn test_literal_copy_token() {
        // Token 0001, n=3, bits 101, then implicit terminator one.
        let mut v = BitVec::with_magic();
        v.push_int(0b0001, 4);
        v.push_int(3, 6);
        v.push_bit(true);
        v.push_bit(false);
        v.push_bit(true);
        v.push_int(0, 5);
        v.push_int(0, 23);
        let mut out = Vec::new();
        uncompress(&v.bytes, &mut out).unwrap();
        // Bits: 1 0 1 1 padded with zeros.
        assert_eq!(out, vec![0b1011_0000]);
    }

    #[test]
    fn test_medium_zero_run_token() {
        // "001" + 8-bit len 9: nine zeros, a one, then end.
        let mut v = BitVec::with_magic();
        v.push_int(0b001, 3);
        v.push_int(9, 8);
        v.push_int(0, 5);
        v.push_int(0, 23);
        let mut out = Vec::new();
        uncompress(&v.bytes, &mut out).unwrap();
        assert_eq!(out, vec![0b0000_0000, 0b0100_0000]);
    }
}
