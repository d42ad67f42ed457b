//! Configuration loader for the Lattice iCE40HX FPGA.
//!
//! Configuration is SPI slave mode: hold the device in reset, select it,
//! clock in the full bitstream, then keep clocking dummy bytes until CDONE
//! rises plus at least 49 extra clocks. The bitstream is stored compressed
//! in the EEPROM's high bank and is streamed through the decompressor
//! directly onto the configuration port, so only the compressed copy is
//! ever resident. The data cache is disabled across the transfer; with it
//! enabled the streamed output bytes arrive with timing the device does
//! not tolerate.

extern crate alloc;

use alloc::vec::Vec;

use crate::eeprom::{Eeprom, EepromBus, EepromError, PAGE_SIZE};
use crate::eeprom_map::{ADDR_FPGA_BITSTREAM, ADDR_FPGA_BITSTREAM_LEN, BITSTREAM_LEN_SLOT_OFFSET, SIZE_FPGA_BITSTREAM_LEN};
use crate::ice::{self, ConfigPort, IceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpgaError {
    /// The stored bitstream length record is zero.
    EmptyBitstream,
    /// The compressed bitstream buffer could not be allocated.
    Alloc,
    /// The compressed stream failed to decode.
    Decode(IceError),
    /// Reading the bitstream out of storage failed.
    Storage(EepromError),
}

impl From<IceError> for FpgaError {
    fn from(err: IceError) -> Self {
        FpgaError::Decode(err)
    }
}

impl From<EepromError> for FpgaError {
    fn from(err: EepromError) -> Self {
        FpgaError::Storage(err)
    }
}

/// Hardware seam for the configuration link: the SPI byte path plus the
/// CRESET/SS lines, the CDONE input, and the cache control the transfer
/// needs.
pub trait FpgaPort: ConfigPort {
    /// Drive the CRESET_B line (false = held in reset).
    fn set_reset(&mut self, level: bool);
    /// Drive the slave-select line (false = selected).
    fn set_cs(&mut self, level: bool);
    /// Sample the CDONE line.
    fn config_done(&mut self) -> bool;
    fn delay_us(&mut self, us: u32);
    fn dcache_disable(&mut self);
    fn dcache_enable(&mut self);
}

pub struct LatticeIceHx {
    pub configured: bool,
    /// Compressed size read from storage during the last configure attempt.
    pub bitstream_compressed_size: u16,
}

impl LatticeIceHx {
    pub const fn new() -> Self {
        Self {
            configured: false,
            bitstream_compressed_size: 0,
        }
    }

    /// Load the stored bitstream into the FPGA.
    ///
    /// Any failure leaves `configured` false and releases whatever was
    /// read so far. The data cache is re-enabled on every exit path.
    pub fn configure<B: EepromBus, P: FpgaPort>(
        &mut self,
        eeprom: &mut Eeprom,
        bus: &mut B,
        port: &mut P,
    ) -> Result<(), FpgaError> {
        self.configured = false;
        port.dcache_disable();
        let result = self.configure_inner(eeprom, bus, port);
        port.dcache_enable();
        self.configured = result.is_ok();
        result
    }

    fn configure_inner<B: EepromBus, P: FpgaPort>(
        &mut self,
        eeprom: &mut Eeprom,
        bus: &mut B,
        port: &mut P,
    ) -> Result<(), FpgaError> {
        let compressed = self.read_bitstream(eeprom, bus)?;

        // Reset pulse: CRESET_B low for at least 200 ns with SS high.
        port.set_cs(true);
        port.set_reset(false);
        port.delay_us(1);
        port.set_reset(true);
        // Device-side housekeeping window before it will accept clocks.
        port.delay_us(1200);

        // Select, then one dummy byte for 8 alignment clocks.
        port.set_cs(false);
        port.send_byte(0x00);

        ice::uncompress(&compressed, port)?;
        drop(compressed);

        // No timeout: a bitstream the device rejects spins here forever.
        while !port.config_done() {}

        // At least 49 clocks after CDONE to release the user design.
        for _ in 0..49 {
            port.send_byte(0x00);
        }
        port.set_cs(true);
        Ok(())
    }

    /// Read the length record and then the compressed image, page by page.
    fn read_bitstream<B: EepromBus>(
        &mut self,
        eeprom: &mut Eeprom,
        bus: &mut B,
    ) -> Result<Vec<u8>, FpgaError> {
        let slot = eeprom.read_blocking(bus, false, ADDR_FPGA_BITSTREAM_LEN, SIZE_FPGA_BITSTREAM_LEN)?;
        let size = u16::from_le_bytes([
            slot[BITSTREAM_LEN_SLOT_OFFSET],
            slot[BITSTREAM_LEN_SLOT_OFFSET + 1],
        ]);
        self.bitstream_compressed_size = size;
        if size == 0 {
            return Err(FpgaError::EmptyBitstream);
        }

        let size = size as usize;
        let mut compressed = Vec::new();
        compressed.try_reserve_exact(size).map_err(|_| FpgaError::Alloc)?;

        let mut offset = 0usize;
        while offset < size {
            let chunk = PAGE_SIZE.min(size - offset);
            let page = eeprom.read_blocking(bus, true, ADDR_FPGA_BITSTREAM + offset as u16, chunk)?;
            compressed.extend_from_slice(page);
            offset += chunk;
        }
        Ok(compressed)
    }
}

impl Default for LatticeIceHx {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eeprom::EepromEvent;
    use crate::eeprom_map::SIZE_FPGA_BITSTREAM;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum PortEvent {
        Byte(u8),
        Reset(bool),
        Cs(bool),
        DelayUs(u32),
        DcacheOff,
        DcacheOn,
    }

    struct MockPort {
        events: Vec<PortEvent>,
        done_after_polls: u32,
    }

    impl MockPort {
        fn new() -> Self {
            Self {
                events: Vec::new(),
                done_after_polls: 0,
            }
        }

        fn bytes(&self) -> Vec<u8> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    PortEvent::Byte(b) => Some(*b),
                    _ => None,
                })
                .collect()
        }
    }

    impl ConfigPort for MockPort {
        fn send_byte(&mut self, byte: u8) {
            self.events.push(PortEvent::Byte(byte));
        }
    }

    impl FpgaPort for MockPort {
        fn set_reset(&mut self, level: bool) {
            self.events.push(PortEvent::Reset(level));
        }

        fn set_cs(&mut self, level: bool) {
            self.events.push(PortEvent::Cs(level));
        }

        fn config_done(&mut self) -> bool {
            if self.done_after_polls == 0 {
                true
            } else {
                self.done_after_polls -= 1;
                false
            }
        }

        fn delay_us(&mut self, us: u32) {
            self.events.push(PortEvent::DelayUs(us));
        }

        fn dcache_disable(&mut self) {
            self.events.push(PortEvent::DcacheOff);
        }

        fn dcache_enable(&mut self) {
            self.events.push(PortEvent::DcacheOn);
        }
    }

    /// Storage mock backed by flat low-bank and high-bank images.
    struct MockStorage {
        low: Vec<u8>,
        high: Vec<u8>,
        last_read: Option<(u8, u16, usize)>,
        pending: Option<EepromEvent>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                low: vec![0; 256],
                high: vec![0; SIZE_FPGA_BITSTREAM],
                last_read: None,
                pending: None,
            }
        }

        fn with_bitstream(compressed: &[u8]) -> Self {
            let mut storage = Self::new();
            let len = (compressed.len() as u16).to_le_bytes();
            let slot = ADDR_FPGA_BITSTREAM_LEN as usize + BITSTREAM_LEN_SLOT_OFFSET;
            storage.low[slot..slot + 2].copy_from_slice(&len);
            storage.high[..compressed.len()].copy_from_slice(compressed);
            storage
        }
    }

    impl EepromBus for MockStorage {
        fn start_write(&mut self, _control: u8, _address: u16, _data: &[u8]) -> Result<(), EepromError> {
            unimplemented!("no writes in these tests")
        }

        fn start_read(&mut self, control: u8, address: u16, len: usize) -> Result<(), EepromError> {
            self.last_read = Some((control, address, len));
            self.pending = Some(EepromEvent::RxComplete);
            Ok(())
        }

        fn poll(&mut self, rx_buf: &mut [u8]) -> Option<EepromEvent> {
            let ev = self.pending.take();
            if ev == Some(EepromEvent::RxComplete) {
                let (control, address, len) = self.last_read.unwrap();
                let bank = if control & 0x08 != 0 { &self.high } else { &self.low };
                let start = address as usize;
                rx_buf[..len].copy_from_slice(&bank[start..start + len]);
            }
            ev
        }
    }

    /// Minimal valid compressed image: both magic words followed by one
    /// final zero-run of 16 bits (decodes to two zero bytes).
    fn tiny_compressed() -> Vec<u8> {
        vec![
            0x49, 0x43, 0x45, 0x43, // ICEC
            0x4F, 0x4D, 0x50, 0x52, // OMPR
            0b0000_0000, 0b0000_0000, 0b0000_0001, 0b0000_0000,
        ]
    }

    #[test]
    fn test_empty_bitstream_aborts_unconfigured() {
        let mut fpga = LatticeIceHx::new();
        let mut eeprom = Eeprom::new(false, false);
        let mut storage = MockStorage::new();
        let mut port = MockPort::new();

        let result = fpga.configure(&mut eeprom, &mut storage, &mut port);
        assert_eq!(result, Err(FpgaError::EmptyBitstream));
        assert!(!fpga.configured);
        // No reset pulse and nothing clocked out.
        assert_eq!(port.events, vec![PortEvent::DcacheOff, PortEvent::DcacheOn]);
    }

    #[test]
    fn test_bad_magic_leaves_unconfigured() {
        let mut fpga = LatticeIceHx::new();
        let mut eeprom = Eeprom::new(false, false);
        let mut storage = MockStorage::with_bitstream(&[0xFF; 12]);
        let mut port = MockPort::new();

        let result = fpga.configure(&mut eeprom, &mut storage, &mut port);
        assert_eq!(result, Err(FpgaError::Decode(IceError::BadMagic)));
        assert!(!fpga.configured);
        assert_eq!(port.events.last(), Some(&PortEvent::DcacheOn));
    }

    #[test]
    fn test_configure_happy_path() {
        let compressed = tiny_compressed();
        let mut fpga = LatticeIceHx::new();
        let mut eeprom = Eeprom::new(false, false);
        let mut storage = MockStorage::with_bitstream(&compressed);
        let mut port = MockPort::new();
        port.done_after_polls = 3;

        fpga.configure(&mut eeprom, &mut storage, &mut port).unwrap();
        assert!(fpga.configured);
        assert_eq!(fpga.bitstream_compressed_size, compressed.len() as u16);

        // 1 alignment dummy + 2 decompressed bytes + 49 trailing dummies.
        assert_eq!(port.bytes().len(), 52);

        // Reset pulse with SS deasserted, then select before clocking.
        assert_eq!(
            &port.events[..7],
            &[
                PortEvent::DcacheOff,
                PortEvent::Cs(true),
                PortEvent::Reset(false),
                PortEvent::DelayUs(1),
                PortEvent::Reset(true),
                PortEvent::DelayUs(1200),
                PortEvent::Cs(false),
            ]
        );
        assert_eq!(
            &port.events[port.events.len() - 2..],
            &[PortEvent::Cs(true), PortEvent::DcacheOn]
        );
    }

    #[test]
    fn test_bitstream_read_spans_pages() {
        // 300 compressed bytes force three page reads from the high bank.
        let mut compressed = tiny_compressed();
        compressed.resize(300, 0x00);
        // Keep the stream valid: the final run already self-delimits, so
        // trailing padding bytes are never decoded.
        let mut fpga = LatticeIceHx::new();
        let mut eeprom = Eeprom::new(false, false);
        let mut storage = MockStorage::with_bitstream(&compressed);
        let mut port = MockPort::new();

        fpga.configure(&mut eeprom, &mut storage, &mut port).unwrap();
        assert_eq!(fpga.bitstream_compressed_size, 300);
        assert!(fpga.configured);
    }
}
