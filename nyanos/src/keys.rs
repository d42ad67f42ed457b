//! Driver for the Nyan Keys FPGA key-scan IP.
//!
//! A scan is one fixed 9-byte full-duplex register transfer: the seven
//! key-state register addresses 0x01..0x07 followed by two dummy bytes
//! that flush the last response byte out of the IP's shift register. The
//! inbound frame is the key bitmap, byte 0 being a framing throwaway.
//! Completions are filtered through a warm-up window after power-on, then
//! compared byte-wise against a shadow copy; only a changed bitmap is
//! rendered into a HID report.

use crate::eeprom::{Eeprom, EepromBus};
use crate::eeprom_map::{ADDR_SUPER_KEY_DISABLE, SIZE_SUPER_KEY_DISABLE};
use crate::hid::HidReport;
use crate::keymap::{FN_KEY, KEYMAP, KEY_COUNT, NO_KEY, SUPER_KEY};

/// Length of the full-duplex scan frame.
pub const SCAN_FRAME_LEN: usize = 9;

/// Outgoing frame: register addresses plus the two trailing dummy bytes.
pub static SCAN_REQUEST: [u8; SCAN_FRAME_LEN] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x00, 0x00];

/// Scan completions discarded after power-on while the scan IP's outputs
/// settle. Sized empirically: the IP needs a few thousand reads before its
/// register contents stop glitching.
pub const WARMUP_READS: u32 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeysError {
    /// The bus could not start the transfer; retry next tick.
    TransferFailed,
}

/// Hardware seam for the scan link (SPI + slave select on the board).
pub trait KeysBus {
    fn start_transfer(&mut self, tx: &[u8; SCAN_FRAME_LEN]) -> Result<(), KeysError>;
}

pub struct NyanKeys {
    key_read_inflight: bool,
    key_states: [u8; SCAN_FRAME_LEN],
    /// Shadow of the previous bitmap for change detection.
    last_key_states: [u8; SCAN_FRAME_LEN],
    warmup_reads: u32,
    warmed_up: bool,
    /// Lifetime scan counter.
    pub scan_count: u32,
    scans_this_second: u32,
    /// Scan count latched once per second for `getperf`.
    pub scans_last_second: u32,
    /// Persistent super/meta key suppression (full-screen gaming).
    pub super_key_disabled: bool,
    super_toggle_latched: bool,
}

impl NyanKeys {
    pub const fn new(super_key_disabled: bool) -> Self {
        Self {
            key_read_inflight: false,
            key_states: [0xFF; SCAN_FRAME_LEN],
            last_key_states: [0xFF; SCAN_FRAME_LEN],
            warmup_reads: 0,
            warmed_up: false,
            scan_count: 0,
            scans_this_second: 0,
            scans_last_second: 0,
            super_key_disabled,
            super_toggle_latched: false,
        }
    }

    /// Issue a scan if none is outstanding. A bus start failure clears the
    /// in-flight flag immediately so the next tick retries.
    pub fn issue_scan<B: KeysBus>(&mut self, bus: &mut B) {
        if self.key_read_inflight {
            return;
        }
        self.key_read_inflight = true;
        if bus.start_transfer(&SCAN_REQUEST).is_err() {
            self.key_read_inflight = false;
        }
    }

    /// Latch the rolling one-second scan counter. Called from the 1 Hz
    /// tick.
    pub fn on_second_elapsed(&mut self) {
        self.scans_last_second = self.scans_this_second;
        self.scans_this_second = 0;
    }

    /// Handle a completed scan frame.
    ///
    /// Returns a freshly rendered report only when warmed up and the
    /// bitmap differs from the shadow copy; an unchanged bitmap never
    /// reaches the transport.
    pub fn on_scan_complete<B: EepromBus>(
        &mut self,
        frame: &[u8; SCAN_FRAME_LEN],
        eeprom: &mut Eeprom,
        bus: &mut B,
    ) -> Option<HidReport> {
        self.key_read_inflight = false;
        self.key_states = *frame;
        self.scan_count = self.scan_count.wrapping_add(1);
        self.scans_this_second = self.scans_this_second.wrapping_add(1);

        if !self.warmed_up {
            self.warmup_reads += 1;
            if self.warmup_reads < WARMUP_READS {
                return None;
            }
            self.warmed_up = true;
        }

        if self.key_states == self.last_key_states {
            return None;
        }

        let report = self.render(eeprom, bus);
        self.last_key_states = self.key_states;
        Some(report)
    }

    /// Active-low key state. The +1 byte offset skips the framing
    /// throwaway in the inbound frame.
    fn is_pressed(&self, index: usize) -> bool {
        let byte = 1 + index / 8;
        let bit = index % 8;
        (self.key_states[byte] >> bit) & 1 == 0
    }

    fn render<B: EepromBus>(&mut self, eeprom: &mut Eeprom, bus: &mut B) -> HidReport {
        let mut report = HidReport::new();
        let fn_active = self.is_pressed(FN_KEY);

        // Fn+Super toggles the persistent suppression and writes it
        // through, once per combo press.
        if fn_active && self.is_pressed(SUPER_KEY) {
            if !self.super_toggle_latched {
                self.super_toggle_latched = true;
                self.super_key_disabled = !self.super_key_disabled;
                self.persist_super_key_flag(eeprom, bus);
            }
        } else {
            self.super_toggle_latched = false;
        }

        for index in 0..KEY_COUNT {
            if index == FN_KEY || !self.is_pressed(index) {
                continue;
            }
            if index == SUPER_KEY && (self.super_key_disabled || fn_active) {
                continue;
            }
            let def = &KEYMAP[index];
            if def.modifier != 0 {
                report.set_modifier(def.modifier);
            }
            let code = if fn_active { def.fn_code } else { def.base };
            if code != NO_KEY {
                // A full report drops this key; the pass continues.
                let _ = report.push_key(code);
            }
        }

        report
    }

    fn persist_super_key_flag<B: EepromBus>(&mut self, eeprom: &mut Eeprom, bus: &mut B) {
        let record = [self.super_key_disabled as u8; SIZE_SUPER_KEY_DISABLE];
        let _ = eeprom.write_paged(bus, false, ADDR_SUPER_KEY_DISABLE, &record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eeprom::{EepromError, EepromEvent};
    use crate::keymap::{kc, modifier};

    struct MockKeysBus {
        transfers: usize,
        fail: bool,
    }

    impl KeysBus for MockKeysBus {
        fn start_transfer(&mut self, tx: &[u8; SCAN_FRAME_LEN]) -> Result<(), KeysError> {
            assert_eq!(tx, &SCAN_REQUEST);
            if self.fail {
                return Err(KeysError::TransferFailed);
            }
            self.transfers += 1;
            Ok(())
        }
    }

    struct MockEepromBus {
        writes: Vec<(u8, u16, Vec<u8>)>,
        pending: Option<EepromEvent>,
        nacks_remaining: u32,
    }

    impl MockEepromBus {
        fn new() -> Self {
            Self {
                writes: Vec::new(),
                pending: None,
                nacks_remaining: 0,
            }
        }
    }

    impl EepromBus for MockEepromBus {
        fn start_write(&mut self, control: u8, address: u16, data: &[u8]) -> Result<(), EepromError> {
            self.writes.push((control, address, data.to_vec()));
            self.pending = Some(if self.nacks_remaining > 0 {
                self.nacks_remaining -= 1;
                EepromEvent::TxFailed
            } else {
                EepromEvent::TxComplete
            });
            Ok(())
        }

        fn start_read(&mut self, _control: u8, _address: u16, _len: usize) -> Result<(), EepromError> {
            unimplemented!("no reads in these tests")
        }

        fn poll(&mut self, _rx_buf: &mut [u8]) -> Option<EepromEvent> {
            self.pending.take()
        }
    }

    /// All keys released (active low): every bit set.
    fn idle_frame() -> [u8; SCAN_FRAME_LEN] {
        [0xFF; SCAN_FRAME_LEN]
    }

    /// Clear the active-low bit for a key index.
    fn press(frame: &mut [u8; SCAN_FRAME_LEN], index: usize) {
        frame[1 + index / 8] &= !(1 << (index % 8));
    }

    fn warmed_up_keys() -> (NyanKeys, Eeprom, MockEepromBus) {
        let mut keys = NyanKeys::new(false);
        let mut eeprom = Eeprom::new(false, false);
        let mut bus = MockEepromBus::new();
        for _ in 0..WARMUP_READS {
            keys.on_scan_complete(&idle_frame(), &mut eeprom, &mut bus);
        }
        (keys, eeprom, bus)
    }

    #[test]
    fn test_issue_scan_only_once_outstanding() {
        let mut keys = NyanKeys::new(false);
        let mut bus = MockKeysBus {
            transfers: 0,
            fail: false,
        };
        keys.issue_scan(&mut bus);
        keys.issue_scan(&mut bus);
        assert_eq!(bus.transfers, 1);
    }

    #[test]
    fn test_failed_transfer_clears_inflight_for_retry() {
        let mut keys = NyanKeys::new(false);
        let mut bus = MockKeysBus {
            transfers: 0,
            fail: true,
        };
        keys.issue_scan(&mut bus);
        bus.fail = false;
        keys.issue_scan(&mut bus);
        assert_eq!(bus.transfers, 1);
    }

    #[test]
    fn test_warmup_gates_rendering() {
        let mut keys = NyanKeys::new(false);
        let mut eeprom = Eeprom::new(false, false);
        let mut bus = MockEepromBus::new();
        let mut frame = idle_frame();
        press(&mut frame, 15); // held the whole time

        // The first N-1 completions never render, whatever the bitmap.
        for _ in 0..WARMUP_READS - 1 {
            assert!(keys.on_scan_complete(&frame, &mut eeprom, &mut bus).is_none());
        }
        // The Nth completion renders (bitmap differs from the shadow).
        let report = keys.on_scan_complete(&frame, &mut eeprom, &mut bus).unwrap();
        assert_eq!(report.boot_keys[0], kc::Q);
    }

    #[test]
    fn test_unchanged_bitmap_renders_nothing() {
        let (mut keys, mut eeprom, mut bus) = warmed_up_keys();
        let mut frame = idle_frame();
        press(&mut frame, 29); // A
        assert!(keys.on_scan_complete(&frame, &mut eeprom, &mut bus).is_some());
        // Identical frame: shadow matches, no render, no transport call.
        assert!(keys.on_scan_complete(&frame, &mut eeprom, &mut bus).is_none());
    }

    #[test]
    fn test_seven_keys_overflow_boot_array() {
        let (mut keys, mut eeprom, mut bus) = warmed_up_keys();
        let mut frame = idle_frame();
        // Q W E R T Y U: seven non-modifier keys.
        for index in 15..22 {
            press(&mut frame, index);
        }
        let report = keys.on_scan_complete(&frame, &mut eeprom, &mut bus).unwrap();
        assert_eq!(
            report.boot_keys,
            [kc::Q, kc::W, kc::E, kc::R, kc::T, kc::Y]
        );
        // Seventh key lands in the extended array, not past the boot one.
        assert_eq!(report.ext_keys[0], kc::U);
    }

    #[test]
    fn test_modifier_sets_mask_and_boot_slot() {
        let (mut keys, mut eeprom, mut bus) = warmed_up_keys();
        let mut frame = idle_frame();
        press(&mut frame, 41); // LShift
        press(&mut frame, 29); // A
        let report = keys.on_scan_complete(&frame, &mut eeprom, &mut bus).unwrap();
        assert_eq!(report.modifiers, modifier::LSHIFT);
        assert_eq!(report.boot_keys[0], kc::LSHIFT);
        assert_eq!(report.boot_keys[1], kc::A);
    }

    #[test]
    fn test_fn_layer_substitution() {
        let (mut keys, mut eeprom, mut bus) = warmed_up_keys();
        let mut frame = idle_frame();
        press(&mut frame, FN_KEY);
        press(&mut frame, 1); // 1 -> F1 on the Fn layer
        let report = keys.on_scan_complete(&frame, &mut eeprom, &mut bus).unwrap();
        assert_eq!(report.boot_keys[0], kc::F1);
        // Fn itself is never emitted.
        assert_eq!(report.boot_keys[1], 0);
    }

    #[test]
    fn test_fn_super_toggles_and_persists_disable() {
        let (mut keys, mut eeprom, mut bus) = warmed_up_keys();
        let mut frame = idle_frame();
        press(&mut frame, FN_KEY);
        press(&mut frame, SUPER_KEY);
        keys.on_scan_complete(&frame, &mut eeprom, &mut bus);
        assert!(keys.super_key_disabled);
        assert_eq!(bus.writes.len(), 1);
        assert_eq!(bus.writes[0].1, ADDR_SUPER_KEY_DISABLE);
        assert_eq!(bus.writes[0].2, vec![1]);

        // Releasing and pressing again toggles back.
        let released = idle_frame();
        keys.on_scan_complete(&released, &mut eeprom, &mut bus);
        keys.on_scan_complete(&frame, &mut eeprom, &mut bus);
        assert!(!keys.super_key_disabled);
        assert_eq!(bus.writes.len(), 2);
        assert_eq!(bus.writes[1].2, vec![0]);
    }

    #[test]
    fn test_super_key_persist_retries_nack() {
        let (mut keys, mut eeprom, mut bus) = warmed_up_keys();
        bus.nacks_remaining = 1;
        let mut frame = idle_frame();
        press(&mut frame, FN_KEY);
        press(&mut frame, SUPER_KEY);
        keys.on_scan_complete(&frame, &mut eeprom, &mut bus);

        // NACKed flag write goes again unchanged, and the driver is free.
        assert_eq!(bus.writes.len(), 2);
        assert_eq!(bus.writes[0].2, bus.writes[1].2);
        assert_eq!(bus.writes[1].2, vec![1]);
        assert!(!eeprom.tx_inflight);
        assert!(!eeprom.tx_failed);
    }

    #[test]
    fn test_disabled_super_key_not_reported() {
        let (mut keys, mut eeprom, mut bus) = warmed_up_keys();
        keys.super_key_disabled = true;
        let mut frame = idle_frame();
        press(&mut frame, SUPER_KEY);
        let report = keys.on_scan_complete(&frame, &mut eeprom, &mut bus).unwrap();
        assert_eq!(report.modifiers, 0);
        assert_eq!(report.boot_keys[0], 0);
    }
}
