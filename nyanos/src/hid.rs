//! HID keyboard report for the Nyan Keys composite device.
//!
//! The report is a fixed 62-byte layout: one modifier byte, one reserved
//! byte, six boot-compatible key slots, and 54 extended key slots. Two
//! fill cursors advance monotonically during a render pass; a key that
//! finds both arrays full is rejected per-key rather than overwriting
//! anything.

/// Boot-compatible key slots (fixed by the boot protocol).
pub const BOOT_KEYS: usize = 6;
/// Extended key slots: total HID key budget minus the boot budget.
pub const EXT_KEYS: usize = 54;
/// Total report length on the wire.
pub const REPORT_LEN: usize = 2 + BOOT_KEYS + EXT_KEYS;

/// Returned when a render pass has more simultaneous keys than slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportFull;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidReport {
    pub modifiers: u8,
    reserved: u8,
    pub boot_keys: [u8; BOOT_KEYS],
    pub ext_keys: [u8; EXT_KEYS],
    boot_cursor: usize,
    ext_cursor: usize,
}

impl HidReport {
    pub const fn new() -> Self {
        Self {
            modifiers: 0,
            reserved: 0,
            boot_keys: [0; BOOT_KEYS],
            ext_keys: [0; EXT_KEYS],
            boot_cursor: 0,
            ext_cursor: 0,
        }
    }

    pub fn set_modifier(&mut self, mask: u8) {
        self.modifiers |= mask;
    }

    /// Place a key code in the next free slot: boot array first, then the
    /// extended array. Fails per-key when everything is full.
    pub fn push_key(&mut self, code: u8) -> Result<(), ReportFull> {
        if self.boot_cursor < BOOT_KEYS {
            self.boot_keys[self.boot_cursor] = code;
            self.boot_cursor += 1;
            Ok(())
        } else if self.ext_cursor < EXT_KEYS {
            self.ext_keys[self.ext_cursor] = code;
            self.ext_cursor += 1;
            Ok(())
        } else {
            Err(ReportFull)
        }
    }

    /// Serialize to the fixed wire layout.
    pub fn as_bytes(&self) -> [u8; REPORT_LEN] {
        let mut out = [0u8; REPORT_LEN];
        out[0] = self.modifiers;
        out[1] = self.reserved;
        out[2..2 + BOOT_KEYS].copy_from_slice(&self.boot_keys);
        out[2 + BOOT_KEYS..].copy_from_slice(&self.ext_keys);
        out
    }
}

impl Default for HidReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_then_extended_fill_order() {
        let mut report = HidReport::new();
        for code in 1..=8u8 {
            report.push_key(code).unwrap();
        }
        assert_eq!(report.boot_keys, [1, 2, 3, 4, 5, 6]);
        assert_eq!(report.ext_keys[0], 7);
        assert_eq!(report.ext_keys[1], 8);
    }

    #[test]
    fn test_overflow_rejected_per_key() {
        let mut report = HidReport::new();
        for code in 0..(BOOT_KEYS + EXT_KEYS) as u8 {
            report.push_key(code + 1).unwrap();
        }
        assert_eq!(report.push_key(0x99), Err(ReportFull));
        // Nothing was overwritten.
        assert_eq!(report.ext_keys[EXT_KEYS - 1], (BOOT_KEYS + EXT_KEYS) as u8);
    }

    #[test]
    fn test_wire_layout() {
        let mut report = HidReport::new();
        report.set_modifier(0x02);
        report.push_key(0x04).unwrap();
        let bytes = report.as_bytes();
        assert_eq!(bytes.len(), 62);
        assert_eq!(bytes[0], 0x02);
        assert_eq!(bytes[1], 0x00);
        assert_eq!(bytes[2], 0x04);
        assert_eq!(bytes[8], 0x00);
    }
}
