//! Board support for the Nyan Keys STM32F767 PCB: bus drivers behind the
//! nyanos hardware traits, pin bring-up, and the DFU reboot hook.
//!
//! Peripheral map: I2C1 (PB8/PB9) to the 24xx EEPROM, SPI2 (PB13..PB15,
//! PB12 as soft SS) to the FPGA key-scan IP, SPI4 (PE2/PE6) plus PE3
//! CRESET / PE4 SS / PE5 CDONE for FPGA configuration.

use cortex_m::peripheral::{CPUID, SCB};
use stm32f7::stm32f7x7::{GPIOB, GPIOD, GPIOE, I2C1, Peripherals, SPI2, SPI4};

use nyanos::eeprom::{EepromBus, EepromError, EepromEvent, RX_BUF_SIZE};
use nyanos::fpga::FpgaPort;
use nyanos::ice::ConfigPort;
use nyanos::keys::{KeysBus, KeysError, SCAN_FRAME_LEN};
use nyanos::shell::ShellPorts;

/// AHB clock in MHz, for busy-wait delays.
const AHB_MHZ: u32 = 216;

/// Spin budget for SPI flag waits.
const SPI_SPIN_LIMIT: u32 = 100_000;

/// DFU latch charge time. The BOOT0 capacitor has to charge through the
/// latch resistor before the ROM loader samples it across the reset.
const DFU_CHARGE_DELAY_US: u32 = 100_000;

// I2C ISR/ICR bits (RM0385).
const I2C_ISR_TXIS: u32 = 1 << 1;
const I2C_ISR_RXNE: u32 = 1 << 2;
const I2C_ISR_NACKF: u32 = 1 << 4;
const I2C_ISR_STOPF: u32 = 1 << 5;
const I2C_ISR_TC: u32 = 1 << 6;
const I2C_CR2_RD_WRN: u32 = 1 << 10;
const I2C_CR2_START: u32 = 1 << 13;
const I2C_CR2_AUTOEND: u32 = 1 << 25;

// SPI SR bits.
const SPI_SR_RXNE: u32 = 1 << 0;
const SPI_SR_TXE: u32 = 1 << 1;
const SPI_SR_BSY: u32 = 1 << 7;

/// Clock and pin bring-up. The core runs on the 16 MHz HSI raised to
/// 216 MHz by the main PLL; the 48 MHz USB clock comes from PLLQ.
pub fn init(dp: &Peripherals) {
    let rcc = &dp.RCC;
    let flash = &dp.FLASH;

    // PLL: HSI/8 * 216 / 2 = 216 MHz SYSCLK, /9 = 48 MHz PLLQ.
    rcc.pllcfgr.write(|w| unsafe {
        w.bits((9 << 24) | (0 << 16) | (216 << 6) | 8)
    });
    rcc.cr.modify(|_, w| w.pllon().set_bit());
    while rcc.cr.read().pllrdy().bit_is_clear() {}

    // 7 wait states before switching to 216 MHz.
    flash.acr.modify(|_, w| unsafe { w.latency().bits(7) });
    // APB1 /4, APB2 /2, then SYSCLK from PLL.
    rcc.cfgr.write(|w| unsafe { w.bits((0b101 << 13) | (0b100 << 10) | 0b10) });
    while rcc.cfgr.read().sws().bits() != 0b10 {}

    // Peripheral clocks: GPIOB/D/E, I2C1, SPI2, SPI4.
    rcc.ahb1enr.modify(|r, w| unsafe { w.bits(r.bits() | (1 << 1) | (1 << 3) | (1 << 4)) });
    rcc.apb1enr.modify(|r, w| unsafe { w.bits(r.bits() | (1 << 21) | (1 << 14)) });
    rcc.apb2enr.modify(|r, w| unsafe { w.bits(r.bits() | (1 << 13)) });

    // GPIOB: PB8/PB9 AF4 open-drain (I2C1), PB13..PB15 AF5 (SPI2),
    // PB12 output (scan SS, idle high).
    dp.GPIOB.moder.modify(|r, w| unsafe {
        let mut bits = r.bits();
        bits &= !(0b11 << 16 | 0b11 << 18 | 0b11 << 24 | 0b11 << 26 | 0b11 << 28 | 0b11 << 30);
        bits |= 0b10 << 16 | 0b10 << 18; // PB8/PB9 AF
        bits |= 0b01 << 24; // PB12 output
        bits |= 0b10 << 26 | 0b10 << 28 | 0b10 << 30; // PB13..PB15 AF
        w.bits(bits)
    });
    dp.GPIOB.otyper.modify(|r, w| unsafe { w.bits(r.bits() | (1 << 8) | (1 << 9)) });
    dp.GPIOB.afrh.modify(|r, w| unsafe {
        let mut bits = r.bits();
        bits &= !(0xF | (0xF << 4) | (0xF << 20) | (0xF << 24) | (0xF << 28));
        bits |= 4 | (4 << 4); // PB8/PB9 AF4
        bits |= (5 << 20) | (5 << 24) | (5 << 28); // PB13..PB15 AF5
        w.bits(bits)
    });
    dp.GPIOB.bsrr.write(|w| unsafe { w.bits(1 << 12) }); // SS high

    // GPIOE: PE2/PE6 AF5 (SPI4), PE3/PE4 outputs, PE5 input (CDONE).
    dp.GPIOE.moder.modify(|r, w| unsafe {
        let mut bits = r.bits();
        bits &= !(0b11 << 4 | 0b11 << 6 | 0b11 << 8 | 0b11 << 10 | 0b11 << 12);
        bits |= 0b10 << 4 | 0b10 << 12; // PE2/PE6 AF
        bits |= 0b01 << 6 | 0b01 << 8; // PE3/PE4 outputs
        w.bits(bits)
    });
    dp.GPIOE.afrl.modify(|r, w| unsafe {
        let mut bits = r.bits();
        bits &= !((0xF << 8) | (0xF << 24));
        bits |= (5 << 8) | (5 << 24);
        w.bits(bits)
    });
    dp.GPIOE.bsrr.write(|w| unsafe { w.bits((1 << 3) | (1 << 4)) });

    // GPIOD: PD5 output, low (DFU latch discharged).
    dp.GPIOD.moder.modify(|r, w| unsafe {
        w.bits((r.bits() & !(0b11 << 10)) | (0b01 << 10))
    });
    dp.GPIOD.bsrr.write(|w| unsafe { w.bits(1 << (5 + 16)) });

    // I2C1 at 400 kHz from the 54 MHz APB1 clock (RM0385 table value).
    dp.I2C1.timingr.write(|w| unsafe { w.bits(0x6000_030D) });
    dp.I2C1.cr1.modify(|_, w| w.pe().set_bit());

    // SPI2/SPI4: master, mode 0, software SS, fPCLK/8.
    let spi_cr1 = (1 << 2) | (0b010 << 3) | (1 << 9) | (1 << 8) | (1 << 6);
    dp.SPI2.cr1.write(|w| unsafe { w.bits(spi_cr1) });
    dp.SPI2.cr2.write(|w| unsafe { w.bits(0b0111 << 8 | (1 << 12)) }); // 8-bit, FRXTH
    dp.SPI4.cr1.write(|w| unsafe { w.bits(spi_cr1) });
    dp.SPI4.cr2.write(|w| unsafe { w.bits(0b0111 << 8 | (1 << 12)) });
}

/// 8-bit data register access; a 16-bit write would pack two frames.
fn spi_write_dr8(dr: *mut u32, byte: u8) {
    unsafe { core::ptr::write_volatile(dr as *mut u8, byte) }
}

fn spi_read_dr8(dr: *const u32) -> u8 {
    unsafe { core::ptr::read_volatile(dr as *const u8) }
}

// ---- EEPROM over I2C1 ----

/// The transfer engine behind the storage driver. Transfers run to
/// completion inside `start_*`; the completion event is handed back on
/// the next `poll`, which preserves the driver's event contract.
pub struct EepromI2c<'a> {
    i2c: &'a I2C1,
    rx: [u8; RX_BUF_SIZE],
    rx_len: usize,
    event: Option<EepromEvent>,
}

impl<'a> EepromI2c<'a> {
    pub fn new(i2c: &'a I2C1) -> Self {
        Self {
            i2c,
            rx: [0; RX_BUF_SIZE],
            rx_len: 0,
            event: None,
        }
    }

    fn wait_flag(&self, mask: u32) -> Result<u32, ()> {
        loop {
            let isr = self.i2c.isr.read().bits();
            if isr & I2C_ISR_NACKF != 0 {
                self.i2c.icr.write(|w| unsafe { w.bits(I2C_ISR_NACKF | I2C_ISR_STOPF) });
                return Err(());
            }
            if isr & mask != 0 {
                return Ok(isr);
            }
        }
    }

    fn transfer_write(&mut self, control: u8, address: u16, data: &[u8]) -> Result<(), ()> {
        let nbytes = (data.len() + 2) as u32;
        self.i2c.cr2.write(|w| unsafe {
            w.bits(control as u32 | (nbytes << 16) | I2C_CR2_START | I2C_CR2_AUTOEND)
        });
        for byte in [(address >> 8) as u8, address as u8]
            .into_iter()
            .chain(data.iter().copied())
        {
            self.wait_flag(I2C_ISR_TXIS)?;
            self.i2c.txdr.write(|w| unsafe { w.bits(byte as u32) });
        }
        self.wait_flag(I2C_ISR_STOPF)?;
        self.i2c.icr.write(|w| unsafe { w.bits(I2C_ISR_STOPF) });
        Ok(())
    }

    fn transfer_read(&mut self, control: u8, address: u16, len: usize) -> Result<(), ()> {
        // Address phase, no autoend so the read restarts instead of stops.
        self.i2c
            .cr2
            .write(|w| unsafe { w.bits(control as u32 | (2 << 16) | I2C_CR2_START) });
        for byte in [(address >> 8) as u8, address as u8] {
            self.wait_flag(I2C_ISR_TXIS)?;
            self.i2c.txdr.write(|w| unsafe { w.bits(byte as u32) });
        }
        self.wait_flag(I2C_ISR_TC)?;

        self.i2c.cr2.write(|w| unsafe {
            w.bits(control as u32 | ((len as u32) << 16) | I2C_CR2_RD_WRN | I2C_CR2_START | I2C_CR2_AUTOEND)
        });
        for slot in self.rx[..len].iter_mut() {
            loop {
                let isr = self.i2c.isr.read().bits();
                if isr & I2C_ISR_RXNE != 0 {
                    break;
                }
            }
            *slot = self.i2c.rxdr.read().bits() as u8;
        }
        self.wait_flag(I2C_ISR_STOPF)?;
        self.i2c.icr.write(|w| unsafe { w.bits(I2C_ISR_STOPF) });
        self.rx_len = len;
        Ok(())
    }
}

impl EepromBus for EepromI2c<'_> {
    fn start_write(&mut self, control: u8, address: u16, data: &[u8]) -> Result<(), EepromError> {
        self.event = Some(match self.transfer_write(control, address, data) {
            Ok(()) => EepromEvent::TxComplete,
            Err(()) => EepromEvent::TxFailed,
        });
        Ok(())
    }

    fn start_read(&mut self, control: u8, address: u16, len: usize) -> Result<(), EepromError> {
        match self.transfer_read(control, address, len) {
            Ok(()) => {
                self.event = Some(EepromEvent::RxComplete);
                Ok(())
            }
            Err(()) => Err(EepromError::BusFault),
        }
    }

    fn poll(&mut self, rx_buf: &mut [u8]) -> Option<EepromEvent> {
        let event = self.event.take();
        if event == Some(EepromEvent::RxComplete) {
            rx_buf[..self.rx_len].copy_from_slice(&self.rx[..self.rx_len]);
        }
        event
    }
}

// ---- key scan over SPI2 ----

pub struct KeysSpi<'a> {
    spi: &'a SPI2,
    gpio: &'a GPIOB,
    frame: Option<[u8; SCAN_FRAME_LEN]>,
}

impl<'a> KeysSpi<'a> {
    pub fn new(spi: &'a SPI2, gpio: &'a GPIOB) -> Self {
        Self {
            spi,
            gpio,
            frame: None,
        }
    }

    /// Completed scan frame, if one arrived since the last call.
    pub fn take_frame(&mut self) -> Option<[u8; SCAN_FRAME_LEN]> {
        self.frame.take()
    }

    fn xfer(&self, byte: u8) -> Result<u8, KeysError> {
        let mut spins = 0;
        while self.spi.sr.read().bits() & SPI_SR_TXE == 0 {
            spins += 1;
            if spins > SPI_SPIN_LIMIT {
                return Err(KeysError::TransferFailed);
            }
        }
        spi_write_dr8(self.spi.dr.as_ptr(), byte);
        while self.spi.sr.read().bits() & SPI_SR_RXNE == 0 {
            spins += 1;
            if spins > SPI_SPIN_LIMIT {
                return Err(KeysError::TransferFailed);
            }
        }
        Ok(spi_read_dr8(self.spi.dr.as_ptr()))
    }
}

impl KeysBus for KeysSpi<'_> {
    fn start_transfer(&mut self, tx: &[u8; SCAN_FRAME_LEN]) -> Result<(), KeysError> {
        let mut rx = [0u8; SCAN_FRAME_LEN];
        self.gpio.bsrr.write(|w| unsafe { w.bits(1 << (12 + 16)) }); // SS low
        let mut result = Ok(());
        for (slot, &byte) in rx.iter_mut().zip(tx.iter()) {
            match self.xfer(byte) {
                Ok(value) => *slot = value,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.gpio.bsrr.write(|w| unsafe { w.bits(1 << 12) }); // SS high
        if result.is_ok() {
            self.frame = Some(rx);
        }
        result
    }
}

// ---- FPGA configuration over SPI4 ----

pub struct FpgaPins<'a> {
    spi: &'a SPI4,
    gpio: &'a GPIOE,
    scb: SCB,
    cpuid: CPUID,
}

impl<'a> FpgaPins<'a> {
    pub fn new(spi: &'a SPI4, gpio: &'a GPIOE, scb: SCB, cpuid: CPUID) -> Self {
        Self {
            spi,
            gpio,
            scb,
            cpuid,
        }
    }
}

impl ConfigPort for FpgaPins<'_> {
    fn send_byte(&mut self, byte: u8) {
        while self.spi.sr.read().bits() & SPI_SR_TXE == 0 {}
        spi_write_dr8(self.spi.dr.as_ptr(), byte);
        // Drain the unused receive side so OVR never latches.
        if self.spi.sr.read().bits() & SPI_SR_RXNE != 0 {
            let _ = spi_read_dr8(self.spi.dr.as_ptr());
        }
    }
}

impl FpgaPort for FpgaPins<'_> {
    fn set_reset(&mut self, level: bool) {
        let bit = if level { 1 << 3 } else { 1 << (3 + 16) };
        self.gpio.bsrr.write(|w| unsafe { w.bits(bit) });
    }

    fn set_cs(&mut self, level: bool) {
        while self.spi.sr.read().bits() & SPI_SR_BSY != 0 {}
        let bit = if level { 1 << 4 } else { 1 << (4 + 16) };
        self.gpio.bsrr.write(|w| unsafe { w.bits(bit) });
    }

    fn config_done(&mut self) -> bool {
        self.gpio.idr.read().bits() & (1 << 5) != 0
    }

    fn delay_us(&mut self, us: u32) {
        cortex_m::asm::delay(us * AHB_MHZ);
    }

    fn dcache_disable(&mut self) {
        self.scb.disable_dcache(&mut self.cpuid);
    }

    fn dcache_enable(&mut self) {
        self.scb.enable_dcache(&mut self.cpuid);
    }
}

// ---- shell board hooks ----

pub struct BoardPorts<'a> {
    gpio: &'a GPIOD,
}

impl<'a> BoardPorts<'a> {
    pub fn new(gpio: &'a GPIOD) -> Self {
        Self { gpio }
    }
}

impl ShellPorts for BoardPorts<'_> {
    fn enter_dfu(&mut self) {
        // Charge the BOOT0 capacitor through the DFU latch on PD5; the
        // ROM loader samples it across the reset and lands in DFU.
        self.gpio.bsrr.write(|w| unsafe { w.bits(1 << 5) });
        cortex_m::asm::delay(DFU_CHARGE_DELAY_US * AHB_MHZ);
        SCB::sys_reset();
    }
}
