//! Nyan Keys firmware for the STM32F767.
//!
//! Cooperative super-loop: service USB, keep the FPGA configured, run one
//! key scan at a time, and drive the NyanOS shell off millisecond ticks.
//! The optional bitcoin miner burns whatever loop time is left over.

#![no_std]
#![no_main]

mod board;
mod usb;

extern crate alloc;

use core::fmt::Write as _;
use core::panic::PanicInfo;
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m_rt::{entry, exception};
use embedded_alloc::Heap;
use stm32f7::stm32f7x7::Peripherals;
use usb_device::UsbError;
use usbd_serial::SerialPort;

use nyanos::bitcoin::NyanBitcoin;
use nyanos::eeprom::Eeprom;
use nyanos::eeprom_map::{ADDR_SUPER_KEY_DISABLE, SIZE_SUPER_KEY_DISABLE};
use nyanos::fpga::LatticeIceHx;
use nyanos::keys::NyanKeys;
use nyanos::shell::{CdcPort, NyanOs};

#[global_allocator]
static HEAP: Heap = Heap::empty();

/// Heap for the shell's output/capture buffers and the compressed
/// bitstream image; sized for the worst case of all three at once.
const HEAP_SIZE: usize = 96 * 1024;

const CORE_HZ: u32 = 216_000_000;

/// Shell cadence in milliseconds.
const SHELL_TICK_MS: u32 = 20;
/// Welcome guard cadence.
const GUARD_TICK_MS: u32 = 200;

static TICK_MS: AtomicU32 = AtomicU32::new(0);

#[exception]
fn SysTick() {
    TICK_MS.fetch_add(1, Ordering::Relaxed);
}

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

/// Shell output adapter over the CDC class. The class keeps its own
/// endpoint buffer, so a chunk counts as complete once handed over.
struct SerialTx<'a> {
    serial: &'a mut SerialPort<'static, usb::Bus>,
}

impl CdcPort for SerialTx<'_> {
    fn transmit(&mut self, data: &[u8]) {
        let mut offset = 0;
        let mut stalls = 0;
        while offset < data.len() {
            match self.serial.write(&data[offset..]) {
                Ok(n) => offset += n,
                Err(UsbError::WouldBlock) => {
                    stalls += 1;
                    if stalls > 10_000 {
                        // Host stopped draining; drop the rest.
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    }
}

/// True once per period, rearming `deadline` on the way through.
fn tick_due(now: u32, deadline: &mut u32, period: u32) -> bool {
    if now.wrapping_sub(*deadline) < u32::MAX / 2 {
        *deadline = now.wrapping_add(period);
        true
    } else {
        false
    }
}

#[entry]
fn main() -> ! {
    unsafe { HEAP.init(cortex_m_rt::heap_start() as usize, HEAP_SIZE) }

    let dp = unsafe { Peripherals::steal() };
    let cp = unsafe { cortex_m::Peripherals::steal() };
    board::init(&dp);

    // 1 ms system tick.
    let mut syst = cp.SYST;
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(CORE_HZ / 1000 - 1);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();

    let mut usb = usb::init(usb::UsbOtg);
    let mut eeprom_bus = board::EepromI2c::new(&dp.I2C1);
    let mut eeprom = Eeprom::new(false, false);
    let mut keys_bus = board::KeysSpi::new(&dp.SPI2, &dp.GPIOB);
    let mut fpga_port = board::FpgaPins::new(&dp.SPI4, &dp.GPIOE, cp.SCB, cp.CPUID);
    let mut fpga = LatticeIceHx::new();
    let mut shell = NyanOs::new();
    let mut miner = NyanBitcoin::new();
    let mut ports = board::BoardPorts::new(&dp.GPIOD);

    // Restore the persisted super-key suppression before the first scan.
    let super_disabled = eeprom
        .read_blocking(&mut eeprom_bus, false, ADDR_SUPER_KEY_DISABLE, SIZE_SUPER_KEY_DISABLE)
        .map(|record| record[0] == 1)
        .unwrap_or(false);
    let mut keys = NyanKeys::new(super_disabled);

    let mut was_connected = false;
    let mut shell_deadline = 0u32;
    let mut guard_deadline = 0u32;
    let mut second_deadline = 0u32;

    loop {
        if usb.device.poll(&mut [&mut usb.serial, &mut usb.hid]) {
            let mut buf = [0u8; 64];
            if let Ok(n) = usb.serial.read(&mut buf) {
                shell.add_input_buffer(&buf[..n]);
            }
        }
        let connected = usb.serial.dtr();
        if connected && !was_connected {
            shell.on_connect();
        }
        was_connected = connected;

        // Reconfigure whenever the image is stale (boot, or after an
        // upload cleared the flag). Failure retries next pass.
        if !fpga.configured {
            let _ = fpga.configure(&mut eeprom, &mut eeprom_bus, &mut fpga_port);
        }

        if fpga.configured {
            keys.issue_scan(&mut keys_bus);
            if let Some(frame) = keys_bus.take_frame() {
                if let Some(report) = keys.on_scan_complete(&frame, &mut eeprom, &mut eeprom_bus) {
                    let _ = usb.hid.push_raw_input(&report.as_bytes());
                }
            }
        }

        let now = TICK_MS.load(Ordering::Relaxed);
        if tick_due(now, &mut shell_deadline, SHELL_TICK_MS) {
            shell.welcome_display();
            shell.execute(&mut eeprom, &mut eeprom_bus, &mut fpga, &mut miner, &keys, &mut ports);
            let mut tx = SerialTx {
                serial: &mut usb.serial,
            };
            shell.cdc_tx(&mut tx);
            shell.on_tx_complete();
        }
        if tick_due(now, &mut guard_deadline, GUARD_TICK_MS) {
            shell.welcome_guard_tick();
        }
        if tick_due(now, &mut second_deadline, 1000) {
            keys.on_second_elapsed();
        }

        if let Some(digest) = miner.hash_iteration() {
            let mut line = alloc::string::String::new();
            let _ = write!(line, "Nyan BitCoin Miner candidate found: ");
            for byte in digest {
                let _ = write!(line, "{:02x}", byte);
            }
            line.push_str("\r\n");
            shell.print(line.as_bytes());
        }
    }
}
