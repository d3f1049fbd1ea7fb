//! Polled BCM2835 mini UART (UART1) on GPIO 14/15 at 115200 8N1.

use core::hint::spin_loop;
use kernel_info::memory::{AUX_MU_IO_REG, AUX_MU_LSR_REG, GPIO_BASE};
use kernel_memory_addresses::PhysicalAddress;

const AUX_ENABLES: u32 = 0x2021_5004;
const AUX_MU_IIR_REG: u32 = 0x2021_5048;
const AUX_MU_LCR_REG: u32 = 0x2021_504C;
const AUX_MU_CNTL_REG: u32 = 0x2021_5060;
const AUX_MU_BAUD_REG: u32 = 0x2021_5068;

const AUX_ENABLE_MINI_UART: u32 = 1;
const LSR_RX_READY: u32 = 1 << 0;
const LSR_TX_EMPTY: u32 = 1 << 5;
const CNTL_RX_ENABLE: u32 = 1 << 0;
const CNTL_TX_ENABLE: u32 = 1 << 1;
const IIR_CLEAR_FIFOS: u32 = 0b11 << 1;
/// Both low bits must be set for 8-bit mode, contrary to the datasheet.
const LCR_8BIT: u32 = 0b11;
/// `250 MHz / (8 * (270 + 1))` is within 0.2% of 115200 baud.
const BAUD_115200: u32 = 270;

const TX_PIN: u32 = 14;
const RX_PIN: u32 = 15;
const GPIO_FUNC_ALT5: u32 = 0b010;

/// Register access the UART driver is written against.
pub trait RegisterBus {
    fn read32(&mut self, addr: PhysicalAddress) -> u32;
    fn write32(&mut self, addr: PhysicalAddress, value: u32);
    /// Orders accesses when switching from one peripheral to another.
    fn device_barrier(&mut self);
}

/// The real device registers.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// # Safety
    /// The peripheral window must be accessible: the MMU is off, or the
    /// peripheral sections are mapped as device memory.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl RegisterBus for Mmio {
    fn read32(&mut self, addr: PhysicalAddress) -> u32 {
        unsafe { kernel_registers::mmio::read32(addr) }
    }

    fn write32(&mut self, addr: PhysicalAddress, value: u32) {
        unsafe { kernel_registers::mmio::write32(addr, value) }
    }

    fn device_barrier(&mut self) {
        #[cfg(target_arch = "arm")]
        unsafe {
            kernel_registers::cache::data_memory_barrier();
            kernel_registers::cache::data_sync_barrier();
        }
        #[cfg(not(target_arch = "arm"))]
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    }
}

pub struct MiniUart<B: RegisterBus> {
    bus: B,
}

impl<B: RegisterBus> MiniUart<B> {
    pub const fn new(bus: B) -> Self {
        Self { bus }
    }

    pub const fn bus(&self) -> &B {
        &self.bus
    }

    /// Routes GPIO 14/15 to the UART and configures 115200 8N1 with cleared
    /// FIFOs. Transmit and receive are off while the registers change.
    pub fn init(&mut self) {
        self.bus.device_barrier();
        self.set_function(TX_PIN, GPIO_FUNC_ALT5);
        self.set_function(RX_PIN, GPIO_FUNC_ALT5);
        self.bus.device_barrier();

        self.modify(AUX_ENABLES, |v| v | AUX_ENABLE_MINI_UART);
        self.bus.device_barrier();

        self.modify(AUX_MU_CNTL_REG, |v| v & !(CNTL_TX_ENABLE | CNTL_RX_ENABLE));
        self.write(AUX_MU_BAUD_REG, BAUD_115200);
        self.modify(AUX_MU_LCR_REG, |v| v | LCR_8BIT);
        self.modify(AUX_MU_IIR_REG, |v| v | IIR_CLEAR_FIFOS);
        self.modify(AUX_MU_CNTL_REG, |v| v | CNTL_TX_ENABLE | CNTL_RX_ENABLE);
        self.bus.device_barrier();
    }

    /// Blocks until the transmitter is free, then sends `byte`.
    pub fn putc(&mut self, byte: u8) {
        while self.read(AUX_MU_LSR_REG) & LSR_TX_EMPTY == 0 {
            spin_loop();
        }
        self.write(AUX_MU_IO_REG, u32::from(byte));
    }

    /// Blocks until a byte has been received.
    pub fn getc(&mut self) -> u8 {
        while self.read(AUX_MU_LSR_REG) & LSR_RX_READY == 0 {
            spin_loop();
        }
        self.read(AUX_MU_IO_REG).to_le_bytes()[0]
    }

    /// [`putc`](Self::putc) with `\n` expanded to `\r\n` for terminals.
    pub fn write_byte(&mut self, byte: u8) {
        if byte == b'\n' {
            self.putc(b'\r');
        }
        self.putc(byte);
    }

    fn set_function(&mut self, pin: u32, function: u32) {
        let select = GPIO_BASE + 4 * (pin / 10);
        let shift = (pin % 10) * 3;
        self.modify(select, |v| (v & !(0b111 << shift)) | (function << shift));
    }

    fn read(&mut self, addr: u32) -> u32 {
        self.bus.read32(PhysicalAddress::new(addr))
    }

    fn write(&mut self, addr: u32, value: u32) {
        self.bus.write32(PhysicalAddress::new(addr), value);
    }

    fn modify(&mut self, addr: u32, f: impl FnOnce(u32) -> u32) {
        let value = self.read(addr);
        self.write(addr, f(value));
    }
}
