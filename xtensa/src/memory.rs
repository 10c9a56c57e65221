//! Byte access to target memory for the debugger.
//!
//! Everything goes through aligned 32 bit words since parts of the lx106
//! address space (IRAM, flash cache) fault on narrower loads and stores.
//! Addresses outside the window read as 0xff and swallow writes. Inside the
//! window there is no protection, reading a peripheral register through
//! here has the same side effects as reading it from code.

use core::ops::Range;

pub trait WordBus {
    /// `addr` is always 4 byte aligned.
    fn read_word(&mut self, addr: u32) -> u32;
    /// `addr` is always 4 byte aligned.
    fn write_word(&mut self, addr: u32, value: u32);
}

/// Volatile access to the physical address space of the running core.
pub struct RawBus {
    _private: (),
}

impl RawBus {
    /// # Safety
    /// Every address inside the [`MemoryWindow`] the bus is used with must be
    /// readable and writable as a 32 bit word.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl WordBus for RawBus {
    fn read_word(&mut self, addr: u32) -> u32 {
        unsafe { core::ptr::read_volatile(addr as usize as *const u32) }
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        unsafe { core::ptr::write_volatile(addr as usize as *mut u32, value) }
    }
}

/// A block of words standing in for target RAM, used by the simulator and tests.
pub struct RamBus<'a> {
    base: u32,
    words: &'a mut [u32],
}

impl<'a> RamBus<'a> {
    pub fn new(base: u32, words: &'a mut [u32]) -> Self {
        Self { base, words }
    }

    fn index(&self, addr: u32) -> Option<usize> {
        let offset = addr.checked_sub(self.base)? as usize / 4;
        (offset < self.words.len()).then_some(offset)
    }
}

impl WordBus for RamBus<'_> {
    fn read_word(&mut self, addr: u32) -> u32 {
        match self.index(addr) {
            Some(i) => self.words[i],
            None => 0,
        }
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        if let Some(i) = self.index(addr) {
            self.words[i] = value;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryWindow(pub Range<u32>);

impl MemoryWindow {
    /// DRAM, IRAM and the flash cache of the ESP8266.
    pub const ESP8266: MemoryWindow = MemoryWindow(0x2000_0000..0x6000_0000);

    pub fn contains(&self, addr: u32) -> bool {
        self.0.contains(&addr)
    }
}

impl Default for MemoryWindow {
    fn default() -> Self {
        Self::ESP8266
    }
}

pub struct TargetMemory<B: WordBus> {
    bus: B,
    window: MemoryWindow,
}

impl<B: WordBus> TargetMemory<B> {
    pub fn new(bus: B, window: MemoryWindow) -> Self {
        Self { bus, window }
    }

    pub fn window(&self) -> &MemoryWindow {
        &self.window
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn read_byte(&mut self, addr: u32) -> u8 {
        if !self.window.contains(addr) {
            return 0xff;
        }
        let word = self.bus.read_word(addr & !3);
        (word >> lane_shift(addr)) as u8
    }

    pub fn write_byte(&mut self, addr: u32, byte: u8) {
        if !self.window.contains(addr) {
            log::debug!("dropping write outside memory window: {:#010x}", addr);
            return;
        }
        let shift = lane_shift(addr);
        let word = self.bus.read_word(addr & !3);
        let word = (word & !(0xff << shift)) | ((byte as u32) << shift);
        self.bus.write_word(addr & !3, word);
    }

    pub fn read_word(&mut self, addr: u32) -> u32 {
        if !self.window.contains(addr) {
            return 0xffff_ffff;
        }
        self.bus.read_word(addr & !3)
    }

    pub fn write_word(&mut self, addr: u32, value: u32) {
        if !self.window.contains(addr) {
            log::debug!("dropping write outside memory window: {:#010x}", addr);
            return;
        }
        self.bus.write_word(addr & !3, value)
    }
}

#[inline(always)]
fn lane_shift(addr: u32) -> u32 {
    (addr & 3) * 8
}
