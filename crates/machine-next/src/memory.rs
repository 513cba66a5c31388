//! Physical memory map.
//!
//! | Range                     | Contents                          |
//! |---------------------------|-----------------------------------|
//! | `0000_0000`–`00FF_FFFF`   | ROM (boot mirror)                 |
//! | `0100_0000`–`01FF_FFFF`   | ROM                               |
//! | `0200_0000`–`02FF_FFFF`   | device space                      |
//! | `0400_0000`–`07FF_FFFF`   | main memory                       |
//!
//! The ROM repeats through its window. Anything unmapped, including RAM
//! banks beyond the installed size and device-space holes, is a bus error.

use motorola_68040::{BusError, PhysBus};
use tracing::warn;

use crate::device::{Device, DeviceContext};
use crate::error::MachineError;
use crate::interrupts::InterruptController;
use crate::scheduler::{EventScheduler, EventSource};
use crate::timer::Hardclock;

pub const ROM_BASE: u32 = 0x0100_0000;
pub const ROM_WINDOW: u32 = 0x0100_0000;
pub const DEVICE_BASE: u32 = 0x0200_0000;
pub const DEVICE_END: u32 = 0x0300_0000;
pub const RAM_BASE: u32 = 0x0400_0000;
pub const RAM_WINDOW: u32 = 0x0400_0000;

/// Largest ROM image accepted.
pub const MAX_ROM_BYTES: usize = 0x2_0000;

const MIB: usize = 1024 * 1024;

/// Events handled in one service pass before yielding back to the CPU.
const MAX_EVENTS_PER_PASS: usize = EventSource::COUNT * 4;

/// RAM and ROM storage.
#[derive(Debug, Clone)]
pub struct Memory {
    pub ram: Vec<u8>,
    pub rom: Vec<u8>,
    rom_mask: u32,
}

impl Memory {
    pub fn new(ram_bytes: usize, rom: Vec<u8>) -> Result<Self, MachineError> {
        if rom.len() > MAX_ROM_BYTES {
            return Err(MachineError::RomTooLarge {
                len: rom.len(),
                max: MAX_ROM_BYTES,
            });
        }
        validate_ram(ram_bytes)?;
        // ROM decodes on a power-of-two boundary; the tail of a short image
        // reads as erased flash
        let span = rom.len().next_power_of_two();
        let mut rom = rom;
        if !rom.is_empty() {
            rom.resize(span, 0xFF);
        }
        Ok(Self {
            ram: vec![0; ram_bytes],
            rom,
            rom_mask: (span as u32).wrapping_sub(1),
        })
    }

    pub fn resize_ram(&mut self, ram_bytes: usize) -> Result<(), MachineError> {
        validate_ram(ram_bytes)?;
        self.ram.resize(ram_bytes, 0);
        Ok(())
    }

    fn rom_byte(&self, offset: u32) -> Option<u8> {
        self.rom.get((offset & self.rom_mask) as usize).copied()
    }

    fn ram_index(&self, address: u32) -> Option<usize> {
        let index = address.checked_sub(RAM_BASE)? as usize;
        (index < self.ram.len()).then_some(index)
    }
}

fn validate_ram(ram_bytes: usize) -> Result<(), MachineError> {
    if ram_bytes == 0 || ram_bytes % MIB != 0 || ram_bytes > RAM_WINDOW as usize {
        return Err(MachineError::InvalidRamSize(ram_bytes));
    }
    Ok(())
}

/// Which region an address falls in.
enum Region {
    Rom(u32),
    Device,
    Ram,
    Unmapped,
}

fn region(address: u32) -> Region {
    match address {
        a if a < ROM_BASE => Region::Rom(a),
        a if a < ROM_BASE + ROM_WINDOW => Region::Rom(a - ROM_BASE),
        a if (DEVICE_BASE..DEVICE_END).contains(&a) => Region::Device,
        a if (RAM_BASE..RAM_BASE + RAM_WINDOW).contains(&a) => Region::Ram,
        _ => Region::Unmapped,
    }
}

/// Everything behind the CPU's physical bus: memory, the interrupt
/// controller, the scheduler and the device bank.
pub struct NextBus {
    pub memory: Memory,
    pub interrupts: InterruptController,
    pub scheduler: EventScheduler,
    devices: Vec<Box<dyn Device>>,
    /// Host time seen by device handlers.
    now_us: u64,
}

impl NextBus {
    /// A bus with the built-in hardclock attached.
    #[must_use]
    pub fn new(memory: Memory, scheduler: EventScheduler) -> Self {
        let mut bus = Self {
            memory,
            interrupts: InterruptController::new(),
            scheduler,
            devices: Vec::new(),
            now_us: 0,
        };
        bus.attach(Box::new(Hardclock::new()));
        bus
    }

    pub fn attach(&mut self, device: Box<dyn Device>) {
        tracing::debug!(
            name = device.name(),
            start = format_args!("{:#010X}", device.range().start),
            "bus: device attached"
        );
        self.devices.push(device);
    }

    /// Return every device, the interrupt controller and the scheduler to
    /// power-on state.
    pub fn reset(&mut self) {
        self.scheduler.clear();
        self.interrupts.reset();
        for device in &mut self.devices {
            device.reset();
        }
    }

    /// Run every event that is due at host time `now_us`.
    pub fn service_events(&mut self, now_us: u64) {
        self.now_us = now_us;
        for _ in 0..MAX_EVENTS_PER_PASS {
            let Some(source) = self.scheduler.poll(now_us) else {
                return;
            };
            self.dispatch_event(source);
            if self.scheduler.firing() == Some(source) {
                warn!(?source, "scheduler: handler did not acknowledge its event");
                self.scheduler.acknowledge();
            }
        }
    }

    fn dispatch_event(&mut self, source: EventSource) {
        let Self {
            devices,
            scheduler,
            interrupts,
            now_us,
            ..
        } = self;
        let mut ctx = DeviceContext {
            scheduler,
            interrupts,
            now_us: *now_us,
        };
        match devices.iter_mut().find(|d| d.event_sources().contains(&source)) {
            Some(device) => device.on_event(source, &mut ctx),
            None => {
                warn!(?source, "scheduler: event with no owner");
                ctx.scheduler.acknowledge();
            }
        }
    }

    fn device_read(&mut self, address: u32) -> Result<u8, BusError> {
        if let Some(value) = self.interrupts.read8(address) {
            return Ok(value);
        }
        let Self {
            devices,
            scheduler,
            interrupts,
            now_us,
            ..
        } = self;
        let device = devices
            .iter_mut()
            .find(|d| d.range().contains(&address))
            .ok_or(BusError { address })?;
        let offset = address - device.range().start;
        let mut ctx = DeviceContext {
            scheduler,
            interrupts,
            now_us: *now_us,
        };
        Ok(device.read8(offset, &mut ctx))
    }

    fn device_write(&mut self, address: u32, value: u8) -> Result<(), BusError> {
        if self.interrupts.write8(address, value) {
            return Ok(());
        }
        let Self {
            devices,
            scheduler,
            interrupts,
            now_us,
            ..
        } = self;
        let device = devices
            .iter_mut()
            .find(|d| d.range().contains(&address))
            .ok_or(BusError { address })?;
        let offset = address - device.range().start;
        let mut ctx = DeviceContext {
            scheduler,
            interrupts,
            now_us: *now_us,
        };
        device.write8(offset, value, &mut ctx);
        Ok(())
    }
}

impl PhysBus for NextBus {
    fn read8(&mut self, address: u32) -> Result<u8, BusError> {
        match region(address) {
            Region::Rom(offset) => self.memory.rom_byte(offset).ok_or(BusError { address }),
            Region::Ram => self
                .memory
                .ram_index(address)
                .map(|i| self.memory.ram[i])
                .ok_or(BusError { address }),
            Region::Device => self.device_read(address),
            Region::Unmapped => Err(BusError { address }),
        }
    }

    fn write8(&mut self, address: u32, value: u8) -> Result<(), BusError> {
        match region(address) {
            Region::Rom(_) => {
                warn!(address = format_args!("{address:#010X}"), "bus: write to ROM ignored");
                Ok(())
            }
            Region::Ram => {
                let index = self.memory.ram_index(address).ok_or(BusError { address })?;
                self.memory.ram[index] = value;
                Ok(())
            }
            Region::Device => self.device_write(address, value),
            Region::Unmapped => Err(BusError { address }),
        }
    }

    fn reset_devices(&mut self) {
        self.interrupts.reset();
        for device in &mut self.devices {
            for &source in device.event_sources() {
                self.scheduler.cancel(source);
            }
            device.reset();
        }
    }
}
