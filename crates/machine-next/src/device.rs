//! Interfaces for peripherals attached to the machine.

use std::ops::Range;

use crate::interrupts::InterruptController;
use crate::scheduler::{EventScheduler, EventSource};

/// Components stepped in lock-step with the CPU after every instruction
/// (graphics board, DSP).
pub use emu_core::Tickable as Coprocessor;

/// What a device may touch while servicing a register access or an event.
pub struct DeviceContext<'a> {
    pub scheduler: &'a mut EventScheduler,
    pub interrupts: &'a mut InterruptController,
    /// Host time in microseconds, for wall-clock scheduling.
    pub now_us: u64,
}

/// A register bank in the device space.
///
/// Registers are byte-wide on the bus; word and long accesses arrive as
/// consecutive byte accesses in big-endian order. Offsets are relative to
/// the start of [`range`](Device::range).
pub trait Device {
    fn name(&self) -> &'static str;

    /// Physical addresses this device answers.
    fn range(&self) -> Range<u32>;

    fn read8(&mut self, offset: u32, ctx: &mut DeviceContext<'_>) -> u8;

    fn write8(&mut self, offset: u32, value: u8, ctx: &mut DeviceContext<'_>);

    /// Scheduler slots owned by this device.
    fn event_sources(&self) -> &'static [EventSource] {
        &[]
    }

    /// A slot from [`event_sources`](Device::event_sources) fired. The
    /// handler acknowledges it through `ctx.scheduler`.
    fn on_event(&mut self, source: EventSource, ctx: &mut DeviceContext<'_>) {
        let _ = source;
        ctx.scheduler.acknowledge();
    }

    /// The CPU executed RESET, or the machine was hard reset.
    fn reset(&mut self) {}
}
