//! Hardclock: the system's periodic tick.
//!
//! A 16-bit latch holds the period in microseconds. Setting the enable bit
//! in the CSR starts the timer; each expiry raises the TIMER interrupt
//! (level 6) and re-arms. Any CSR write clears a pending TIMER interrupt.

use std::ops::Range;

use tracing::debug;

use crate::device::{Device, DeviceContext};
use crate::interrupts::int;
use crate::scheduler::EventSource;

pub const HARDCLOCK_BASE: u32 = 0x0201_6000;

const LATCH_HI: u32 = 0;
const LATCH_LO: u32 = 1;
const CSR: u32 = 4;

pub const CSR_ENABLE: u8 = 0x80;
/// Load the latch into the counter; reads back as zero.
pub const CSR_UPDATE: u8 = 0x40;

#[derive(Debug, Clone, Default)]
pub struct Hardclock {
    latch: u16,
    csr: u8,
}

impl Hardclock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn period_us(&self) -> u16 {
        self.latch
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.csr & CSR_ENABLE != 0
    }

    fn arm(&self, ctx: &mut DeviceContext<'_>) {
        if self.enabled() && self.latch != 0 {
            ctx.scheduler
                .schedule_after_microseconds(u64::from(self.latch), EventSource::Hardclock, ctx.now_us);
        } else {
            ctx.scheduler.cancel(EventSource::Hardclock);
        }
    }
}

impl Device for Hardclock {
    fn name(&self) -> &'static str {
        "hardclock"
    }

    fn range(&self) -> Range<u32> {
        HARDCLOCK_BASE..HARDCLOCK_BASE + 8
    }

    fn read8(&mut self, offset: u32, _ctx: &mut DeviceContext<'_>) -> u8 {
        match offset {
            LATCH_HI => (self.latch >> 8) as u8,
            LATCH_LO => self.latch as u8,
            CSR => self.csr,
            _ => 0,
        }
    }

    fn write8(&mut self, offset: u32, value: u8, ctx: &mut DeviceContext<'_>) {
        match offset {
            LATCH_HI => self.latch = (self.latch & 0x00FF) | (u16::from(value) << 8),
            LATCH_LO => self.latch = (self.latch & 0xFF00) | u16::from(value),
            CSR => {
                ctx.interrupts.lower(int::TIMER);
                self.csr = value & !CSR_UPDATE;
                debug!(latch = self.latch, enabled = self.enabled(), "hardclock: csr write");
                self.arm(ctx);
            }
            _ => {}
        }
    }

    fn event_sources(&self) -> &'static [EventSource] {
        &[EventSource::Hardclock]
    }

    fn on_event(&mut self, source: EventSource, ctx: &mut DeviceContext<'_>) {
        ctx.scheduler.acknowledge();
        ctx.interrupts.raise(int::TIMER);
        if !self.enabled() || self.latch == 0 {
            return;
        }
        let period = u64::from(self.latch);
        if ctx.scheduler.is_realtime() {
            ctx.scheduler.schedule_after_microseconds(period, source, ctx.now_us);
        } else {
            let cycles = ctx.scheduler.micros_to_cycles(period);
            ctx.scheduler.schedule_after_cycles_from_ack(cycles, source);
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use emu_core::MasterClock;

    use super::*;
    use crate::interrupts::InterruptController;
    use crate::scheduler::{EventScheduler, Pending};

    fn parts() -> (Hardclock, EventScheduler, InterruptController) {
        let mut interrupts = InterruptController::new();
        interrupts.set_mask(int::TIMER);
        (Hardclock::new(), EventScheduler::new(MasterClock::new(25_000_000), false), interrupts)
    }

    #[test]
    fn enable_schedules_the_latch_period() {
        let (mut timer, mut scheduler, mut interrupts) = parts();
        let mut ctx = DeviceContext { scheduler: &mut scheduler, interrupts: &mut interrupts, now_us: 0 };
        timer.write8(LATCH_HI, 0x00, &mut ctx);
        timer.write8(LATCH_LO, 0x0A, &mut ctx);
        timer.write8(CSR, CSR_ENABLE | CSR_UPDATE, &mut ctx);
        assert_eq!(timer.read8(CSR, &mut ctx), CSR_ENABLE);
        assert_eq!(scheduler.pending(EventSource::Hardclock), Pending::Cycles(250));
    }

    #[test]
    fn expiry_raises_timer_and_rearms() {
        let (mut timer, mut scheduler, mut interrupts) = parts();
        {
            let mut ctx = DeviceContext { scheduler: &mut scheduler, interrupts: &mut interrupts, now_us: 0 };
            timer.write8(LATCH_LO, 4, &mut ctx);
            timer.write8(CSR, CSR_ENABLE, &mut ctx);
        }
        scheduler.advance(110);
        assert_eq!(scheduler.poll(0), Some(EventSource::Hardclock));
        {
            let mut ctx = DeviceContext { scheduler: &mut scheduler, interrupts: &mut interrupts, now_us: 0 };
            timer.on_event(EventSource::Hardclock, &mut ctx);
        }
        assert_eq!(interrupts.level(), 6);
        // 100 cycle period, fired 10 late
        assert_eq!(scheduler.pending(EventSource::Hardclock), Pending::Cycles(90));

        let mut ctx = DeviceContext { scheduler: &mut scheduler, interrupts: &mut interrupts, now_us: 0 };
        timer.write8(CSR, 0, &mut ctx);
        assert_eq!(interrupts.level(), 0);
        assert_eq!(scheduler.pending(EventSource::Hardclock), Pending::Inactive);
    }
}
