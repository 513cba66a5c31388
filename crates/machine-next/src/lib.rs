//! A NeXT-class workstation around the 68030/68040 core.
//!
//! Everything runs on one thread. [`Next::run`] interleaves CPU
//! instructions with the event scheduler, attached coprocessors and the
//! interrupt controller, and returns when it is asked to stop or its cycle
//! budget runs out. Other threads can only interrupt it through a
//! [`BreakHandle`].

pub mod config;
pub mod device;
pub mod error;
pub mod interrupts;
pub mod memory;
pub mod scheduler;
pub mod timer;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use emu_core::{HostClock, MasterClock, Observable, StdHostClock, Ticks, Value};
use motorola_68040::{Cpu, CpuError};
use tracing::{debug, error, info};

pub use crate::config::{NextConfig, NextModel};
pub use crate::device::{Coprocessor, Device, DeviceContext};
pub use crate::error::MachineError;
pub use crate::memory::{Memory, NextBus};
pub use crate::scheduler::{EventScheduler, EventSource, Pending, SchedulerSnapshot};

/// Why [`Next::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// A [`BreakHandle`] was triggered.
    Break,
    /// A configuration change was applied; the machine has been reset.
    ModeChange,
    /// The CPU reached a breakpoint.
    Debugger,
    /// The requested number of cycles has run.
    CycleBudget,
}

/// Thread-safe request to stop the run loop at the next instruction
/// boundary.
#[derive(Debug, Clone, Default)]
pub struct BreakHandle(Arc<AtomicBool>);

impl BreakHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Paths accepted by [`Next::query`](Observable::query) besides `cpu.*`,
/// which is forwarded to the CPU.
const QUERY_PATHS: &[&str] = &[
    "cycles",
    "ipl",
    "int.status",
    "int.mask",
    "scheduler.next",
    "scheduler.countdown",
    "cpu.pc",
    "cpu.sr",
    "cpu.a7",
    "cpu.halted",
    "cpu.stopped",
    "cpu.mmu.tcr",
    "cpu.mmu.enabled",
];

pub struct Next {
    pub cpu: Cpu,
    pub bus: NextBus,
    config: NextConfig,
    coprocessors: Vec<Box<dyn Coprocessor>>,
    host: Box<dyn HostClock>,
    break_handle: BreakHandle,
    pending_config: Option<NextConfig>,
    breakpoints: BTreeSet<u32>,
}

impl Next {
    /// Build and hard reset a machine running against the host's real
    /// clock.
    pub fn new(config: NextConfig, rom: Vec<u8>) -> Result<Self, MachineError> {
        Self::with_host_clock(config, rom, Box::new(StdHostClock::new()))
    }

    pub fn with_host_clock(
        config: NextConfig,
        rom: Vec<u8>,
        host: Box<dyn HostClock>,
    ) -> Result<Self, MachineError> {
        let cpu = Cpu::new(config.cpu_model, config.fpu_model).map_err(CpuError::from)?;
        let memory = Memory::new(config.ram_bytes, rom)?;
        let scheduler = EventScheduler::new(MasterClock::new(config.cpu_hz), config.realtime);
        let mut machine = Self {
            cpu,
            bus: NextBus::new(memory, scheduler),
            config,
            coprocessors: Vec::new(),
            host,
            break_handle: BreakHandle::default(),
            pending_config: None,
            breakpoints: BTreeSet::new(),
        };
        machine.reset()?;
        info!(model = ?machine.config.model, cpu = machine.cpu.model().name(), "next: machine ready");
        Ok(machine)
    }

    #[must_use]
    pub fn config(&self) -> &NextConfig {
        &self.config
    }

    /// Hard reset: devices, interrupt controller and scheduler to power-on
    /// state, then SSP and PC from the reset vectors with the MMU off.
    pub fn reset(&mut self) -> Result<(), MachineError> {
        self.bus.reset();
        self.cpu.set_ipl(0);
        self.cpu.reset(&mut self.bus)?;
        Ok(())
    }

    #[must_use]
    pub fn break_handle(&self) -> BreakHandle {
        self.break_handle.clone()
    }

    pub fn attach_device(&mut self, device: Box<dyn Device>) {
        self.bus.attach(device);
    }

    pub fn attach_coprocessor(&mut self, coprocessor: Box<dyn Coprocessor>) {
        debug!(name = coprocessor.name(), "next: coprocessor attached");
        self.coprocessors.push(coprocessor);
    }

    pub fn set_breakpoint(&mut self, pc: u32) {
        self.breakpoints.insert(pc);
    }

    pub fn clear_breakpoint(&mut self, pc: u32) {
        self.breakpoints.remove(&pc);
    }

    /// Switch configuration at the next instruction boundary. The run loop
    /// applies it, resets the machine and returns [`RunExit::ModeChange`].
    pub fn request_mode_change(&mut self, config: NextConfig) {
        self.pending_config = Some(config);
    }

    /// Total CPU cycles run.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.bus.scheduler.cycles()
    }

    /// Run until something asks the loop to exit or at least `budget`
    /// cycles have passed.
    ///
    /// A double fault hard resets the machine before the error is returned;
    /// no instruction runs in between.
    pub fn run(&mut self, budget: u64) -> Result<RunExit, MachineError> {
        let start = self.cycles();
        loop {
            let cycles = match self.cpu.step(&mut self.bus) {
                Ok(cycles) => cycles,
                Err(err) => return Err(self.fatal(err)),
            };
            self.bus.scheduler.advance(u64::from(cycles));
            self.bus.service_events(self.host.now_micros());
            for coprocessor in &mut self.coprocessors {
                coprocessor.step(Ticks::from(cycles));
            }
            self.cpu.set_ipl(self.bus.interrupts.level());

            // the trace exception is taken before anything may leave the loop
            if self.cpu.trace_pending() {
                continue;
            }
            if self.cpu.is_stopped() {
                self.idle();
            }
            if let Some(config) = self.pending_config.take() {
                self.apply_config(config)?;
                return Ok(RunExit::ModeChange);
            }
            if self.break_handle.take() {
                return Ok(RunExit::Break);
            }
            if self.breakpoints.contains(&self.cpu.regs.pc) {
                debug!(pc = format_args!("{:#010X}", self.cpu.regs.pc), "next: breakpoint");
                return Ok(RunExit::Debugger);
            }
            if self.cycles() - start >= budget {
                return Ok(RunExit::CycleBudget);
            }
        }
    }

    /// STOP with nothing but wall-clock events pending: emulated cycles
    /// bring nothing closer, so give the host CPU away.
    fn idle(&self) {
        if self.config.idle_throttle
            && !self.bus.scheduler.has_cycle_events()
            && self.bus.scheduler.has_wall_clock_events()
        {
            self.host.sleep_micros(self.config.idle_sleep_us);
        }
    }

    fn fatal(&mut self, err: CpuError) -> MachineError {
        error!(%err, pc = format_args!("{:#010X}", self.cpu.instruction_pc()), "next: cpu stopped, resetting");
        if let Err(reset_err) = self.reset() {
            error!(%reset_err, "next: reset after double fault failed");
        }
        MachineError::Cpu(err)
    }

    fn apply_config(&mut self, config: NextConfig) -> Result<(), MachineError> {
        if (config.cpu_model, config.fpu_model) != (self.cpu.model(), self.cpu.fpu_model()) {
            self.cpu
                .set_model(config.cpu_model, config.fpu_model)
                .map_err(CpuError::from)?;
        }
        if config.ram_bytes != self.bus.memory.ram.len() {
            self.bus.memory.resize_ram(config.ram_bytes)?;
        }
        self.bus
            .scheduler
            .set_clock(MasterClock::new(config.cpu_hz), config.realtime);
        info!(model = ?config.model, "next: configuration changed");
        self.config = config;
        self.reset()
    }
}

impl Observable for Next {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(value) = self.cpu.query_under("cpu", path) {
            return Some(value);
        }
        match path {
            "cycles" => Some(self.cycles().into()),
            "ipl" => Some(self.bus.interrupts.level().into()),
            "int.status" => Some(self.bus.interrupts.status().into()),
            "int.mask" => Some(self.bus.interrupts.mask().into()),
            "scheduler.next" => Some(
                self.bus
                    .scheduler
                    .next_due()
                    .map_or_else(|| "none".into(), |(source, _)| format!("{source:?}").as_str().into()),
            ),
            "scheduler.countdown" => self
                .bus
                .scheduler
                .next_due()
                .map(|(_, remaining)| (remaining.max(0) as u64).into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
