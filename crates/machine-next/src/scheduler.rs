//! Cycle-accurate event scheduler.
//!
//! One slot per [`EventSource`]. Cycle entries hold the cycles remaining
//! until they fire; only the earliest one is counted down on every
//! instruction (`countdown`), the others are rebased lazily whenever the
//! table changes. Wall-clock entries hold an absolute host time in
//! microseconds and are checked by [`EventScheduler::poll`].
//!
//! An event handler calls [`EventScheduler::acknowledge`] first, then
//! reschedules itself if it is periodic.

use emu_core::MasterClock;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Everything in the machine that can have a timed event pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSource {
    Hardclock,
    Video,
    Keyboard,
    Scsi,
    Floppy,
    Ethernet,
    Sound,
    Dsp,
    Scc,
    Printer,
    Rtc,
    /// Graphics/coprocessor board.
    Board,
}

impl EventSource {
    pub const COUNT: usize = 12;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Hardclock,
        Self::Video,
        Self::Keyboard,
        Self::Scsi,
        Self::Floppy,
        Self::Ethernet,
        Self::Sound,
        Self::Dsp,
        Self::Scc,
        Self::Printer,
        Self::Rtc,
        Self::Board,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

/// State of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Pending {
    #[default]
    Inactive,
    /// Cycles until the event fires. Zero or less means due.
    Cycles(i64),
    /// Host time, in microseconds, at which the event fires.
    Micros(u64),
}

/// Countdown value when no cycle event is pending.
const IDLE: i64 = i64::MAX;

#[derive(Debug, Clone)]
pub struct EventScheduler {
    slots: [Pending; EventSource::COUNT],
    /// Earliest cycle entry.
    next: Option<EventSource>,
    /// Cycles until `next` fires. Decremented by `advance`.
    countdown: i64,
    /// `countdown` at the last rebase; the difference is the elapsed time
    /// not yet applied to the other slots.
    basis: i64,
    /// Returned by `poll`, waiting for `acknowledge`.
    firing: Option<EventSource>,
    /// How late the last acknowledged cycle event fired.
    overrun: i64,
    clock: MasterClock,
    realtime: bool,
    counter: u64,
}

/// Plain-data copy of the pending event table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Active slots with cycle entries already rebased.
    pub pending: Vec<(EventSource, Pending)>,
    pub firing: Option<EventSource>,
    pub overrun: i64,
    pub counter: u64,
}

fn to_i64(cycles: u64) -> i64 {
    i64::try_from(cycles).unwrap_or(IDLE)
}

impl EventScheduler {
    #[must_use]
    pub fn new(clock: MasterClock, realtime: bool) -> Self {
        Self {
            slots: [Pending::Inactive; EventSource::COUNT],
            next: None,
            countdown: IDLE,
            basis: IDLE,
            firing: None,
            overrun: 0,
            clock,
            realtime,
            counter: 0,
        }
    }

    /// Drop every pending event. The cycle counter keeps running.
    pub fn clear(&mut self) {
        self.slots = [Pending::Inactive; EventSource::COUNT];
        self.firing = None;
        self.overrun = 0;
        self.recompute();
    }

    pub fn set_clock(&mut self, clock: MasterClock, realtime: bool) {
        self.clock = clock;
        self.realtime = realtime;
    }

    #[must_use]
    pub fn clock(&self) -> MasterClock {
        self.clock
    }

    #[must_use]
    pub fn is_realtime(&self) -> bool {
        self.realtime
    }

    /// Total cycles advanced since creation.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.counter
    }

    #[must_use]
    pub fn micros_to_cycles(&self, micros: u64) -> u64 {
        self.clock.micros_to_ticks(micros).get()
    }

    /// Apply the cycles counted off `countdown` since the last rebase to
    /// every cycle entry.
    fn rebase(&mut self) {
        let elapsed = self.basis.saturating_sub(self.countdown);
        if elapsed != 0 {
            let next = self.next;
            for source in EventSource::ALL {
                if let Pending::Cycles(remaining) = &mut self.slots[source.index()] {
                    let left = remaining.saturating_sub(elapsed);
                    *remaining = if Some(source) == next { left } else { left.max(0) };
                }
            }
        }
        self.basis = self.countdown;
    }

    /// Linear scan for the earliest cycle entry. Slots must be rebased.
    fn recompute(&mut self) {
        let mut best: Option<(EventSource, i64)> = None;
        for source in EventSource::ALL {
            if let Pending::Cycles(remaining) = self.slots[source.index()] {
                if best.is_none_or(|(_, earliest)| remaining < earliest) {
                    best = Some((source, remaining));
                }
            }
        }
        match best {
            Some((source, remaining)) => {
                self.next = Some(source);
                self.countdown = remaining;
                self.basis = remaining;
            }
            None => {
                self.next = None;
                self.countdown = IDLE;
                self.basis = IDLE;
            }
        }
    }

    fn insert(&mut self, source: EventSource, pending: Pending) {
        self.rebase();
        self.slots[source.index()] = pending;
        self.recompute();
        trace!(?source, ?pending, "scheduler: event scheduled");
    }

    pub fn schedule_after_cycles(&mut self, cycles: u64, source: EventSource) {
        self.insert(source, Pending::Cycles(to_i64(cycles)));
    }

    /// Schedule relative to when the acknowledged event was due rather than
    /// when it was serviced, so periodic timers do not drift.
    pub fn schedule_after_cycles_from_ack(&mut self, cycles: u64, source: EventSource) {
        let remaining = to_i64(cycles).saturating_sub(self.overrun).max(0);
        self.insert(source, Pending::Cycles(remaining));
    }

    /// In realtime mode the event fires at host time `now_us + micros`;
    /// otherwise the delay is converted to CPU cycles.
    pub fn schedule_after_microseconds(&mut self, micros: u64, source: EventSource, now_us: u64) {
        if self.realtime {
            self.insert(source, Pending::Micros(now_us.saturating_add(micros)));
        } else {
            self.schedule_after_cycles(self.micros_to_cycles(micros), source);
        }
    }

    pub fn cancel(&mut self, source: EventSource) {
        self.insert(source, Pending::Inactive);
    }

    /// Retire the event last returned by [`poll`](Self::poll).
    pub fn acknowledge(&mut self) {
        let Some(source) = self.firing.take() else {
            warn!("scheduler: acknowledge with no event firing");
            return;
        };
        self.rebase();
        let slot = &mut self.slots[source.index()];
        self.overrun = match *slot {
            Pending::Cycles(remaining) => remaining.saturating_neg().max(0),
            _ => 0,
        };
        *slot = Pending::Inactive;
        self.recompute();
    }

    /// Count `cycles` of CPU time.
    pub fn advance(&mut self, cycles: u64) {
        self.countdown = self.countdown.saturating_sub(to_i64(cycles));
        self.counter = self.counter.wrapping_add(cycles);
    }

    /// The event that is due now, if any: the earliest cycle entry first,
    /// then the earliest expired wall-clock entry.
    pub fn poll(&mut self, now_us: u64) -> Option<EventSource> {
        if let Some(source) = self.next {
            if self.countdown <= 0 {
                self.firing = Some(source);
                return Some(source);
            }
        }
        let due = EventSource::ALL
            .into_iter()
            .filter_map(|source| match self.slots[source.index()] {
                Pending::Micros(at) if at <= now_us => Some((at, source)),
                _ => None,
            })
            .min();
        let (_, source) = due?;
        self.firing = Some(source);
        Some(source)
    }

    /// Event returned by `poll` and not yet acknowledged.
    #[must_use]
    pub fn firing(&self) -> Option<EventSource> {
        self.firing
    }

    /// Current state of a slot, with elapsed cycles applied.
    #[must_use]
    pub fn pending(&self, source: EventSource) -> Pending {
        match self.slots[source.index()] {
            Pending::Cycles(_) if Some(source) == self.next => Pending::Cycles(self.countdown),
            Pending::Cycles(remaining) => {
                let elapsed = self.basis.saturating_sub(self.countdown);
                Pending::Cycles(remaining.saturating_sub(elapsed).max(0))
            }
            other => other,
        }
    }

    /// Earliest cycle event and the cycles until it fires.
    #[must_use]
    pub fn next_due(&self) -> Option<(EventSource, i64)> {
        self.next.map(|source| (source, self.countdown))
    }

    #[must_use]
    pub fn has_cycle_events(&self) -> bool {
        self.next.is_some()
    }

    #[must_use]
    pub fn has_wall_clock_events(&self) -> bool {
        self.slots.iter().any(|slot| matches!(slot, Pending::Micros(_)))
    }

    #[must_use]
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            pending: EventSource::ALL
                .into_iter()
                .map(|source| (source, self.pending(source)))
                .filter(|(_, pending)| *pending != Pending::Inactive)
                .collect(),
            firing: self.firing,
            overrun: self.overrun,
            counter: self.counter,
        }
    }

    pub fn restore(&mut self, snapshot: &SchedulerSnapshot) {
        self.slots = [Pending::Inactive; EventSource::COUNT];
        for &(source, pending) in &snapshot.pending {
            self.slots[source.index()] = pending;
        }
        self.firing = snapshot.firing;
        self.overrun = snapshot.overrun;
        self.counter = snapshot.counter;
        self.recompute();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> EventScheduler {
        EventScheduler::new(MasterClock::new(25_000_000), false)
    }

    #[test]
    fn earliest_event_fires_first() {
        let mut s = scheduler();
        s.schedule_after_cycles(100, EventSource::Video);
        s.schedule_after_cycles(40, EventSource::Scsi);
        assert_eq!(s.next_due(), Some((EventSource::Scsi, 40)));

        s.advance(39);
        assert_eq!(s.poll(0), None);
        s.advance(1);
        assert_eq!(s.poll(0), Some(EventSource::Scsi));
        s.acknowledge();
        assert_eq!(s.pending(EventSource::Scsi), Pending::Inactive);
        assert_eq!(s.next_due(), Some((EventSource::Video, 60)));
    }

    #[test]
    fn rescheduling_rebases_the_others() {
        let mut s = scheduler();
        s.schedule_after_cycles(100, EventSource::Video);
        s.advance(30);
        s.schedule_after_cycles(500, EventSource::Floppy);
        assert_eq!(s.pending(EventSource::Video), Pending::Cycles(70));
        assert_eq!(s.pending(EventSource::Floppy), Pending::Cycles(500));
        s.advance(20);
        assert_eq!(s.pending(EventSource::Floppy), Pending::Cycles(480));
    }

    #[test]
    fn periodic_event_does_not_drift() {
        let mut s = scheduler();
        s.schedule_after_cycles(100, EventSource::Hardclock);
        // serviced 7 cycles late
        s.advance(107);
        assert_eq!(s.poll(0), Some(EventSource::Hardclock));
        s.acknowledge();
        s.schedule_after_cycles_from_ack(100, EventSource::Hardclock);
        assert_eq!(s.pending(EventSource::Hardclock), Pending::Cycles(93));
    }

    #[test]
    fn cancel_keeps_the_rest() {
        let mut s = scheduler();
        s.schedule_after_cycles(10, EventSource::Dsp);
        s.schedule_after_cycles(20, EventSource::Scc);
        s.advance(5);
        s.cancel(EventSource::Dsp);
        assert_eq!(s.next_due(), Some((EventSource::Scc, 15)));
        s.cancel(EventSource::Scc);
        assert_eq!(s.next_due(), None);
        assert!(!s.has_cycle_events());
    }

    #[test]
    fn microseconds_convert_to_cycles_unless_realtime() {
        let mut s = scheduler();
        s.schedule_after_microseconds(4, EventSource::Rtc, 1_000);
        assert_eq!(s.pending(EventSource::Rtc), Pending::Cycles(100));

        let mut s = EventScheduler::new(MasterClock::new(25_000_000), true);
        s.schedule_after_microseconds(4, EventSource::Rtc, 1_000);
        assert_eq!(s.pending(EventSource::Rtc), Pending::Micros(1_004));
        assert!(s.has_wall_clock_events());
        assert_eq!(s.poll(1_003), None);
        assert_eq!(s.poll(1_004), Some(EventSource::Rtc));
        s.acknowledge();
        assert!(!s.has_wall_clock_events());
    }

    #[test]
    fn cycle_events_win_over_wall_clock() {
        let mut s = EventScheduler::new(MasterClock::new(1_000_000), true);
        s.schedule_after_microseconds(0, EventSource::Keyboard, 0);
        s.schedule_after_cycles(0, EventSource::Sound);
        assert_eq!(s.poll(10), Some(EventSource::Sound));
        s.acknowledge();
        assert_eq!(s.poll(10), Some(EventSource::Keyboard));
    }

    #[test]
    fn stray_acknowledge_is_harmless() {
        let mut s = scheduler();
        s.schedule_after_cycles(10, EventSource::Video);
        s.acknowledge();
        assert_eq!(s.next_due(), Some((EventSource::Video, 10)));
    }

    #[test]
    fn snapshot_restores_remaining_times() {
        let mut s = scheduler();
        s.schedule_after_cycles(300, EventSource::Ethernet);
        s.schedule_after_cycles(90, EventSource::Printer);
        s.advance(50);
        let saved = s.snapshot();
        assert_eq!(saved.counter, 50);

        let mut other = scheduler();
        other.restore(&saved);
        assert_eq!(other.next_due(), Some((EventSource::Printer, 40)));
        assert_eq!(other.pending(EventSource::Ethernet), Pending::Cycles(250));
        assert_eq!(other.snapshot(), saved);
    }
}
