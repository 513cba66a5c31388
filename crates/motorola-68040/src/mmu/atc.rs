//! Address translation cache.
//!
//! Two set-associative halves (instruction and data), each 16 slots by 4
//! ways. The slot is the low four bits of the logical page number; the way
//! on a true miss comes from a single round-robin counter.

use serde::{Deserialize, Serialize};

pub const SLOTS: usize = 16;
pub const WAYS: usize = 4;

/// One cached translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AtcLine {
    pub valid: bool,
    /// Logical page number (address >> page shift).
    pub tag: u32,
    /// Translated with the supervisor root pointer.
    pub supervisor: bool,
    pub global: bool,
    pub modified: bool,
    pub write_protected: bool,
    /// Page is only reachable from supervisor mode.
    pub supervisor_only: bool,
    /// Physical page base.
    pub physical: u32,
    /// Cache mode (CM field of the page descriptor).
    pub cache_mode: u8,
    /// User page attributes (U1/U0).
    pub user_bits: u8,
}

/// Which half of the cache an access uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtcKind {
    Instruction = 0,
    Data = 1,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atc {
    lines: [[[AtcLine; WAYS]; SLOTS]; 2],
    victim: u8,
}

impl Default for Atc {
    fn default() -> Self {
        Self::new()
    }
}

impl Atc {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: [[[AtcLine::default(); WAYS]; SLOTS]; 2],
            victim: 0,
        }
    }

    fn slot(tag: u32) -> usize {
        (tag & 0xF) as usize
    }

    /// Find a valid line for `tag` translated in the given mode.
    #[must_use]
    pub fn lookup(&self, kind: AtcKind, tag: u32, supervisor: bool) -> Option<(usize, AtcLine)> {
        self.lines[kind as usize][Self::slot(tag)]
            .iter()
            .enumerate()
            .find(|(_, line)| line.valid && line.tag == tag && line.supervisor == supervisor)
            .map(|(way, line)| (way, *line))
    }

    /// Install a line. `way` reuses a specific way (soft miss); otherwise the
    /// round-robin victim is replaced. Returns the way written.
    pub fn fill(&mut self, kind: AtcKind, line: AtcLine, way: Option<usize>) -> usize {
        let way = match way {
            Some(way) => way % WAYS,
            None => {
                let victim = usize::from(self.victim);
                self.victim = ((victim + 1) % WAYS) as u8;
                victim
            }
        };
        self.lines[kind as usize][Self::slot(line.tag)][way] = line;
        way
    }

    /// Install a line, replacing any existing line for the same page and mode.
    pub fn replace(&mut self, kind: AtcKind, line: AtcLine) -> usize {
        let existing = self.lookup(kind, line.tag, line.supervisor).map(|(way, _)| way);
        self.fill(kind, line, existing)
    }

    /// Invalidate lines for one page in both halves. Global lines survive
    /// unless `global` is set.
    pub fn flush_page(&mut self, tag: u32, supervisor: bool, global: bool) {
        let slot = Self::slot(tag);
        for half in &mut self.lines {
            for line in &mut half[slot] {
                if line.valid
                    && line.tag == tag
                    && line.supervisor == supervisor
                    && (global || !line.global)
                {
                    line.valid = false;
                }
            }
        }
    }

    /// Invalidate every line. Global lines survive unless `global` is set.
    pub fn flush_all(&mut self, global: bool) {
        for line in self.lines.iter_mut().flatten().flatten() {
            if global || !line.global {
                line.valid = false;
            }
        }
    }

    /// Number of valid lines (diagnostics).
    #[must_use]
    pub fn valid_lines(&self) -> usize {
        self.lines.iter().flatten().flatten().filter(|l| l.valid).count()
    }

    #[must_use]
    pub fn victim(&self) -> u8 {
        self.victim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(tag: u32, global: bool) -> AtcLine {
        AtcLine {
            valid: true,
            tag,
            supervisor: true,
            global,
            physical: tag << 12,
            ..AtcLine::default()
        }
    }

    #[test]
    fn victim_counter_rotates_through_the_ways() {
        let mut atc = Atc::new();
        let ways: Vec<usize> = (0..5)
            .map(|i| atc.fill(AtcKind::Data, line(i * 16, false), None))
            .collect();
        assert_eq!(ways, vec![0, 1, 2, 3, 0]);
        // the fifth fill evicted the first page
        assert!(atc.lookup(AtcKind::Data, 0, true).is_none());
        assert!(atc.lookup(AtcKind::Data, 64, true).is_some());
    }

    #[test]
    fn lookup_requires_matching_mode_and_half() {
        let mut atc = Atc::new();
        atc.fill(AtcKind::Data, line(3, false), None);
        assert!(atc.lookup(AtcKind::Data, 3, true).is_some());
        assert!(atc.lookup(AtcKind::Data, 3, false).is_none());
        assert!(atc.lookup(AtcKind::Instruction, 3, true).is_none());
    }

    #[test]
    fn non_global_flush_keeps_global_lines() {
        let mut atc = Atc::new();
        atc.fill(AtcKind::Data, line(1, true), None);
        atc.fill(AtcKind::Data, line(2, false), None);
        atc.flush_all(false);
        assert_eq!(atc.valid_lines(), 1);
        atc.flush_all(true);
        assert_eq!(atc.valid_lines(), 0);
    }

    #[test]
    fn page_flush_hits_both_halves() {
        let mut atc = Atc::new();
        atc.fill(AtcKind::Data, line(5, false), None);
        atc.fill(AtcKind::Instruction, line(5, false), None);
        atc.flush_page(5, true, false);
        assert_eq!(atc.valid_lines(), 0);
    }
}
