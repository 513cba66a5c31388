//! Three-level page-table search.
//!
//! Root and pointer tables have 128 entries, indexed by logical address
//! bits 31-25 and 24-18. The page table is indexed by bits 17-12 (4K pages,
//! 64 entries) or 17-13 (8K pages, 32 entries).
//!
//! Descriptor bits used here:
//!
//! ```text
//! root/pointer: [table address ...] [U=3] [W=2] [UDT=1:0]   UDT valid when bit 1 set
//! page:         [physical ...] [G=10] [U1U0=9:8] [S=7] [CM=6:5] [M=4] [U=3] [W=2] [PDT=1:0]
//! ```

use tracing::debug;

use super::PageGeometry;
use super::atc::AtcLine;
use crate::bus::PhysBus;

pub const DESC_USED: u32 = 1 << 3;
pub const DESC_WRITE_PROTECT: u32 = 1 << 2;
pub const DESC_MODIFIED: u32 = 1 << 4;
pub const DESC_SUPERVISOR: u32 = 1 << 7;
pub const DESC_GLOBAL: u32 = 1 << 10;

const TABLE_MASK: u32 = 0xFFFF_FE00;

/// Why a walk produced no translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkFault {
    /// A descriptor on the path was invalid.
    Invalid { level: u8 },
    /// Reading or updating a descriptor hit a bus error.
    Bus { address: u32 },
}

/// Successful walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkResult {
    pub line: AtcLine,
    /// Final page descriptor value after USED/MODIFIED updates.
    pub descriptor: u32,
    /// Physical address of the page descriptor.
    pub descriptor_address: u32,
}

/// Read a descriptor, set USED when clear, and return it.
fn visit(bus: &mut dyn PhysBus, address: u32) -> Result<u32, WalkFault> {
    let mut desc = bus.read32(address).map_err(|e| WalkFault::Bus { address: e.address })?;
    if desc & DESC_USED == 0 {
        desc |= DESC_USED;
        bus.write32(address, desc)
            .map_err(|e| WalkFault::Bus { address: e.address })?;
    }
    Ok(desc)
}

/// Walk the tables rooted at `root` for `address`.
///
/// USED is set on every descriptor visited. For writes to pages that are
/// neither write protected nor supervisor-only-from-user, MODIFIED is set
/// on the page descriptor. The returned line carries the accumulated rights
/// and is valid; faults on rights are left to the caller.
pub fn walk(
    bus: &mut dyn PhysBus,
    root: u32,
    address: u32,
    supervisor: bool,
    write: bool,
    geometry: PageGeometry,
) -> Result<WalkResult, WalkFault> {
    let root_entry = (root & TABLE_MASK) + ((address >> 25) & 0x7F) * 4;
    let root_desc = visit(bus, root_entry)?;
    if root_desc & 2 == 0 {
        debug!(address = format_args!("{address:#010X}"), "mmu: invalid root descriptor");
        return Err(WalkFault::Invalid { level: 0 });
    }
    let mut write_protected = root_desc & DESC_WRITE_PROTECT != 0;

    let pointer_entry = (root_desc & TABLE_MASK) + ((address >> 18) & 0x7F) * 4;
    let pointer_desc = visit(bus, pointer_entry)?;
    if pointer_desc & 2 == 0 {
        debug!(address = format_args!("{address:#010X}"), "mmu: invalid pointer descriptor");
        return Err(WalkFault::Invalid { level: 1 });
    }
    write_protected |= pointer_desc & DESC_WRITE_PROTECT != 0;

    let mut page_entry =
        (pointer_desc & geometry.table_mask) + ((address >> geometry.shift) & geometry.index_mask) * 4;
    let mut page_desc = bus
        .read32(page_entry)
        .map_err(|e| WalkFault::Bus { address: e.address })?;
    match page_desc & 3 {
        0 => return Err(WalkFault::Invalid { level: 2 }),
        2 => {
            // indirect: one more fetch, which must be resident
            page_entry = page_desc & 0xFFFF_FFFC;
            page_desc = bus
                .read32(page_entry)
                .map_err(|e| WalkFault::Bus { address: e.address })?;
            if page_desc & 1 == 0 {
                return Err(WalkFault::Invalid { level: 3 });
            }
        }
        _ => {}
    }
    write_protected |= page_desc & DESC_WRITE_PROTECT != 0;
    let supervisor_only = page_desc & DESC_SUPERVISOR != 0;

    let mut updated = page_desc | DESC_USED;
    if write && !write_protected && !(supervisor_only && !supervisor) {
        updated |= DESC_MODIFIED;
    }
    if updated != page_desc {
        bus.write32(page_entry, updated)
            .map_err(|e| WalkFault::Bus { address: e.address })?;
    }

    let line = AtcLine {
        valid: true,
        tag: geometry.page_number(address),
        supervisor,
        global: updated & DESC_GLOBAL != 0,
        modified: updated & DESC_MODIFIED != 0,
        write_protected,
        supervisor_only,
        physical: updated & !geometry.offset_mask,
        cache_mode: ((updated >> 5) & 3) as u8,
        user_bits: ((updated >> 8) & 3) as u8,
    };
    Ok(WalkResult {
        line,
        descriptor: updated,
        descriptor_address: page_entry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FlatBus;

    const ROOT: u32 = 0x1_0000;
    const POINTER: u32 = 0x1_0200;
    const PAGES: u32 = 0x1_0400;

    fn tables(bus: &mut FlatBus, page: u32) {
        bus.poke32(ROOT, POINTER | 2);
        bus.poke32(POINTER, PAGES | 2);
        bus.poke32(PAGES + 4, page);
    }

    #[test]
    fn resolves_and_marks_used() {
        let mut bus = FlatBus::new(0x2_0000);
        tables(&mut bus, 0x0000_5001);
        let geo = PageGeometry::new(false);
        let result = walk(&mut bus, ROOT, 0x1234, true, false, geo).unwrap();
        assert_eq!(result.line.physical, 0x5000);
        assert_eq!(result.line.tag, 1);
        assert!(!result.line.modified);
        assert_ne!(bus.peek32(ROOT) & DESC_USED, 0);
        assert_ne!(bus.peek32(POINTER) & DESC_USED, 0);
        assert_ne!(bus.peek32(PAGES + 4) & DESC_USED, 0);
    }

    #[test]
    fn write_sets_modified_unless_protected() {
        let mut bus = FlatBus::new(0x2_0000);
        tables(&mut bus, 0x0000_5001);
        let geo = PageGeometry::new(false);
        let result = walk(&mut bus, ROOT, 0x1000, false, true, geo).unwrap();
        assert!(result.line.modified);
        assert_ne!(bus.peek32(PAGES + 4) & DESC_MODIFIED, 0);

        tables(&mut bus, 0x0000_5005);
        let result = walk(&mut bus, ROOT, 0x1000, false, true, geo).unwrap();
        assert!(result.line.write_protected);
        assert_eq!(bus.peek32(PAGES + 4) & DESC_MODIFIED, 0);
    }

    #[test]
    fn indirect_and_invalid_descriptors() {
        let mut bus = FlatBus::new(0x2_0000);
        bus.poke32(0x1_1000, 0x0000_7001);
        tables(&mut bus, 0x0001_1002);
        let geo = PageGeometry::new(false);
        let result = walk(&mut bus, ROOT, 0x1000, true, false, geo).unwrap();
        assert_eq!(result.line.physical, 0x7000);
        assert_eq!(result.descriptor_address, 0x1_1000);

        tables(&mut bus, 0);
        assert_eq!(
            walk(&mut bus, ROOT, 0x1000, true, false, geo),
            Err(WalkFault::Invalid { level: 2 })
        );
    }

    #[test]
    fn eight_k_pages_use_five_index_bits() {
        let mut bus = FlatBus::new(0x2_0000);
        bus.poke32(ROOT, POINTER | 2);
        bus.poke32(POINTER, PAGES | 2);
        // 0x6000 >> 13 = 3
        bus.poke32(PAGES + 12, 0x0000_A001);
        let geo = PageGeometry::new(true);
        let result = walk(&mut bus, ROOT, 0x7ABC, true, false, geo).unwrap();
        assert_eq!(result.line.physical, 0xA000);
        assert_eq!(result.line.tag, 3);
    }
}
