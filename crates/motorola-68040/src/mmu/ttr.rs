//! Transparent translation registers.
//!
//! 68040 ITTn/DTTn layout:
//!
//! ```text
//!  31       24 23       16  15  14-13  9-8   6-5   2
//! [ base    ] [ mask    ] [E] [ S ] [U1U0] [CM] [W]
//! ```
//!
//! 68030 TT0/TT1 layout:
//!
//! ```text
//!  31       24 23       16  15   10   9    8    6-4      2-0
//! [ base    ] [ mask    ] [E] [CI] [RW] [RWM] [FC base] [FC mask]
//! ```

use super::Access;

/// Result of matching an address against the transparent windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtMatch {
    /// No window covers the address; use the paged path.
    Miss,
    /// Identity-mapped.
    Hit,
    /// Identity-mapped but write protected and this is a write.
    WriteProtected,
}

pub const TTR_ENABLE: u32 = 1 << 15;
pub const TTR_WRITE_PROTECT: u32 = 1 << 2;
/// Writable bits of a 68040 TTR.
pub const TTR_MASK: u32 = 0xFFFF_E364;
/// Writable bits of a 68030 TTx.
pub const TT030_MASK: u32 = 0xFFFF_8777;

fn address_matches(ttr: u32, address: u32) -> bool {
    let base = ttr >> 24;
    let mask = (ttr >> 16) & 0xFF;
    ((address >> 24) ^ base) & !mask & 0xFF == 0
}

/// Match one 68040 TTR.
#[must_use]
pub fn match_040(ttr: u32, address: u32, access: Access) -> TtMatch {
    if ttr & TTR_ENABLE == 0 || !address_matches(ttr, address) {
        return TtMatch::Miss;
    }
    let mode_ok = match (ttr >> 13) & 3 {
        0 => !access.supervisor,
        1 => access.supervisor,
        _ => true,
    };
    if !mode_ok {
        TtMatch::Miss
    } else if access.write && ttr & TTR_WRITE_PROTECT != 0 {
        TtMatch::WriteProtected
    } else {
        TtMatch::Hit
    }
}

/// Match one 68030 TTx. Read/write selectivity makes a non-matching
/// direction fall through to the page tables rather than fault.
#[must_use]
pub fn match_030(tt: u32, address: u32, access: Access) -> TtMatch {
    if tt & TTR_ENABLE == 0 || !address_matches(tt, address) {
        return TtMatch::Miss;
    }
    let fc = u32::from(access.fc().bits());
    let fc_base = (tt >> 4) & 7;
    let fc_mask = tt & 7;
    if (fc ^ fc_base) & !fc_mask & 7 != 0 {
        return TtMatch::Miss;
    }
    let rw_masked = tt & (1 << 8) != 0;
    let match_reads = tt & (1 << 9) != 0;
    if !rw_masked && match_reads == access.write {
        return TtMatch::Miss;
    }
    TtMatch::Hit
}

/// First matching window of a pair, in priority order.
#[must_use]
pub fn match_pair(pair: [u32; 2], address: u32, access: Access, mc68030: bool) -> TtMatch {
    for ttr in pair {
        let hit = if mc68030 {
            match_030(ttr, address, access)
        } else {
            match_040(ttr, address, access)
        };
        if hit != TtMatch::Miss {
            return hit;
        }
    }
    TtMatch::Miss
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPER_READ: Access = Access {
        supervisor: true,
        program: false,
        write: false,
    };
    const USER_WRITE: Access = Access {
        supervisor: false,
        program: false,
        write: true,
    };

    #[test]
    fn base_and_mask_select_the_high_byte() {
        // 0x02xxxxxx, both modes
        let ttr = 0x0200_C000;
        assert_eq!(match_040(ttr, 0x0200_7000, SUPER_READ), TtMatch::Hit);
        assert_eq!(match_040(ttr, 0x0300_0000, SUPER_READ), TtMatch::Miss);
        // mask 0x01 ignores the low bit of the high byte
        let ttr = 0x0201_C000;
        assert_eq!(match_040(ttr, 0x0300_0000, SUPER_READ), TtMatch::Hit);
    }

    #[test]
    fn s_field_filters_by_mode() {
        let user_only = 0x0000_8000;
        let super_only = 0x0000_A000;
        assert_eq!(match_040(user_only, 0x10, SUPER_READ), TtMatch::Miss);
        assert_eq!(match_040(super_only, 0x10, SUPER_READ), TtMatch::Hit);
        assert_eq!(match_040(user_only, 0x10, USER_WRITE), TtMatch::Hit);
    }

    #[test]
    fn write_protected_window_denies_writes_only() {
        let ttr = 0x0000_C004;
        assert_eq!(match_040(ttr, 0x10, USER_WRITE), TtMatch::WriteProtected);
        assert_eq!(match_040(ttr, 0x10, SUPER_READ), TtMatch::Hit);
    }

    #[test]
    fn first_enabled_match_wins() {
        let pair = [0x0000_C004, 0x0000_C000];
        assert_eq!(match_pair(pair, 0, USER_WRITE, false), TtMatch::WriteProtected);
        let pair = [0, 0x0000_C000];
        assert_eq!(match_pair(pair, 0, USER_WRITE, false), TtMatch::Hit);
    }

    #[test]
    fn mc68030_read_only_window_passes_writes_through() {
        // enabled, RW = read, RWM = 0, FC mask 7
        let tt = 0x0000_8207;
        assert_eq!(match_030(tt, 0x10, SUPER_READ), TtMatch::Hit);
        assert_eq!(match_030(tt, 0x10, USER_WRITE), TtMatch::Miss);
    }
}
