//! LCG key tables shared by the ECD and EXF ciphers

/// One `state = state * multiplier + increment` step definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcgKey {
    pub multiplier: u32,
    pub increment: u32,
}

const fn key(multiplier: u32, increment: u32) -> LcgKey {
    LcgKey {
        multiplier,
        increment,
    }
}

/// ECD key table (from client dump)
pub const ECD_KEYS: [LcgKey; 6] = [
    key(0x4A4B522E, 0x00000001),
    key(0x00010DCD, 0x00000001),
    key(0x00010DCD, 0x00000001),
    key(0x00010DCD, 0x00000001),
    key(0x0019660D, 0x00000003),
    key(0x7D2B89DD, 0x00000001),
];

/// EXF key table, the first five ECD entries
pub const EXF_KEYS: [LcgKey; 5] = [
    key(0x4A4B522E, 0x00000001),
    key(0x00010DCD, 0x00000001),
    key(0x00010DCD, 0x00000001),
    key(0x00010DCD, 0x00000001),
    key(0x0019660D, 0x00000003),
];

/// Key index carried by every known asset of the client
pub const DEFAULT_KEY_INDEX: u16 = 4;

/// Looks up `index` in `table`, `None` when out of range
pub fn select(table: &[LcgKey], index: u16) -> Option<LcgKey> {
    table.get(index as usize).copied()
}

/// Linear congruential generator with u32 wraparound
#[derive(Debug, Clone)]
pub struct Lcg {
    key: LcgKey,
    state: u32,
}

impl Lcg {
    pub fn new(key: LcgKey, seed: u32) -> Self {
        Self { key, state: seed }
    }

    /// Advances the state and returns it
    #[inline]
    pub fn next_state(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(self.key.multiplier)
            .wrapping_add(self.key.increment);
        self.state
    }
}
