//! Observability trait for inspecting component state.
//!
//! Debuggers and tests look at CPU, MMU and scheduler state through dotted
//! query paths. Queries never affect emulation state.

use std::fmt;

/// A dynamically-typed value for state queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    String(String),
}

impl Value {
    /// Any integer value widened to 64 bits.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::U8(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::U64(v) => Some(v),
            Value::Bool(_) | Value::String(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            // registers print at their bus width
            Value::U8(v) => write!(f, "{v:#04X}"),
            Value::U16(v) => write!(f, "{v:#06X}"),
            Value::U32(v) => write!(f, "{v:#010X}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from!(bool => Bool, u8 => U8, u16 => U16, u32 => U32, u64 => U64, &str => String);

/// A component whose state can be inspected.
pub trait Observable {
    /// Query a specific property by path, e.g. `pc`, `flags.s`, `mmu.tcr`.
    ///
    /// Returns `None` if the path is not recognised.
    fn query(&self, path: &str) -> Option<Value>;

    /// List all available query paths.
    fn query_paths(&self) -> &'static [&'static str];

    /// Answer `path` if it names something under `prefix`, as in
    /// `cpu.mmu.tcr` for a component mounted at `cpu`.
    fn query_under(&self, prefix: &str, path: &str) -> Option<Value> {
        let rest = path.strip_prefix(prefix)?.strip_prefix('.')?;
        self.query(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::{Observable, Value};

    struct Pc(u32);

    impl Observable for Pc {
        fn query(&self, path: &str) -> Option<Value> {
            (path == "pc").then(|| self.0.into())
        }

        fn query_paths(&self) -> &'static [&'static str] {
            &["pc"]
        }
    }

    #[test]
    fn hex_formats_are_width_padded() {
        assert_eq!(Value::U8(0x7).to_string(), "0x07");
        assert_eq!(Value::U16(0x2700).to_string(), "0x2700");
        assert_eq!(Value::U32(0x1000).to_string(), "0x00001000");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from("M68040").to_string(), "M68040");
    }

    #[test]
    fn integers_widen() {
        assert_eq!(Value::from(0x2700u16).as_u64(), Some(0x2700));
        assert_eq!(Value::from(false).as_u64(), None);
    }

    #[test]
    fn mounted_component_answers_its_prefix_only() {
        let cpu = Pc(0x0100_0100);
        assert_eq!(cpu.query_under("cpu", "cpu.pc"), Some(Value::U32(0x0100_0100)));
        assert_eq!(cpu.query_under("cpu", "cpupc"), None);
        assert_eq!(cpu.query_under("cpu", "fpu.pc"), None);
    }
}
