//! Register numbering and per-register type state.

use std::fmt;

use crate::dex::error::DexError;
use crate::types::TypeSignature;

/// Maps Dalvik registers to local variable slots.
///
/// Dalvik places the `ins` (receiver and arguments) in the highest registers, while the stack
/// machine expects them in the lowest slots. The top `ins` registers move down to slot zero and
/// everything below them moves up past the arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    registers: u16,
    ins: u16,
}

impl RegisterMap {
    pub fn new(registers: u16, ins: u16) -> Result<RegisterMap, DexError> {
        if ins > registers {
            untranslatable!("{} incoming registers exceed the frame of {}", ins, registers);
        }
        Ok(RegisterMap { registers, ins })
    }

    pub fn registers(&self) -> u16 {
        self.registers
    }

    pub fn ins(&self) -> u16 {
        self.ins
    }

    /// First register holding an incoming value
    pub fn first_in(&self) -> u16 {
        self.registers - self.ins
    }

    pub fn slot(&self, reg: u16) -> Result<u16, DexError> {
        if reg >= self.registers {
            untranslatable!("Register v{} is outside the frame of {}", reg, self.registers);
        }
        Ok(if reg >= self.first_in() { reg - self.first_in() } else { reg + self.ins })
    }
}

/// Handle to a set of placeholder instructions that get their final type together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Group(pub(crate) usize);

/// What the rewriter knows about the value in a register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterType {
    /// Never written, or written with conflicting types on different paths
    Unknown,
    Concrete(TypeSignature),
    /// A 32-bit value whose int/float/reference nature is still open
    Untyped32(Group),
    /// A 64-bit value whose long/double nature is still open
    Untyped64(Group),
}

impl RegisterType {
    pub fn is_wide(&self) -> bool {
        match self {
            RegisterType::Concrete(t) => t.is_wide(),
            RegisterType::Untyped64(_) => true,
            _ => false,
        }
    }

    pub fn group(&self) -> Option<Group> {
        match self {
            RegisterType::Untyped32(g) | RegisterType::Untyped64(g) => Some(*g),
            _ => None,
        }
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegisterType::Unknown => write!(f, "unknown"),
            RegisterType::Concrete(t) => write!(f, "{}", t),
            RegisterType::Untyped32(g) => write!(f, "untyped32#{}", g.0),
            RegisterType::Untyped64(g) => write!(f, "untyped64#{}", g.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ins_move_to_the_lowest_slots() {
        // 5 registers, 2 ins: v3, v4 are the ins
        let m = RegisterMap::new(5, 2).unwrap();
        assert_eq!(m.slot(3).unwrap(), 0);
        assert_eq!(m.slot(4).unwrap(), 1);
        assert_eq!(m.slot(0).unwrap(), 2);
        assert_eq!(m.slot(2).unwrap(), 4);
        assert!(m.slot(5).is_err());
    }

    #[test]
    fn all_registers_are_ins() {
        let m = RegisterMap::new(2, 2).unwrap();
        assert_eq!(m.slot(0).unwrap(), 0);
        assert_eq!(m.slot(1).unwrap(), 1);
        assert!(RegisterMap::new(1, 2).is_err());
    }
}
