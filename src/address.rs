/*!

  A selector type that knows which architectural cell it names: one of the
  special cells (`PC`, `SP`, the overflow register `O`, the skip latch, the
  reserved cycle counter), a general register, or a RAM word. A flat indexing
  function maps every selector into one contiguous backing store, which is
  what lets the execution engine treat a resolved operand uniformly as "an
  address it can read or write".

  If the layout is ever rearranged, only `idx` in this file has to change;
  the tagged form is the whole external interface.

*/

use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

use crate::bytecode::Word;

/// The eight general registers, in their three bit field encoding order.
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,           Hash
)]
#[strum(ascii_case_insensitive)]
#[repr(u16)]
pub enum Register {
  A,
  B,
  C,
  X,
  Y,
  Z,
  I,
  J,
}

impl Register {
  /// Decodes a three bit register field.
  pub fn from_field(bits: Word) -> Register {
    match Register::try_from(bits & 0x7) {
      Ok(register) => register,
      Err(_)       => unreachable!("a three bit field always names a register"),
    }
  }

  /// The register's value in the three bit field encoding.
  pub fn code(&self) -> Word {
    (*self).into()
  }
}

/// RAM words sit above the special cells and registers in the flat layout.
pub const RAM_BASE: usize = 16;

/// Names one architectural cell.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Address {
  /// Program counter: address of the next instruction word.
  Pc,
  /// Stack pointer. The stack grows toward lower addresses.
  Sp,
  /// Overflow register, written by the arithmetic opcodes.
  O,
  /// One-bit latch armed by the conditional opcodes to suppress execution
  /// (but not operand consumption) of the following instruction.
  Skip,
  /// Reserved for cycle accounting; never written by the engine.
  Cycles,
  Register(Register),
  Ram(Word),
}

impl Address {
  /// Converts the selector to an index into the flat backing store.
  pub fn idx(&self) -> usize {
    match self {
      Address::Pc                 => 0,
      Address::Sp                 => 1,
      Address::O                  => 2,
      Address::Skip               => 3,
      Address::Cycles             => 4,
      Address::Register(register) => 8 + register.code() as usize,
      Address::Ram(word)          => RAM_BASE + *word as usize,
    }
  }
}

impl Display for Address {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Address::Pc                 => write!(f, "PC"),
      Address::Sp                 => write!(f, "SP"),
      Address::O                  => write!(f, "O"),
      Address::Skip               => write!(f, "SKIP"),
      Address::Cycles             => write!(f, "CYCLES"),
      Address::Register(register) => write!(f, "{}", register),
      Address::Ram(word)          => write!(f, "RAM[0x{:04X}]", word),
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn registers_follow_the_field_encoding() {
    assert_eq!(Register::A.code(), 0);
    assert_eq!(Register::J.code(), 7);
    assert_eq!(Register::from_field(0x3), Register::X);
  }

  #[test]
  fn register_names_parse_case_insensitively() {
    assert_eq!("A".parse(), Ok(Register::A));
    assert_eq!("y".parse(), Ok(Register::Y));
    assert!("Q".parse::<Register>().is_err());
  }

  #[test]
  fn flat_indices_are_disjoint() {
    assert_eq!(Address::Pc.idx(), 0);
    assert_eq!(Address::Sp.idx(), 1);
    assert_eq!(Address::O.idx(), 2);
    assert_eq!(Address::Skip.idx(), 3);
    assert_eq!(Address::Cycles.idx(), 4);
    assert_eq!(Address::Register(Register::A).idx(), 8);
    assert_eq!(Address::Register(Register::J).idx(), 15);
    assert_eq!(Address::Ram(0).idx(), RAM_BASE);
    assert_eq!(Address::Ram(0xFFFF).idx(), RAM_BASE + 0xFFFF);
  }

  #[test]
  fn display_forms() {
    assert_eq!(Address::Register(Register::I).to_string(), "I");
    assert_eq!(Address::Ram(0x1000).to_string(), "RAM[0x1000]");
    assert_eq!(Address::Skip.to_string(), "SKIP");
  }
}
