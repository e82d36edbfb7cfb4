/*!
  Representation of processor instructions abstractly and as encoded words.
*/

use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

use super::Word;

pub const OPCODE_MASK     : Word = 0xF;
pub const OPERAND_A_SHIFT : Word = 4;
pub const OPERAND_B_SHIFT : Word = 10;
pub const FIELD_MASK      : Word = 0x3F;

/// Two-operand opcodes, carried in the low nibble of the opcode word. The
/// nibble value 0 is not an opcode; it marks the non-basic form.
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,           Hash
)]
#[strum(ascii_case_insensitive)]
#[repr(u16)]
pub enum BasicOp {
  SET = 0x1, // a = b
  ADD,       // a = a + b, O catches the carry
  SUB,       // a = a - b, O flags the borrow
  MUL,       // a = a * b, O holds the high word
  DIV,       // a = a / b, zero divisor defined as zero
  MOD,       // a = a % b, zero divisor defined as zero
  SHL,       // a = a << b
  SHR,       // a = a >> b
  AND,       // a = a & b
  BOR,       // a = a | b
  XOR,       // a = a ^ b
  IFE,       // skip next instruction unless a == b
  IFN,       // skip next instruction unless a != b
  IFG,       // skip next instruction unless a > b
  IFB,       // skip next instruction unless a & b != 0
}

impl BasicOp {
  /// The nibble value carried in bits 0..3 of the opcode word.
  pub fn code(&self) -> Word {
    (*self).into()
  }
}

/// One-operand opcodes, carried in bits 4..9 of an opcode word whose low
/// nibble is zero. Every code other than `JSR` is reserved.
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq,        Debug,        Hash
)]
#[strum(ascii_case_insensitive)]
#[repr(u16)]
pub enum NonBasicOp {
  JSR = 0x01, // push the return address, jump to a
}

impl NonBasicOp {
  pub fn code(&self) -> Word {
    (*self).into()
  }
}

/**
  Holds the unencoded components of an instruction, generic over the operand
  representation: the decoder produces six bit operand field codes, while the
  assembler works with symbolic operands that still carry label references.
*/
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Instruction<T> {
  Basic {
    opcode :  BasicOp,
    a      :  T,
    b      :  T,
  },
  NonBasic {
    opcode :  NonBasicOp,
    a      :  T,
  },
}

impl<T: Display> Display for Instruction<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      Instruction::Basic { opcode, a, b } => write!(f, "{} {}, {}", opcode, a, b),

      Instruction::NonBasic { opcode, a } => write!(f, "{} {}", opcode, a),

    }
  }
}

impl Instruction<Word> {
  /// Total length in words of the encoded instruction, extra words included.
  pub fn size(&self) -> Word {
    match self {
      Instruction::Basic { a, b, .. } => 1 + extra_words(*a) + extra_words(*b),
      Instruction::NonBasic { a, .. } => 1 + extra_words(*a),
    }
  }
}

/// Number of extra words the given operand field code consumes from the
/// instruction stream: one for the `[nextword + register]`, `[nextword]`,
/// and `nextword` modes, zero for everything else.
pub fn extra_words(code: Word) -> Word {
  match code {
    0x10..=0x17 | 0x1E | 0x1F => 1,
    _                         => 0,
  }
}

/**
  Decodes one opcode word into an instruction over six bit operand field
  codes. Reserved non-basic opcodes decode to `None`; the executor reports
  them against the `PC` the word was fetched from.

  Note that this function does not fetch extra words. The executor resolves
  the returned field codes in encoding order and consumes `nextword`s itself.
*/
pub fn try_decode(word: Word) -> Option<Instruction<Word>> {
  let field_a = (word >> OPERAND_A_SHIFT) & FIELD_MASK;
  let field_b = (word >> OPERAND_B_SHIFT) & FIELD_MASK;

  match word & OPCODE_MASK {

    0 => match NonBasicOp::try_from(field_a) {
      Ok(opcode) => Some(Instruction::NonBasic { opcode, a: field_b }),
      Err(_)     => None,
    },

    nibble => match BasicOp::try_from(nibble) {
      Ok(opcode) => Some(Instruction::Basic { opcode, a: field_a, b: field_b }),
      Err(_)     => None,
    },

  }
}
