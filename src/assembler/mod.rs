/*!

  The assembler front end: source text goes in, a big-endian word stream
  comes out. The pipeline is staged:

  ```
  text -> [`parse`] -> `Line`s -> [`calculate_labels`] -> `LabelTable` ->⋯

  ⋯-> [`emit`] -> words -> [`to_bytes`] -> big-endian bytes
  ```

  Label offsets can be computed before any label is resolved because every
  operand's encoded length is known from its shape alone: numeric literals
  below 0x20 embed in the opcode word, and label references always take the
  `nextword` form so that layout never depends on a label's eventual value.

*/

pub mod parser;

use std::collections::HashMap;

use string_cache::DefaultAtom;
use thiserror::Error;

use crate::bytecode::{Instruction, Word, OPERAND_A_SHIFT, OPERAND_B_SHIFT};
use crate::memory::RAM_SIZE;

pub use parser::{parse, Expr, Line, Operand};

#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum AssemblyError {
  #[error("line {line}: {message}")]
  Syntax { line: u32, message: String },

  #[error("line {line}: unknown label `{name}`")]
  UnknownLabel { line: u32, name: DefaultAtom },

  #[error("line {line}: duplicate label `{name}`")]
  DuplicateLabel { line: u32, name: DefaultAtom },

  #[error("program is {words} words, which does not fit in the 0x10000 word address space")]
  TooLarge { words: usize },
}

/// Symbol table mapping label names to word offsets.
#[derive(Clone, Debug, Default)]
pub struct LabelTable {
  map: HashMap<DefaultAtom, Word>,
}

impl LabelTable {
  pub fn offset_of(&self, name: &DefaultAtom) -> Option<Word> {
    self.map.get(name).copied()
  }

  fn insert(&mut self, line: u32, name: DefaultAtom, offset: Word) -> Result<(), AssemblyError> {
    match self.map.contains_key(&name) {
      true  => Err(AssemblyError::DuplicateLabel { line, name }),
      false => {
        self.map.insert(name, offset);
        Ok(())
      }
    }
  }
}

impl Operand {
  /// Number of extra words this operand appends to the opcode word.
  pub fn extra_words(&self) -> Word {
    match self {
      Operand::Indexed(..) | Operand::Memory(_)      => 1,
      Operand::Literal(Expr::Number(n)) if *n < 0x20 => 0,
      Operand::Literal(_)                            => 1,
      _                                              => 0,
    }
  }

  /// Encodes to the six bit field code plus the extra word, if any.
  fn encode(&self, line: u32, labels: &LabelTable) -> Result<(Word, Option<Word>), AssemblyError> {
    let encoded = match self {
      Operand::Register(register)        => (register.code(), None),
      Operand::Indirect(register)        => (0x08 + register.code(), None),
      Operand::Indexed(offset, register) => (0x10 + register.code(), Some(eval(offset, line, labels)?)),
      Operand::Pop                       => (0x18, None),
      Operand::Peek                      => (0x19, None),
      Operand::Push                      => (0x1A, None),
      Operand::Sp                        => (0x1B, None),
      Operand::Pc                        => (0x1C, None),
      Operand::O                         => (0x1D, None),
      Operand::Memory(address)           => (0x1E, Some(eval(address, line, labels)?)),
      Operand::Literal(Expr::Number(n)) if *n < 0x20 => (0x20 + *n, None),
      Operand::Literal(value)            => (0x1F, Some(eval(value, line, labels)?)),
    };
    Ok(encoded)
  }
}

fn eval(expr: &Expr, line: u32, labels: &LabelTable) -> Result<Word, AssemblyError> {
  match expr {
    Expr::Number(value) => Ok(*value),
    Expr::Label(name)   => labels
      .offset_of(name)
      .ok_or_else(|| AssemblyError::UnknownLabel { line, name: name.clone() }),
  }
}

/// Encoded length of an instruction in words, extra words included.
pub fn size_in_words(instruction: &Instruction<Operand>) -> Word {
  match instruction {
    Instruction::Basic { a, b, .. } => 1 + a.extra_words() + b.extra_words(),
    Instruction::NonBasic { a, .. } => 1 + a.extra_words(),
  }
}

/// Computes the word offset of every label by summing encoded instruction
/// lengths, and rejects sources that overflow the word address space.
pub fn calculate_labels(lines: &[Line]) -> Result<LabelTable, AssemblyError> {
  let mut labels = LabelTable::default();
  let mut offset: usize = 0;

  for line in lines {
    if let Some(name) = &line.label {
      match Word::try_from(offset) {
        Ok(offset) => labels.insert(line.number, name.clone(), offset)?,
        Err(_)     => return Err(AssemblyError::TooLarge { words: offset }),
      }
    }
    if let Some(instruction) = &line.instruction {
      offset += size_in_words(instruction) as usize;
    }
  }

  match offset > RAM_SIZE {
    true  => Err(AssemblyError::TooLarge { words: offset }),
    false => Ok(labels),
  }
}

/// Encodes one instruction into its word sequence: the opcode word first,
/// then the extra words in operand order.
pub fn encode_instruction(
  instruction: &Instruction<Operand>,
  line: u32,
  labels: &LabelTable,
) -> Result<Vec<Word>, AssemblyError> {
  match instruction {

    Instruction::Basic { opcode, a, b } => {
      let (code_a, extra_a) = a.encode(line, labels)?;
      let (code_b, extra_b) = b.encode(line, labels)?;
      let mut words =
        vec![opcode.code() | (code_a << OPERAND_A_SHIFT) | (code_b << OPERAND_B_SHIFT)];
      words.extend(extra_a);
      words.extend(extra_b);
      Ok(words)
    }

    Instruction::NonBasic { opcode, a } => {
      let (code_a, extra_a) = a.encode(line, labels)?;
      let mut words = vec![(opcode.code() << OPERAND_A_SHIFT) | (code_a << OPERAND_B_SHIFT)];
      words.extend(extra_a);
      Ok(words)
    }

  }
}

/// Emits the word stream, resolving label references to absolute addresses.
pub fn emit(labels: &LabelTable, lines: &[Line]) -> Result<Vec<Word>, AssemblyError> {
  let mut words = Vec::new();
  for line in lines {
    if let Some(instruction) = &line.instruction {
      words.append(&mut encode_instruction(instruction, line.number, labels)?);
    }
  }
  Ok(words)
}

/// Parses, lays out, and encodes a whole source text.
pub fn assemble(text: &str) -> Result<Vec<Word>, AssemblyError> {
  let lines = parser::parse(text)?;
  let labels = calculate_labels(&lines)?;
  emit(&labels, &lines)
}

/// Serializes the word stream in big-endian byte order, the program's
/// on-disk form. There is no header: the loader writes word `i` to RAM
/// address `i`.
pub fn to_bytes(words: &[Word]) -> Vec<u8> {
  let mut bytes = Vec::with_capacity(words.len() * 2);
  for word in words {
    bytes.extend_from_slice(&word.to_be_bytes());
  }
  bytes
}

/// Renders an aligned listing of the assembled program: word offset, encoded
/// words, and the source form, with label definitions on their own lines.
pub fn listing(lines: &[Line], labels: &LabelTable) -> Result<String, AssemblyError> {
  let mut buffer = String::new();
  let mut offset: Word = 0;

  for line in lines {
    if let Some(name) = &line.label {
      buffer.push_str(format!(":{}\n", name).as_str());
    }
    if let Some(instruction) = &line.instruction {
      let words = encode_instruction(instruction, line.number, labels)?;
      let encoded = words
        .iter()
        .map(|word| format!("{:04X}", word))
        .collect::<Vec<String>>()
        .join(" ");
      buffer.push_str(
        format!("0x{:04X}  {:15} {}\n", offset, encoded, instruction).as_str()
      );
      offset = offset.wrapping_add(words.len() as Word);
    }
  }

  Ok(buffer)
}


#[cfg(test)]
mod tests {
  use super::*;

  use strum::IntoEnumIterator;

  use crate::address::Register;
  use crate::bytecode::{BasicOp, NonBasicOp};

  #[test]
  fn the_reference_program_assembles() {
    let words = assemble("SET A, 0x30\nSET [0x1000], 0x20").unwrap();
    assert_eq!(words, vec![0x7C01, 0x0030, 0x7DE1, 0x1000, 0x0020]);
  }

  #[test]
  fn small_literals_embed_in_the_opcode_word() {
    assert_eq!(assemble("ADD A, 1").unwrap(), vec![0x8402]);
    // 0x20 is the first value that no longer fits the embedded form.
    assert_eq!(assemble("ADD A, 0x20").unwrap(), vec![0x7C02, 0x0020]);
  }

  #[test]
  fn forward_references_resolve() {
    let words = assemble("SET PC, end\nSET A, 1\n:end").unwrap();
    assert_eq!(words, vec![0x7DC1, 0x0003, 0x8401]);
  }

  #[test]
  fn backward_references_resolve() {
    let words = assemble(":loop ADD I, 1\nSET PC, loop").unwrap();
    assert_eq!(words, vec![0x8462, 0x7DC1, 0x0000]);
  }

  #[test]
  fn labels_always_take_the_long_form() {
    // Even a label whose value would fit the embedded form costs an extra
    // word, so layout never depends on label values.
    let words = assemble(":start SET A, start").unwrap();
    assert_eq!(words, vec![0x7C01, 0x0000]);
  }

  #[test]
  fn jsr_encodes_in_the_non_basic_form() {
    assert_eq!(assemble("JSR 0x100").unwrap(), vec![0x7C10, 0x0100]);
    assert_eq!(assemble("JSR A").unwrap(), vec![0x0010]);
  }

  #[test]
  fn two_labels_may_share_an_offset() {
    let words = assemble(":first\n:second\nSET A, first\nSET B, second").unwrap();
    assert_eq!(words, vec![0x7C01, 0x0000, 0x7C11, 0x0000]);
  }

  #[test]
  fn unknown_labels_are_reported() {
    assert_eq!(
      assemble("SET PC, nowhere").unwrap_err(),
      AssemblyError::UnknownLabel {
        line: 1,
        name: string_cache::DefaultAtom::from("nowhere"),
      }
    );
  }

  #[test]
  fn duplicate_labels_are_reported() {
    assert_eq!(
      assemble(":here SET A, 1\n:here SET B, 1").unwrap_err(),
      AssemblyError::DuplicateLabel {
        line: 2,
        name: string_cache::DefaultAtom::from("here"),
      }
    );
  }

  #[test]
  fn byte_output_is_big_endian() {
    assert_eq!(to_bytes(&[0x7C01, 0x0030]), vec![0x7C, 0x01, 0x00, 0x30]);
  }

  #[test]
  fn listings_carry_offsets_words_and_source() {
    let lines = parse("JSR sub\n:sub SET A, 1").unwrap();
    let labels = calculate_labels(&lines).unwrap();
    let rendered = listing(&lines, &labels).unwrap();
    assert_eq!(
      rendered,
      "0x0000  7C10 0002       JSR sub\n\
       :sub\n\
       0x0002  8401            SET A, 0x1\n"
    );
  }

  /// For every mnemonic and every addressing mode, the printed form of an
  /// instruction assembles back to its direct encoding.
  #[test]
  fn pretty_round_trip() {
    let modes = [
      Operand::Register(Register::A),
      Operand::Indirect(Register::B),
      Operand::Indexed(Expr::Number(0x1000), Register::I),
      Operand::Pop,
      Operand::Peek,
      Operand::Push,
      Operand::Sp,
      Operand::Pc,
      Operand::O,
      Operand::Memory(Expr::Number(0x2000)),
      Operand::Literal(Expr::Number(0x5)),
      Operand::Literal(Expr::Number(0x1234)),
    ];

    let mut instructions: Vec<Instruction<Operand>> = Vec::new();
    for (i, opcode) in BasicOp::iter().enumerate() {
      for (j, a) in modes.iter().enumerate() {
        let b = modes[(i + j + 1) % modes.len()].clone();
        instructions.push(Instruction::Basic { opcode, a: a.clone(), b });
      }
    }
    for a in &modes {
      instructions.push(Instruction::NonBasic { opcode: NonBasicOp::JSR, a: a.clone() });
    }

    let labels = LabelTable::default();
    for instruction in instructions {
      let text = instruction.to_string();
      let direct = encode_instruction(&instruction, 1, &labels).unwrap();
      assert_eq!(assemble(&text).unwrap(), direct, "{}", text);
    }
  }
}
