/*!
  The execution engine. An `Emulator` owns one architectural store and
  advances it one logical instruction per `step`: fetch the opcode word,
  resolve the operands in encoding order (with their `PC` and `SP` side
  effects), then apply the opcode's semantics or burn the instruction if the
  skip latch was armed.
*/

use std::fmt::{Display, Formatter};

use lazy_static::lazy_static;
use prettytable::{format as TableFormat, row, table, Table};
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::address::{Address, Register};
use crate::bytecode::{self, BasicOp, Instruction, NonBasicOp, Word};
use crate::memory::{Memory, RAM_SIZE};

/// An error surfaced by `step`. Data never fails: arithmetic wraps, division
/// by zero is defined, and RAM addressing is total over the word domain.
/// Only instruction words with a reserved opcode are refused.
#[derive(Error, Clone, Copy, Eq, PartialEq, Debug)]
pub enum ExecutionError {
  #[error("illegal instruction 0x{word:04X} at 0x{pc:04X}")]
  IllegalInstruction { word: Word, pc: Word },
}

/// A resolved operand: either a cell the opcode may read and write, or a
/// read-only literal. Stores to a literal are defined no-ops, not errors.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Value {
  Target(Address),
  Literal(Word),
}

pub struct Emulator {
  memory: Memory,
}

impl Emulator {

  // region Low-level utility methods

  pub fn new() -> Emulator {
    Emulator { memory: Memory::new() }
  }

  /// The backing store, for inspection by hosts.
  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn memory_mut(&mut self) -> &mut Memory {
    &mut self.memory
  }

  /// Writes `words[i]` to `Ram(i)`, leaving the rest of RAM untouched.
  pub fn load_program(&mut self, words: &[Word]) {
    assert!(words.len() <= RAM_SIZE, "program exceeds the RAM word space");
    for (i, word) in words.iter().enumerate() {
      self.memory.store(Address::Ram(i as Word), *word);
    }
  }

  /// Reads the word at `PC`, then advances `PC` past it.
  fn fetch(&mut self) -> Word {
    let pc = self.memory.load(Address::Pc);
    self.memory.store(Address::Pc, pc.wrapping_add(1));
    self.memory.load(Address::Ram(pc))
  }

  // endregion

  // region Operand resolution

  /**
    Resolves a six bit operand field code into a cell or a literal, carrying
    the mode's side effects: the `[nextword + register]`, `[nextword]`, and
    `nextword` modes fetch an extra word (advancing `PC`), and `POP`/`PUSH`
    move `SP`. Callers must resolve operands in encoding order so those side
    effects land in the order the encoding implies.
  */
  fn resolve(&mut self, code: Word) -> Value {
    match code {

      0x00..=0x07 => Value::Target(Address::Register(Register::from_field(code))),

      0x08..=0x0F => {
        let base = self.memory.load(Address::Register(Register::from_field(code)));
        Value::Target(Address::Ram(base))
      }

      0x10..=0x17 => {
        let next = self.fetch();
        let base = self.memory.load(Address::Register(Register::from_field(code)));
        Value::Target(Address::Ram(next.wrapping_add(base)))
      }

      // POP: the cell at `SP`, post-incrementing `SP`.
      0x18 => {
        let sp = self.memory.load(Address::Sp);
        self.memory.store(Address::Sp, sp.wrapping_add(1));
        Value::Target(Address::Ram(sp))
      }

      // PEEK: the cell at `SP`, no mutation.
      0x19 => Value::Target(Address::Ram(self.memory.load(Address::Sp))),

      // PUSH: pre-decrement `SP`, then the cell at the new `SP`.
      0x1A => {
        let sp = self.memory.load(Address::Sp).wrapping_sub(1);
        self.memory.store(Address::Sp, sp);
        Value::Target(Address::Ram(sp))
      }

      0x1B => Value::Target(Address::Sp),
      0x1C => Value::Target(Address::Pc),
      0x1D => Value::Target(Address::O),

      0x1E => {
        let next = self.fetch();
        Value::Target(Address::Ram(next))
      }

      0x1F => {
        let next = self.fetch();
        Value::Literal(next)
      }

      0x20..=0x3F => Value::Literal(code - 0x20),

      _ => unreachable!("operand field codes are six bits"),
    }
  }

  fn read(&self, value: &Value) -> Word {
    match value {
      Value::Target(address) => self.memory.load(*address),
      Value::Literal(word)   => *word,
    }
  }

  /// Stores through a resolved operand. A literal destination swallows the
  /// write.
  fn write(&mut self, value: &Value, word: Word) {
    match value {
      Value::Target(address) => self.memory.store(*address, word),
      Value::Literal(_)      => {}
    }
  }

  // endregion

  // region Instruction execution

  /**
    Advances the machine by one logical instruction.

    Operands are resolved even when the skip latch is set, so a skipped
    instruction still consumes its extra words and leaves `PC` at the
    following instruction. The latch only suppresses the opcode's semantics
    and is cleared afterward; in particular a skipped conditional never arms
    the latch for the instruction after it.
  */
  pub fn step(&mut self) -> Result<(), ExecutionError> {
    let skipping = self.memory.load(Address::Skip) != 0;
    let pc = self.memory.load(Address::Pc);
    let word = self.fetch();

    let instruction = match bytecode::try_decode(word) {
      Some(instruction) => instruction,
      None              => return Err(ExecutionError::IllegalInstruction { word, pc }),
    };

    #[cfg(feature = "trace_execution")]
    println!(
      "0x{:04X}: {:?}{}",
      pc,
      instruction,
      match skipping { true => "  (skipped)", false => "" }
    );

    match instruction {

      Instruction::Basic { opcode, a, b } => {
        let a = self.resolve(a);
        let b = self.resolve(b);
        match skipping {
          true  => self.memory.store(Address::Skip, 0),
          false => self.execute_basic(opcode, a, b),
        }
      }

      Instruction::NonBasic { opcode, a } => {
        let a = self.resolve(a);
        match skipping {
          true  => self.memory.store(Address::Skip, 0),
          false => self.execute_non_basic(opcode, a),
        }
      }

    }

    Ok(())
  }

  /// Steps until `limit` instructions have run, stopping early on error.
  pub fn run(&mut self, limit: usize) -> Result<(), ExecutionError> {
    for _ in 0..limit {
      self.step()?;
    }
    Ok(())
  }

  fn execute_basic(&mut self, opcode: BasicOp, a: Value, b: Value) {
    let x = self.read(&a);
    let y = self.read(&b);

    match opcode {

      BasicOp::SET => {
        self.write(&a, y);
      }

      BasicOp::ADD => {
        let sum = x as u32 + y as u32;
        self.write(&a, sum as Word);
        self.memory.store(Address::O, (sum >> 16) as Word);
      }

      BasicOp::SUB => {
        self.write(&a, x.wrapping_sub(y));
        self.memory.store(Address::O, match x < y { true => 0xFFFF, false => 0 });
      }

      BasicOp::MUL => {
        let product = x as u32 * y as u32;
        self.write(&a, product as Word);
        self.memory.store(Address::O, (product >> 16) as Word);
      }

      BasicOp::DIV => match y {
        0 => {
          self.write(&a, 0);
          self.memory.store(Address::O, 0);
        }
        _ => {
          self.write(&a, x / y);
          self.memory.store(Address::O, (((x as u32) << 16) / y as u32) as Word);
        }
      },

      BasicOp::MOD => {
        self.write(&a, match y { 0 => 0, _ => x % y });
      }

      // Shift intermediates are widened to 64 bits; counts at or beyond the
      // intermediate width yield zero for both the result and `O`.
      BasicOp::SHL => {
        let wide = (x as u64).checked_shl(y as u32).unwrap_or(0);
        self.write(&a, wide as Word);
        self.memory.store(Address::O, (wide >> 16) as Word);
      }

      BasicOp::SHR => {
        self.write(&a, (x as u64).checked_shr(y as u32).unwrap_or(0) as Word);
        let overflow = ((x as u64) << 16).checked_shr(y as u32).unwrap_or(0);
        self.memory.store(Address::O, overflow as Word);
      }

      BasicOp::AND => {
        self.write(&a, x & y);
      }

      BasicOp::BOR => {
        self.write(&a, x | y);
      }

      BasicOp::XOR => {
        self.write(&a, x ^ y);
      }

      // Conditionals do not branch; they arm the skip latch for the next
      // step.
      BasicOp::IFE => {
        self.set_skip(x != y);
      }

      BasicOp::IFN => {
        self.set_skip(x == y);
      }

      BasicOp::IFG => {
        self.set_skip(x <= y);
      }

      BasicOp::IFB => {
        self.set_skip((x & y) == 0);
      }

    }
  }

  fn set_skip(&mut self, skip: bool) {
    self.memory.store(Address::Skip, skip as Word);
  }

  /// `JSR a`: pushes the address of the following instruction, then jumps
  /// to `a`. The push uses the same pre-decrement semantics as the `PUSH`
  /// operand mode.
  fn execute_non_basic(&mut self, opcode: NonBasicOp, a: Value) {
    match opcode {
      NonBasicOp::JSR => {
        let target = self.read(&a);
        let sp = self.memory.load(Address::Sp).wrapping_sub(1);
        self.memory.store(Address::Sp, sp);
        self.memory.store(Address::Ram(sp), self.memory.load(Address::Pc));
        self.memory.store(Address::Pc, target);
      }
    }
  }

  // endregion

}

impl Default for Emulator {
  fn default() -> Self {
    Self::new()
  }
}


lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Emulator {
  fn make_cell_table(&self, cells: &[Address]) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Cell", ubl->"Contents"]);

    for address in cells {
      table.add_row(
        row![r->format!("{} =", address), format!("0x{:04X}", self.memory.load(*address))]
      );
    }
    table
  }
}

impl Display for Emulator {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let registers: Vec<Address> = Register::iter().map(Address::Register).collect();
    let specials = [Address::Pc, Address::Sp, Address::O, Address::Skip, Address::Cycles];

    let register_table = self.make_cell_table(&registers);
    let machine_table  = self.make_cell_table(&specials);

    let mut combined_table = table!([register_table, machine_table]);
    combined_table.set_titles(row![ub->"Registers", ub->"Machine"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    write!(f, "{}", combined_table)
  }
}
