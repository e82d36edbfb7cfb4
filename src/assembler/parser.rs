/*!
  The textual form of programs. Each source line is an optional `:label`, an
  optional mnemonic with comma separated operands, and an optional comment
  introduced by `;`. This module leverages the `strum` derives of the opcode
  and register enums to deserialize mnemonics, and `nom` for the operand
  grammar.
*/

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::{tag_no_case, take_while, take_while1},
  character::complete::{char as one_char, digit1, hex_digit1, space0, space1},
  combinator::{all_consuming, map, map_res, opt, recognize},
  multi::separated_list1,
  sequence::{delimited, pair, preceded, separated_pair},
  IResult,
};
use string_cache::DefaultAtom;

use crate::address::Register;
use crate::bytecode::{BasicOp, Instruction, NonBasicOp, Word};

use super::AssemblyError;

/// A literal position in the source: either a number or a reference to a
/// label resolved during emission.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Expr {
  Number(Word),
  Label(DefaultAtom),
}

impl Display for Expr {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Expr::Number(value) => write!(f, "0x{:X}", value),
      Expr::Label(name)   => write!(f, "{}", name),
    }
  }
}

/// A source operand, mirroring the eleven addressing modes.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Operand {
  /// `A`
  Register(Register),
  /// `[A]`
  Indirect(Register),
  /// `[0x1000+I]`
  Indexed(Expr, Register),
  /// `POP`, reads `[SP]` and post-increments `SP`
  Pop,
  /// `PEEK`, reads `[SP]`
  Peek,
  /// `PUSH`, pre-decrements `SP` and names the new `[SP]`
  Push,
  Sp,
  Pc,
  O,
  /// `[0x1000]`
  Memory(Expr),
  /// `0x30`, or an identifier referring to a label
  Literal(Expr),
}

impl Display for Operand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Operand::Register(register)        => write!(f, "{}", register),
      Operand::Indirect(register)        => write!(f, "[{}]", register),
      Operand::Indexed(offset, register) => write!(f, "[{}+{}]", offset, register),
      Operand::Pop                       => write!(f, "POP"),
      Operand::Peek                      => write!(f, "PEEK"),
      Operand::Push                      => write!(f, "PUSH"),
      Operand::Sp                        => write!(f, "SP"),
      Operand::Pc                        => write!(f, "PC"),
      Operand::O                         => write!(f, "O"),
      Operand::Memory(address)           => write!(f, "[{}]", address),
      Operand::Literal(value)            => write!(f, "{}", value),
    }
  }
}

/// One parsed source line: an optional label definition and an optional
/// instruction. Blank and comment-only lines never reach this type.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Line {
  pub number      : u32,
  pub label       : Option<DefaultAtom>,
  pub instruction : Option<Instruction<Operand>>,
}

/// Parses a whole source text into lines, reporting the first syntax error
/// with its 1-based line number.
pub fn parse(text: &str) -> Result<Vec<Line>, AssemblyError> {
  let mut lines = Vec::new();

  for (index, raw) in text.lines().enumerate() {
    let number = index as u32 + 1;
    let source = match raw.find(';') {
      Some(at) => &raw[..at],
      None     => raw,
    };
    let source = source.trim();
    if source.is_empty() {
      continue;
    }
    lines.push(parse_line(number, source)?);
  }

  Ok(lines)
}

fn parse_line(number: u32, source: &str) -> Result<Line, AssemblyError> {
  let (label, rest) = match source.strip_prefix(':') {
    Some(tail) => match identifier(tail) {
      Ok((rest, name)) => (Some(DefaultAtom::from(name)), rest.trim_start()),
      Err(_)           => {
        return Err(AssemblyError::Syntax {
          line: number,
          message: "expected a label name after `:`".to_string(),
        });
      }
    },
    None => (None, source),
  };

  if rest.is_empty() {
    return Ok(Line { number, label, instruction: None });
  }

  let (mnemonic, operands) = match all_consuming(instruction_line)(rest) {
    Ok((_, parsed)) => parsed,
    Err(_)          => {
      return Err(AssemblyError::Syntax {
        line: number,
        message: format!("malformed instruction `{}`", rest),
      });
    }
  };

  let instruction = build_instruction(number, mnemonic, operands)?;
  Ok(Line { number, label, instruction: Some(instruction) })
}

/// Dispatches a mnemonic to its opcode, checking the operand count the
/// encoding demands.
fn build_instruction(
  line: u32,
  mnemonic: &str,
  mut operands: Vec<Operand>,
) -> Result<Instruction<Operand>, AssemblyError> {
  if let Ok(opcode) = BasicOp::from_str(mnemonic) {
    return match (operands.pop(), operands.pop(), operands.pop()) {
      (Some(b), Some(a), None) => Ok(Instruction::Basic { opcode, a, b }),
      _ => Err(AssemblyError::Syntax {
        line,
        message: format!("{} takes two operands", opcode),
      }),
    };
  }

  if let Ok(opcode) = NonBasicOp::from_str(mnemonic) {
    return match (operands.pop(), operands.pop()) {
      (Some(a), None) => Ok(Instruction::NonBasic { opcode, a }),
      _ => Err(AssemblyError::Syntax {
        line,
        message: format!("{} takes one operand", opcode),
      }),
    };
  }

  Err(AssemblyError::Syntax {
    line,
    message: format!("`{}` is not an instruction", mnemonic),
  })
}

// region Grammar

fn instruction_line(input: &str) -> IResult<&str, (&str, Vec<Operand>)> {
  pair(
    identifier,
    map(
      opt(preceded(
        space1,
        separated_list1(delimited(space0, one_char(','), space0), operand),
      )),
      Option::unwrap_or_default,
    ),
  )(input)
}

fn operand(input: &str) -> IResult<&str, Operand> {
  alt((
    bracketed,
    map(number, |value| Operand::Literal(Expr::Number(value))),
    map(identifier, classify),
  ))(input)
}

/// The `[...]` modes: `[register]`, `[expr+register]`, and `[expr]`.
fn bracketed(input: &str) -> IResult<&str, Operand> {
  delimited(
    pair(one_char('['), space0),
    alt((
      map(
        separated_pair(expr, delimited(space0, one_char('+'), space0), register),
        |(offset, register)| Operand::Indexed(offset, register),
      ),
      map(register, Operand::Indirect),
      map(expr, Operand::Memory),
    )),
    pair(space0, one_char(']')),
  )(input)
}

/// Sorts a bare identifier into the stack and special-cell keywords, the
/// register names, or a label reference.
fn classify(name: &str) -> Operand {
  match name.to_ascii_uppercase().as_str() {
    "POP"  => Operand::Pop,
    "PEEK" => Operand::Peek,
    "PUSH" => Operand::Push,
    "SP"   => Operand::Sp,
    "PC"   => Operand::Pc,
    "O"    => Operand::O,
    _      => match Register::from_str(name) {
      Ok(register) => Operand::Register(register),
      Err(_)       => Operand::Literal(Expr::Label(DefaultAtom::from(name))),
    },
  }
}

fn expr(input: &str) -> IResult<&str, Expr> {
  alt((
    map(number, Expr::Number),
    map(identifier, |name| Expr::Label(DefaultAtom::from(name))),
  ))(input)
}

fn register(input: &str) -> IResult<&str, Register> {
  map_res(identifier, Register::from_str)(input)
}

fn number(input: &str) -> IResult<&str, Word> {
  alt((
    map_res(preceded(tag_no_case("0x"), hex_digit1), |digits| {
      Word::from_str_radix(digits, 16)
    }),
    map_res(digit1, |digits: &str| digits.parse::<Word>()),
  ))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
  recognize(pair(
    take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
    take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
  ))(input)
}

// endregion


#[cfg(test)]
mod tests {
  use super::*;

  fn parse_one(source: &str) -> Line {
    let lines = parse(source).unwrap();
    assert_eq!(lines.len(), 1);
    lines.into_iter().next().unwrap()
  }

  fn operands_of(source: &str) -> (Operand, Operand) {
    match parse_one(source).instruction {
      Some(Instruction::Basic { a, b, .. }) => (a, b),
      other => panic!("expected a basic instruction, got {:?}", other),
    }
  }

  #[test]
  fn every_addressing_mode_parses() {
    assert_eq!(
      operands_of("SET A, [B]"),
      (Operand::Register(Register::A), Operand::Indirect(Register::B))
    );
    assert_eq!(
      operands_of("SET [0x1000+I], [0x1000]"),
      (
        Operand::Indexed(Expr::Number(0x1000), Register::I),
        Operand::Memory(Expr::Number(0x1000))
      )
    );
    assert_eq!(operands_of("SET POP, PEEK"), (Operand::Pop, Operand::Peek));
    assert_eq!(operands_of("SET PUSH, SP"), (Operand::Push, Operand::Sp));
    assert_eq!(operands_of("SET PC, O"), (Operand::Pc, Operand::O));
    assert_eq!(
      operands_of("SET 0x30, loop"),
      (
        Operand::Literal(Expr::Number(0x30)),
        Operand::Literal(Expr::Label(DefaultAtom::from("loop")))
      )
    );
  }

  #[test]
  fn decimal_numbers_parse() {
    assert_eq!(
      operands_of("SET A, 48").1,
      Operand::Literal(Expr::Number(48))
    );
  }

  #[test]
  fn mnemonics_and_registers_are_case_insensitive() {
    assert_eq!(
      operands_of("set a, [y]"),
      (Operand::Register(Register::A), Operand::Indirect(Register::Y))
    );
  }

  #[test]
  fn labels_attach_to_lines() {
    let line = parse_one(":loop SET I, 1");
    assert_eq!(line.label, Some(DefaultAtom::from("loop")));
    assert!(line.instruction.is_some());

    let bare = parse_one(":done");
    assert_eq!(bare.label, Some(DefaultAtom::from("done")));
    assert_eq!(bare.instruction, None);
  }

  #[test]
  fn comments_and_blank_lines_are_ignored() {
    let lines = parse("; a whole-line comment\n\nSET A, 1 ; trailing\n").unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].number, 3);
  }

  #[test]
  fn non_basic_instructions_take_one_operand() {
    let line = parse_one("JSR routine");
    assert_eq!(
      line.instruction,
      Some(Instruction::NonBasic {
        opcode: NonBasicOp::JSR,
        a: Operand::Literal(Expr::Label(DefaultAtom::from("routine"))),
      })
    );
  }

  #[test]
  fn unknown_mnemonics_are_reported_with_their_line() {
    let error = parse("SET A, 1\nBLT A, 1").unwrap_err();
    assert_eq!(
      error,
      AssemblyError::Syntax {
        line: 2,
        message: "`BLT` is not an instruction".to_string(),
      }
    );
  }

  #[test]
  fn wrong_operand_counts_are_reported() {
    assert_eq!(
      parse("SET A").unwrap_err(),
      AssemblyError::Syntax { line: 1, message: "SET takes two operands".to_string() }
    );
    assert_eq!(
      parse("JSR A, B").unwrap_err(),
      AssemblyError::Syntax { line: 1, message: "JSR takes one operand".to_string() }
    );
  }

  #[test]
  fn malformed_operands_are_reported() {
    assert!(matches!(
      parse("SET A, [0x1000").unwrap_err(),
      AssemblyError::Syntax { line: 1, .. }
    ));
    assert!(matches!(
      parse(":").unwrap_err(),
      AssemblyError::Syntax { line: 1, .. }
    ));
  }

  #[test]
  fn operands_display_in_parseable_form() {
    for source in ["SET A, [B]", "SET [0x1000+I], 0x30", "SET PUSH, loop", "JSR [0x20]"] {
      let line = parse_one(source);
      let printed = line.instruction.unwrap().to_string();
      assert_eq!(parse_one(&printed).instruction, parse_one(source).instruction);
    }
  }
}
