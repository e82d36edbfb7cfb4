/*!
  Command line front end: assembles a DCPU-16 source file into `a.out` as a
  big-endian word stream, optionally printing the listing and executing the
  assembled image.
*/

#![allow(dead_code)]

mod address;
mod assembler;
mod bytecode;
mod emulator;
mod memory;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};

use crate::assembler::{LabelTable, Line};
use crate::bytecode::Word;
use crate::emulator::Emulator;

#[derive(Parser, Debug)]
#[command(name = "dcpu16")]
#[command(about = "Assembler and emulator for the DCPU-16", long_about = None)]
struct Args {
  /// Assembly source file
  source: PathBuf,

  /// Print the assembled listing
  #[arg(long, action = ArgAction::SetTrue)]
  listing: bool,

  /// Execute the assembled program for up to STEPS instructions, then dump
  /// the machine state
  #[arg(long, value_name = "STEPS")]
  run: Option<usize>,
}

fn assemble_stages(text: &str) -> Result<(Vec<Line>, LabelTable, Vec<Word>)> {
  let lines = assembler::parse(text)?;
  let labels = assembler::calculate_labels(&lines)?;
  let words = assembler::emit(&labels, &lines)?;
  Ok((lines, labels, words))
}

fn main() -> Result<()> {
  let args = Args::parse();

  let text = fs::read_to_string(&args.source)
    .with_context(|| format!("could not read {}", args.source.display()))?;

  let (lines, labels, words) = assemble_stages(&text)
    .with_context(|| format!("could not assemble {}", args.source.display()))?;

  fs::write("a.out", assembler::to_bytes(&words)).context("could not write a.out")?;

  if args.listing {
    print!("{}", assembler::listing(&lines, &labels)?);
  }

  if let Some(limit) = args.run {
    let mut machine = Emulator::new();
    machine.load_program(&words);
    let outcome = machine.run(limit);
    println!("{}", machine);
    outcome?;
  }

  Ok(())
}
