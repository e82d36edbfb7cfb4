/*!

  The DCPU-16 uses a 16 bit word size. An instruction is one to three words
  long: one opcode word followed by up to one extra word per operand, laid out
  in operand order. The opcode word is built from little-endian bit fields:

    bits  0..3   basic opcode (0 means the instruction is non-basic)
    bits  4..9   operand a    (or the non-basic opcode)
    bits 10..15  operand b    (or the non-basic operand a)

  The decoder is a pure function over a single word. It produces the six bit
  operand field codes without consuming the extra words those operands may
  name; fetching extra words belongs to the executor, which is what keeps
  skipped instructions consuming the right number of words.

  Serialized programs are the raw word stream in big-endian byte order, with
  no header and no relocation or symbol information.

*/

mod instruction;

pub use instruction::{
  extra_words, try_decode, BasicOp, Instruction, NonBasicOp, FIELD_MASK, OPCODE_MASK,
  OPERAND_A_SHIFT, OPERAND_B_SHIFT,
};

// If you change this you must also change the decoder and the assembler's
// word emitter.
pub type Word = u16;
