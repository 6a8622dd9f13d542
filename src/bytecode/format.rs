//! Binary encoding of executables.
//!
//! Each instruction is one opcode byte followed by its operands. Integers are
//! 4-byte big-endian two's complement, addresses are `base` then `offset`,
//! and strings are a length byte followed by UTF-8. A `DATA` marker consumes
//! 4-byte values up to the end of the stream.

use super::executable::Executable;
use super::format_error::{FormatError, Segment};
use super::instruction::{Address, Instruction};
use super::op::{BinaryOp, OpCode};

// =============================================================================
// Encoding
// =============================================================================

/// Encode a flat instruction list.
pub fn encode(instructions: &[Instruction]) -> Result<Vec<u8>, FormatError> {
    let mut out = Vec::new();
    for instruction in instructions {
        encode_instruction(&mut out, instruction)?;
    }
    Ok(out)
}

fn encode_instruction(out: &mut Vec<u8>, instruction: &Instruction) -> Result<(), FormatError> {
    out.push(instruction.opcode().byte());
    match instruction {
        Instruction::BinDef { name } | Instruction::Extern { name } => write_string(out, name)?,
        Instruction::Text | Instruction::Halt => {}
        Instruction::Data { values } => {
            for value in values {
                write_i32(out, *value);
            }
        }
        Instruction::Move { source, target } => {
            write_address(out, *source);
            write_address(out, *target);
        }
        Instruction::Const { value, target } => {
            write_i32(out, *value);
            write_address(out, *target);
        }
        Instruction::Binary {
            op1, op2, target, ..
        } => {
            write_address(out, *op1);
            write_address(out, *op2);
            write_address(out, *target);
        }
        Instruction::Jump { flag, target } | Instruction::JumpN { flag, target } => {
            write_address(out, *flag);
            write_i32(out, *target);
        }
        Instruction::JumpAddress { addr } => write_address(out, *addr),
    }
    Ok(())
}

fn write_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn write_address(out: &mut Vec<u8>, addr: Address) {
    write_i32(out, addr.base);
    write_i32(out, addr.offset);
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<(), FormatError> {
    let len = u8::try_from(s.len()).map_err(|_| FormatError::name_too_long(s))?;
    out.push(len);
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a byte stream into a flat instruction list without checking the
/// segment structure.
pub fn decode(bytes: &[u8]) -> Result<Vec<Instruction>, FormatError> {
    let mut reader = ByteReader::new(bytes);
    let mut segment = Segment::Header;
    let mut out = Vec::new();

    while !reader.is_empty() {
        let instruction = reader.instruction(segment)?;
        segment = match instruction {
            Instruction::Text => Segment::Text,
            Instruction::Data { .. } => Segment::Data,
            _ => segment,
        };
        out.push(instruction);
    }

    Ok(out)
}

impl Executable {
    pub fn to_bytes(&self) -> Vec<u8> {
        match encode(&self.to_instructions()) {
            Ok(bytes) => {
                log::debug!(
                    "serialized executable '{}': {} bytes",
                    self.name(),
                    bytes.len()
                );
                bytes
            }
            // names are length-checked on construction
            Err(e) => unreachable!("validated executable failed to encode: {e}"),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        let exe = Executable::from_instructions(decode(bytes)?)?;
        log::debug!(
            "parsed executable '{}': {} instructions, {} data cells",
            exe.name(),
            exe.text().len(),
            exe.data().len()
        );
        Ok(exe)
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn take(&mut self, len: usize, segment: Segment) -> Result<&'a [u8], FormatError> {
        if self.remaining() < len {
            return Err(FormatError::eof(segment));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self, segment: Segment) -> Result<u8, FormatError> {
        Ok(self.take(1, segment)?[0])
    }

    fn i32(&mut self, segment: Segment) -> Result<i32, FormatError> {
        let b = self.take(4, segment)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn address(&mut self, segment: Segment) -> Result<Address, FormatError> {
        let base = self.i32(segment)?;
        let offset = self.i32(segment)?;
        Ok(Address::new(base, offset))
    }

    fn string(&mut self, segment: Segment) -> Result<String, FormatError> {
        let len = usize::from(self.u8(segment)?);
        let offset = self.pos;
        let bytes = self.take(len, segment)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| FormatError::InvalidUtf8 { offset })
    }

    fn instruction(&mut self, segment: Segment) -> Result<Instruction, FormatError> {
        let offset = self.pos;
        let byte = self.u8(segment)?;
        let op = OpCode::from_byte(byte).ok_or(FormatError::UnknownOpcode { byte, offset })?;

        let instruction = match op {
            OpCode::BinDef => Instruction::BinDef {
                name: self.string(segment)?,
            },
            OpCode::Text => Instruction::Text,
            OpCode::Data => {
                let mut values = Vec::with_capacity(self.remaining() / 4);
                while !self.is_empty() {
                    values.push(self.i32(Segment::Data)?);
                }
                Instruction::Data { values }
            }
            OpCode::Move => Instruction::Move {
                source: self.address(segment)?,
                target: self.address(segment)?,
            },
            OpCode::Const => Instruction::Const {
                value: self.i32(segment)?,
                target: self.address(segment)?,
            },
            OpCode::Jump => Instruction::Jump {
                flag: self.address(segment)?,
                target: self.i32(segment)?,
            },
            OpCode::JumpN => Instruction::JumpN {
                flag: self.address(segment)?,
                target: self.i32(segment)?,
            },
            OpCode::JumpAddress => Instruction::JumpAddress {
                addr: self.address(segment)?,
            },
            OpCode::Extern => Instruction::Extern {
                name: self.string(segment)?,
            },
            OpCode::Halt => Instruction::Halt,
            other => match BinaryOp::from_opcode(other) {
                Some(op) => Instruction::Binary {
                    op,
                    op1: self.address(segment)?,
                    op2: self.address(segment)?,
                    target: self.address(segment)?,
                },
                None => unreachable!("{} has a dedicated arm", other.mnemonic()),
            },
        };
        Ok(instruction)
    }
}
