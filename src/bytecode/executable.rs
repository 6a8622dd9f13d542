use super::format_error::FormatError;
use super::instruction::Instruction;
use serde::{Deserialize, Serialize};

/// Longest name the wire format can carry behind its one-byte length prefix.
pub const MAX_NAME_LEN: usize = 255;

/// A validated program image: name, executable text, and initial data cells.
///
/// Constructed once and never mutated. Every text instruction is executable
/// and every name fits the wire format, so serialization cannot fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExecutableParts")]
pub struct Executable {
    name: String,
    text: Vec<Instruction>,
    data: Vec<i32>,
    /// Whether the flat form carries a data marker
    data_marker: bool,
}

#[derive(Deserialize)]
struct ExecutableParts {
    name: String,
    text: Vec<Instruction>,
    data: Vec<i32>,
    data_marker: bool,
}

impl TryFrom<ExecutableParts> for Executable {
    type Error = FormatError;

    fn try_from(parts: ExecutableParts) -> Result<Self, Self::Error> {
        let exe = Executable::new(parts.name, parts.text, parts.data)?;
        Ok(exe.with_data_marker(parts.data_marker))
    }
}

impl Executable {
    pub fn new(
        name: impl Into<String>,
        text: Vec<Instruction>,
        data: Vec<i32>,
    ) -> Result<Self, FormatError> {
        let name = name.into();
        if name.is_empty() {
            return Err(FormatError::EmptyName);
        }
        check_name_len(&name)?;

        for (index, instruction) in text.iter().enumerate() {
            if !instruction.is_executable() {
                return Err(FormatError::NotExecutable {
                    instruction: instruction.opcode().mnemonic().to_string(),
                    index,
                });
            }
            if let Instruction::Extern { name } = instruction {
                if name.is_empty() {
                    return Err(FormatError::EmptyExternName);
                }
                check_name_len(name)?;
            }
        }

        Ok(Executable {
            name,
            text,
            data,
            data_marker: true,
        })
    }

    fn with_data_marker(mut self, present: bool) -> Self {
        self.data_marker = present;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &[Instruction] {
        &self.text
    }

    pub fn data(&self) -> &[i32] {
        &self.data
    }

    /// False only for images parsed from a stream that ended after the text.
    pub fn has_data_marker(&self) -> bool {
        self.data_marker
    }

    /// Build from the flat form `BinDef, Text, <text...>, [Data]`.
    ///
    /// The data marker is optional; without it the data segment is empty.
    pub fn from_instructions(instructions: Vec<Instruction>) -> Result<Self, FormatError> {
        let mut iter = instructions.into_iter();

        let name = match iter.next() {
            Some(Instruction::BinDef { name }) => name,
            other => {
                return Err(FormatError::MissingBinDef {
                    found: describe(other.as_ref()),
                });
            }
        };

        match iter.next() {
            Some(Instruction::Text) => {}
            other => {
                return Err(FormatError::MissingText {
                    found: describe(other.as_ref()),
                });
            }
        }

        let mut text = Vec::new();
        let mut data = None;
        for instruction in iter.by_ref() {
            match instruction {
                Instruction::Data { values } => {
                    data = Some(values);
                    break;
                }
                other => text.push(other),
            }
        }

        let count = iter.count();
        if count > 0 {
            return Err(FormatError::TrailingInstructions { count });
        }

        let data_marker = data.is_some();
        let exe = Executable::new(name, text, data.unwrap_or_default())?;
        Ok(exe.with_data_marker(data_marker))
    }

    /// Flat form. Built executables always carry a data marker, even for an
    /// empty segment; parsed ones keep the marker only if their input had it.
    pub fn to_instructions(&self) -> Vec<Instruction> {
        let mut out = Vec::with_capacity(self.text.len() + 3);
        out.push(Instruction::BinDef {
            name: self.name.clone(),
        });
        out.push(Instruction::Text);
        out.extend(self.text.iter().cloned());
        if self.data_marker {
            out.push(Instruction::Data {
                values: self.data.clone(),
            });
        }
        out
    }
}

fn check_name_len(name: &str) -> Result<(), FormatError> {
    if name.len() > MAX_NAME_LEN {
        return Err(FormatError::name_too_long(name));
    }
    Ok(())
}

fn describe(instruction: Option<&Instruction>) -> String {
    match instruction {
        Some(instruction) => instruction.opcode().mnemonic().to_string(),
        None => "end of stream".to_string(),
    }
}
