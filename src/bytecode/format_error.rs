use std::fmt;

/// The part of an executable being read when a format error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Header,
    Text,
    Data,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Segment::Header => "header",
            Segment::Text => "text segment",
            Segment::Data => "data segment",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("unexpected end of stream in {segment}")]
    UnexpectedEof { segment: Segment },

    #[error("unknown opcode 0x{byte:02x} at byte {offset}")]
    UnknownOpcode { byte: u8, offset: usize },

    #[error("name at byte {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    #[error("executable name is empty")]
    EmptyName,

    #[error("extern name is empty")]
    EmptyExternName,

    #[error("name '{name}...' is {len} bytes long, at most 255 fit the format")]
    NameTooLong { name: String, len: usize },

    #[error("expected BINDEF, found {found}")]
    MissingBinDef { found: String },

    #[error("expected TEXT after BINDEF, found {found}")]
    MissingText { found: String },

    #[error("{instruction} is not executable in text (instruction {index})")]
    NotExecutable { instruction: String, index: usize },

    #[error("{count} instruction(s) left after the data segment")]
    TrailingInstructions { count: usize },
}

impl FormatError {
    pub(crate) fn eof(segment: Segment) -> Self {
        FormatError::UnexpectedEof { segment }
    }

    pub(crate) fn name_too_long(name: &str) -> Self {
        FormatError::NameTooLong {
            name: name.chars().take(16).collect(),
            len: name.len(),
        }
    }
}
