use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{VeilError, VeilResult};

/// Metadata for a single backend entry, as the backend reports it.
///
/// `size` is the raw stored size: for objects written through the overlay
/// this is the ciphertext length, not the plaintext length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// How a handle is opened. Parsed from the familiar `fopen`-style mode
/// strings (`r`, `w`, `a`, `x`, optionally with `+`, `b` or `t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
    pub exclusive: bool,
}

impl OpenMode {
    pub const READ: OpenMode = OpenMode {
        read: true,
        write: false,
        append: false,
        truncate: false,
        create: false,
        exclusive: false,
    };

    pub const WRITE: OpenMode = OpenMode {
        read: false,
        write: true,
        append: false,
        truncate: true,
        create: true,
        exclusive: false,
    };

    pub const APPEND: OpenMode = OpenMode {
        read: false,
        write: true,
        append: true,
        truncate: false,
        create: true,
        exclusive: false,
    };

    pub fn is_writing(&self) -> bool {
        self.write || self.append
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        OpenMode::READ
    }
}

impl FromStr for OpenMode {
    type Err = VeilError;

    fn from_str(s: &str) -> VeilResult<Self> {
        let invalid = || VeilError::Config(format!("invalid open mode '{s}'"));

        let mut base: Option<char> = None;
        let mut plus = false;
        let mut binary = false;
        let mut text = false;
        for c in s.chars() {
            match c {
                'r' | 'w' | 'a' | 'x' if base.is_none() => base = Some(c),
                '+' if !plus => plus = true,
                'b' if !binary => binary = true,
                't' if !text => text = true,
                _ => return Err(invalid()),
            }
        }
        if binary && text {
            return Err(invalid());
        }

        let mut mode = match base.ok_or_else(invalid)? {
            'r' => OpenMode::READ,
            'w' => OpenMode::WRITE,
            'a' => OpenMode::APPEND,
            'x' => OpenMode {
                exclusive: true,
                ..OpenMode::WRITE
            },
            _ => return Err(invalid()),
        };
        if plus {
            mode.read = true;
            mode.write = true;
        }
        Ok(mode)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = if self.exclusive {
            "x"
        } else if self.append {
            "a"
        } else if self.truncate {
            "w"
        } else {
            "r"
        };
        let plus = if self.read && self.write { "+" } else { "" };
        write!(f, "{base}{plus}")
    }
}

/// Text encodings accepted by the text-mode read/write helpers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

impl TextEncoding {
    pub fn encode(&self, text: &str) -> VeilResult<Vec<u8>> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        VeilError::Encoding(format!("character {c:?} is not representable in latin-1"))
                    })
                })
                .collect(),
        }
    }

    pub fn decode(&self, bytes: Vec<u8>) -> VeilResult<String> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes)
                .map_err(|e| VeilError::Encoding(format!("invalid utf-8: {e}"))),
            TextEncoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = VeilError;

    fn from_str(s: &str) -> VeilResult<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            other => Err(VeilError::Encoding(format!("unsupported encoding '{other}'"))),
        }
    }
}
