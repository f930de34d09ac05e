//! Text command encoder.
//!
//! A command mixes two syntaxes freely:
//!
//! ```text
//! 0x02 "RD" 48 0b1010 "\r"    -> [0x02, 0x52, 0x44, 0x30, 0x0A, 0x5C, 0x72]
//! ```
//!
//! - `"..."` quoted ASCII text, copied byte for byte (no escapes). An
//!   unterminated quote runs to the end of the input.
//! - whitespace-separated integers in 0..=255: decimal, `0x` hex, `0o` octal,
//!   `0b` binary, or a leading `0` for legacy octal, with an optional sign and
//!   `_` digit separators.

/// Why a command could not be fully encoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A token is not an integer literal.
    #[error("invalid number: {token}")]
    NumericFormat { token: String },

    /// An integer literal is outside 0..=255.
    #[error("number out of range 0..=255: {value}")]
    NumericRange { value: i64 },

    /// Quoted text contains a character outside ASCII.
    #[error("only ASCII is allowed in quoted text: {ch:?}")]
    NonAscii { ch: char },
}

/// The outcome of encoding one command.
///
/// On failure `bytes` holds what was encoded before the first error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCommand {
    bytes: Vec<u8>,
    error: Option<EncodeError>,
}

impl EncodedCommand {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn error(&self) -> Option<&EncodeError> {
        self.error.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Human-readable description of the first failure.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn into_result(self) -> Result<Vec<u8>, EncodeError> {
        match self.error {
            None => Ok(self.bytes),
            Some(err) => Err(err),
        }
    }
}

/// Encode a text command into the bytes to transmit. Never panics.
pub fn encode_command(input: &str) -> EncodedCommand {
    let mut bytes = Vec::with_capacity(input.len());
    let error = encode_into(input, &mut bytes).err();
    EncodedCommand { bytes, error }
}

fn encode_into(input: &str, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    let mut chars = input.char_indices().peekable();
    // Byte offset where the open quoted literal starts.
    let mut literal: Option<usize> = None;

    while let Some((i, c)) = chars.next() {
        if let Some(start) = literal {
            if c == '"' {
                push_ascii(&input[start..i], out)?;
                literal = None;
            }
            continue;
        }

        if c == '"' {
            literal = Some(i + 1);
            continue;
        }
        if c.is_whitespace() {
            continue;
        }

        let mut end = input.len();
        while let Some(&(j, next)) = chars.peek() {
            if next.is_whitespace() {
                end = j;
                break;
            }
            chars.next();
        }
        push_number(&input[i..end], out)?;
    }

    if let Some(start) = literal {
        push_ascii(&input[start..], out)?;
    }
    Ok(())
}

fn push_ascii(text: &str, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    for ch in text.chars() {
        if !ch.is_ascii() {
            return Err(EncodeError::NonAscii { ch });
        }
        out.push(ch as u8);
    }
    Ok(())
}

fn push_number(token: &str, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    let value = parse_int_literal(token).ok_or_else(|| EncodeError::NumericFormat {
        token: token.to_string(),
    })?;
    let byte = u8::try_from(value).map_err(|_| EncodeError::NumericRange { value })?;
    out.push(byte);
    Ok(())
}

/// Parse an integer literal with its base taken from the prefix.
fn parse_int_literal(token: &str) -> Option<i64> {
    let (negative, body) = match token.as_bytes().first()? {
        b'+' => (false, &token[1..]),
        b'-' => (true, &token[1..]),
        _ => (false, token),
    };

    let (radix, digits, prefixed) = if let Some(rest) = strip_prefix_ci(body, "0x") {
        (16, rest, true)
    } else if let Some(rest) = strip_prefix_ci(body, "0o") {
        (8, rest, true)
    } else if let Some(rest) = strip_prefix_ci(body, "0b") {
        (2, rest, true)
    } else if body.len() > 1 && body.starts_with('0') {
        (8, &body[1..], true)
    } else {
        (10, body, false)
    };

    if !underscores_ok(digits, prefixed) {
        return None;
    }
    let cleaned: String = digits.chars().filter(|&c| c != '_').collect();
    if cleaned.is_empty() || cleaned.starts_with(['+', '-']) {
        return None;
    }

    let magnitude = i64::from_str_radix(&cleaned, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// `_` may only separate digits, or directly follow a base prefix.
fn underscores_ok(digits: &str, prefixed: bool) -> bool {
    if digits.ends_with('_') || digits.contains("__") {
        return false;
    }
    prefixed || !digits.starts_with('_')
}
