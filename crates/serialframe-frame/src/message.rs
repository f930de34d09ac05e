use bytes::Bytes;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// One framed unit of received data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Continuation of the immediately preceding message: no natural
    /// boundary was found between them.
    pub append: bool,
    /// The received bytes.
    pub data: Bytes,
}

impl Message {
    pub fn new(append: bool, data: impl Into<Bytes>) -> Self {
        Self {
            append,
            data: data.into(),
        }
    }

    /// The payload widened to 16-bit units, as presentation layers expect.
    pub fn widened(&self) -> Vec<u16> {
        self.data.iter().map(|&b| u16::from(b)).collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Serializes as `{"append": bool, "data": [u16, ...]}`.
impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Message", 2)?;
        state.serialize_field("append", &self.append)?;
        state.serialize_field("data", &self.widened())?;
        state.end()
    }
}
