/// A request body that the client can replay for the single transient retry
///. A streaming body that can't be seeked back to the start simply
/// isn't representable here, which is what makes the retry safe by construction.
#[derive(Debug, Clone)]
pub enum RewindableBody {
    Empty,
    Bytes(bytes::Bytes),
}

impl RewindableBody {
    pub fn len(&self) -> usize {
        match self {
            RewindableBody::Empty => 0,
            RewindableBody::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            RewindableBody::Empty => Vec::new(),
            RewindableBody::Bytes(b) => b.to_vec(),
        }
    }
}

impl From<bytes::Bytes> for RewindableBody {
    fn from(b: bytes::Bytes) -> Self {
        RewindableBody::Bytes(b)
    }
}
