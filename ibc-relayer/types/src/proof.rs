use crate::error::DecodingError;

/// Encoded proof bytes as returned by a chain query. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommitmentProofBytes {
    bytes: Vec<u8>,
}

impl CommitmentProofBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl TryFrom<Vec<u8>> for CommitmentProofBytes {
    type Error = DecodingError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        if bytes.is_empty() {
            Err(DecodingError::missing_raw_data("empty commitment proof bytes"))
        } else {
            Ok(Self { bytes })
        }
    }
}

impl From<CommitmentProofBytes> for Vec<u8> {
    fn from(p: CommitmentProofBytes) -> Vec<u8> {
        p.bytes
    }
}
