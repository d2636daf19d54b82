use core::fmt::{Display, Error as FmtError, Formatter};

use sha2::{Digest, Sha256};

use crate::error::DecodingError;

/// An opaque acknowledgement written by the receiving application. Only its
/// bytes matter to the relayer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Acknowledgement(Vec<u8>);

impl Acknowledgement {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// The value stored under the ack path: `sha256(ack)`.
    pub fn commitment(&self) -> AcknowledgementCommitment {
        AcknowledgementCommitment(Sha256::digest(&self.0).to_vec())
    }
}

impl TryFrom<Vec<u8>> for Acknowledgement {
    type Error = DecodingError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        if bytes.is_empty() {
            Err(DecodingError::missing_raw_data("acknowledgement bytes"))
        } else {
            Ok(Self(bytes))
        }
    }
}

impl AsRef<[u8]> for Acknowledgement {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Acknowledgement {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match core::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "{s}"),
            Err(_) => write!(f, "{}", hex::encode_upper(&self.0)),
        }
    }
}

/// Hash of an acknowledgement as committed by the receiving chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcknowledgementCommitment(Vec<u8>);

impl AcknowledgementCommitment {
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for AcknowledgementCommitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
