//! The provable store of a mock chain and the proofs it hands out.

use std::collections::BTreeMap;

use ibc_relayer_types::height::Height;
use ibc_relayer_types::identifiers::ChainId;
use ibc_relayer_types::path::Path;
use ibc_relayer_types::proof::CommitmentProofBytes;
use serde::{Deserialize, Serialize};

use super::error::MockError;

/// Every value ever written under each path, by the height that wrote it,
/// so that the store can be read as of any past height.
#[derive(Clone, Debug, Default)]
pub(crate) struct VersionedStore {
    entries: BTreeMap<String, Vec<(u64, Option<Vec<u8>>)>>,
}

impl VersionedStore {
    pub fn set(&mut self, path: &Path, height: Height, value: Vec<u8>) {
        self.write(path, height, Some(value));
    }

    pub fn delete(&mut self, path: &Path, height: Height) {
        self.write(path, height, None);
    }

    /// The value under `path` as of `height`.
    pub fn get_at(&self, path: &Path, height: Height) -> Option<&[u8]> {
        self.entries
            .get(&path.to_string())?
            .iter()
            .rev()
            .find(|(written_at, _)| *written_at <= height.revision_height())
            .and_then(|(_, value)| value.as_deref())
    }

    /// The current value under `path`.
    pub fn get(&self, path: &Path) -> Option<&[u8]> {
        self.entries
            .get(&path.to_string())?
            .last()
            .and_then(|(_, value)| value.as_deref())
    }

    fn write(&mut self, path: &Path, height: Height, value: Option<Vec<u8>>) {
        let versions = self.entries.entry(path.to_string()).or_default();
        match versions.last_mut() {
            Some((written_at, last)) if *written_at == height.revision_height() => *last = value,
            _ => versions.push((height.revision_height(), value)),
        }
    }
}

/// A proof that `value` was (or with `None`, was not) stored under `path`
/// on `chain_id` at `height`.
///
/// Mock chains trust each other, so a proof is just the claim it makes,
/// serialized as JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockProof {
    pub chain_id: String,
    pub path: String,
    pub height: Height,
    #[serde(with = "hex_value")]
    pub value: Option<Vec<u8>>,
}

impl MockProof {
    pub fn new(chain_id: &ChainId, path: &Path, height: Height, value: Option<Vec<u8>>) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            path: path.to_string(),
            height,
            value,
        }
    }

    pub fn to_bytes(&self) -> Result<CommitmentProofBytes, MockError> {
        let bytes = serde_json::to_vec(self).map_err(|e| MockError::InvalidProof {
            path: self.path.clone(),
            description: e.to_string(),
        })?;

        Ok(CommitmentProofBytes::try_from(bytes)?)
    }

    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self, MockError> {
        serde_json::from_slice(bytes).map_err(|e| MockError::InvalidProof {
            path: path.to_string(),
            description: e.to_string(),
        })
    }
}

mod hex_value {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use ibc_relayer_types::identifiers::{ChannelId, PortId, Sequence};
    use rstest::rstest;

    use super::*;

    fn height(h: u64) -> Height {
        Height::new(0, h).expect("non-zero height")
    }

    #[rstest]
    #[case(2, None)]
    #[case(3, Some(1))]
    #[case(5, Some(1))]
    #[case(6, None)]
    #[case(8, Some(2))]
    fn reads_past_versions(#[case] at: u64, #[case] expected: Option<u8>) {
        let path = Path::Commitment(PortId::transfer(), ChannelId::new(0), Sequence::from(1));
        let mut store = VersionedStore::default();

        store.set(&path, height(3), vec![1]);
        store.delete(&path, height(6));
        store.set(&path, height(8), vec![2]);

        assert_eq!(
            store.get_at(&path, height(at)).map(<[u8]>::to_vec),
            expected.map(|v| vec![v])
        );
        assert_eq!(store.get(&path), Some([2u8].as_slice()));
    }

    #[test]
    fn proofs_survive_the_wire() {
        let chain_id = ChainId::new("mock-0").expect("valid chain id");
        let path = Path::SeqRecv(PortId::transfer(), ChannelId::new(2));
        let proof = MockProof::new(&chain_id, &path, height(9), Some(7u64.to_be_bytes().to_vec()));

        let bytes = proof.to_bytes().expect("encodable proof");
        assert_eq!(MockProof::from_bytes(&path, bytes.as_bytes()), Ok(proof));
    }
}
