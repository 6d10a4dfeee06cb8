//! Content-addressed binary objects (documents attached as evidence).

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A binary object with a random identifier and a content hash.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    id: String,
    #[serde(with = "hex::serde")]
    hash: [u8; 32],
    mime: String,
    #[serde(with = "hex::serde")]
    data: Vec<u8>,
}

impl Object {
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> Self {
        let mut id = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut id);

        Self {
            id: hex::encode(id),
            hash: Sha256::digest(&data).into(),
            mime: mime.into(),
            data,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the stored hash still matches the data.
    pub fn is_intact(&self) -> bool {
        let actual: [u8; 32] = Sha256::digest(&self.data).into();
        actual == self.hash
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("hash", &self.hash_hex())
            .field("mime", &self.mime)
            .field("len", &self.data.len())
            .finish()
    }
}
