use data_encoding::HEXLOWER_PERMISSIVE;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use sha1::{Digest, Sha1};
use std::{fmt::Display, str::FromStr};

#[derive(
    SerializeDisplay,
    DeserializeFromStr,
    Default,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
/// Process unique identifier for catalog entries and variants
pub struct Uid([u8; 16]);

impl Uid {
    pub const fn new(data: [u8; 16]) -> Self {
        Self(data)
    }

    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Stable identifier for records that never carried one of their own
    pub fn derive(seed: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(seed.as_bytes());
        let digest: [u8; 20] = hasher.finalize().into();

        let mut data = [0; 16];
        data.copy_from_slice(&digest[..16]);
        Self(data)
    }

    /// First 8 hex characters, used when naming artifacts
    pub fn short(&self) -> String {
        HEXLOWER_PERMISSIVE.encode(&self.0[..4])
    }
}

impl AsRef<[u8]> for Uid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 16]> for Uid {
    fn from(value: [u8; 16]) -> Self {
        Self(value)
    }
}

impl Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", HEXLOWER_PERMISSIVE.encode(&self.0))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UidParseError {
    #[error("invalid hex in identifier: {0}")]
    Hex(#[from] data_encoding::DecodeError),
    #[error("identifier must be 16 bytes, got {0}")]
    Length(usize),
}

impl FromStr for Uid {
    type Err = UidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = HEXLOWER_PERMISSIVE.decode(s.trim().as_bytes())?;
        let length = bytes.len();

        bytes
            .try_into()
            .map(Self)
            .map_err(|_| UidParseError::Length(length))
    }
}

/// Reference to a freshly ingested variant and the entry that now holds it
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantRef {
    pub entry: Uid,
    pub variant: Uid,
}
