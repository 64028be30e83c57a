use std::{
    fmt,
    io::{self, Write},
    str::FromStr,
};

use base64::Engine as _;
use serde::Serialize;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use sha2::Digest as _;

use crate::Error;

/// sha256 digest of canonical content, rendered as `sha256:<base64>`.
///
/// Used both as the resolution cache key for a run spec and as the content identity of a
/// repository index.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub const ALG: &'static str = "sha256";

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(sha2::Sha256::digest(bytes).into())
    }

    /// Digest of the JSON serialization of `value`.
    ///
    /// Map-typed fields must have deterministic iteration order (`BTreeMap`, `IndexMap`) for the
    /// result to be stable.
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        struct HashWriter<'a>(&'a mut sha2::Sha256);

        impl Write for HashWriter<'_> {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.update(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut hasher = sha2::Sha256::new();
        serde_json::to_writer(HashWriter(&mut hasher), value)?;
        Ok(Self(hasher.finalize().into()))
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let Some((alg, hash_b64)) = input.split_once(':') else {
            return Err(Error::InvalidFingerprint(input.to_string()));
        };

        if alg != Self::ALG {
            return Err(Error::InvalidFingerprint(input.to_string()));
        }

        let hash = base64::engine::general_purpose::STANDARD
            .decode(hash_b64)
            .map_err(|_| Error::InvalidFingerprint(input.to_string()))?;

        let Ok(bytes) = hash.as_slice().try_into() else {
            return Err(Error::InvalidFingerprint(input.to_string()));
        };

        Ok(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::ALG)?;
        f.write_str(":")?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(self);
        f.write_str(&encoded)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}
