//! CBOR serialization helpers.

use serde::{de::DeserializeOwned, Serialize};

use crate::{Result, TransportError};

/// Serialize a value to CBOR bytes.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| TransportError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a value from CBOR bytes.
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| TransportError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn roundtrip() {
        let value = Sample {
            a: 7,
            b: "hi".to_string(),
        };
        let bytes = to_vec(&value).unwrap();
        let restored: Sample = from_slice(&bytes).unwrap();
        assert_eq!(value, restored);
    }

    #[test]
    fn bad_bytes_fail_cleanly() {
        let result: Result<Sample> = from_slice(&[0xff, 0xff, 0xff]);
        assert!(result.is_err());
    }
}
