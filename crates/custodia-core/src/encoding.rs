//! Serde helpers for binary fields crossing the JSON boundary.

/// Base64 (standard alphabet, padded) encoding for `Vec<u8>` fields.
///
/// Usage: `#[serde(with = "custodia_core::encoding::b64")]`.
pub mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Blob {
        #[serde(with = "super::b64")]
        data: Vec<u8>,
    }

    #[test]
    fn round_trip() {
        let blob = Blob {
            data: vec![0, 1, 2, 255],
        };
        let json = serde_json::to_string(&blob).unwrap();
        assert_eq!(json, "{\"data\":\"AAEC/w==\"}");
        let back: Blob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data, vec![0, 1, 2, 255]);
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = serde_json::from_str::<Blob>("{\"data\":\"!!!\"}");
        assert!(err.is_err());
    }
}
