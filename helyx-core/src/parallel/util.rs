use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

/// Compute the log-base-two of the next power of two: 8 -> 3, 9 -> 4.
///
pub fn ceil_log2(x: usize) -> usize {
    let mut n = 0;
    while 1 << n < x {
        n += 1
    }
    n
}

/// Encode a value as a MessagePack buffer for sending between ranks.
///
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::encode::to_vec(value)?)
}

/// Decode a MessagePack buffer received from another rank.
///
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(rmp_serde::decode::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_log2() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(8), 3);
        assert_eq!(ceil_log2(9), 4);
    }

    #[test]
    fn test_encode_decode() {
        let names = vec!["d".to_string(), "U".to_string()];
        let bytes = encode(&names).unwrap();
        let back: Vec<String> = decode(&bytes).unwrap();
        assert_eq!(back, names);
    }
}
