use base64::Engine;
use bytes::Bytes;

/// Bytes per second of 24 kHz mono PCM16, the format clients stream in.
pub const PCM16_BYTES_PER_SECOND: usize = 24_000 * 2;

/// Encodes raw audio bytes for a JSON frame.
pub fn encode_audio(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decodes the base64 payload of an inbound audio frame.
pub fn decode_audio(base64_fragment: &str) -> Result<Bytes, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD
        .decode(base64_fragment)
        .map(Bytes::from)
}

/// Approximate playback length of a PCM16 buffer, for logging.
pub fn pcm16_duration_ms(len: usize) -> u64 {
    (len as u64 * 1000) / PCM16_BYTES_PER_SECOND as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let encoded = encode_audio(b"AABBCC");
        assert_eq!(encoded, "QUFCQkND");
        assert_eq!(decode_audio(&encoded).unwrap(), Bytes::from_static(b"AABBCC"));

        // Empty payloads are valid and decode to nothing.
        assert_eq!(encode_audio(&[]), "");
        assert!(decode_audio("").unwrap().is_empty());
    }

    #[test]
    fn test_decode_invalid_base64() {
        assert!(decode_audio("invalid_base64!").is_err());
    }

    #[test]
    fn test_pcm16_duration() {
        assert_eq!(pcm16_duration_ms(0), 0);
        assert_eq!(pcm16_duration_ms(PCM16_BYTES_PER_SECOND), 1000);
        assert_eq!(pcm16_duration_ms(PCM16_BYTES_PER_SECOND / 2), 500);
    }
}
