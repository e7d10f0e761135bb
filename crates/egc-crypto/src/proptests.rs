
#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::cipher::{open_payload, seal_payload};
    use crate::identity::verify_signature;
    use crate::session::SharedContext;
    use ed25519_dalek::{Signer, SigningKey};

    proptest! {
        // Signature round-trip over arbitrary messages
        #[test]
        fn test_identity_signature_round_trip(
            seed in any::<[u8; 32]>(),
            message in any::<Vec<u8>>()
        ) {
            let sign_key = SigningKey::from_bytes(&seed);
            let pub_bytes = sign_key.verifying_key().to_bytes();

            let sig = sign_key.sign(&message).to_bytes();
            prop_assert!(verify_signature(&pub_bytes, &message, &sig).is_ok());
        }

        // Payload round-trip for arbitrary keys and string payloads
        #[test]
        fn test_payload_round_trip(
            key in any::<[u8; 32]>(),
            text in ".*"
        ) {
            let ctx = SharedContext::from_key(key);
            let payload = serde_json::json!({ "message": text });

            let blob = seal_payload(&ctx, &payload).unwrap();
            let decrypted = open_payload(&ctx, &blob).unwrap();
            prop_assert_eq!(decrypted, payload);
        }

        // Flipping any single byte of the blob must fail decryption,
        // never return incorrect plaintext
        #[test]
        fn test_single_byte_tamper_is_detected(
            key in any::<[u8; 32]>(),
            text in ".*",
            flip_bit in 0u8..8
        ) {
            use base64::{engine::general_purpose::STANDARD as B64, Engine as _};

            let ctx = SharedContext::from_key(key);
            let payload = serde_json::json!({ "message": text });
            let blob = seal_payload(&ctx, &payload).unwrap();

            let mut raw = B64.decode(&blob).unwrap();
            let idx = raw.len() - 1; // tag byte, always past the nonce
            raw[idx] ^= 1 << flip_bit;

            prop_assert!(open_payload(&ctx, &B64.encode(raw)).is_err());
        }

        // Independent random nonces: identical payloads never collide
        #[test]
        fn test_nonce_uniqueness(key in any::<[u8; 32]>()) {
            let ctx = SharedContext::from_key(key);
            let payload = serde_json::json!({ "message": "hello" });

            let blob1 = seal_payload(&ctx, &payload).unwrap();
            let blob2 = seal_payload(&ctx, &payload).unwrap();
            prop_assert_ne!(blob1, blob2);
        }
    }
}
