//! # Signing Oracle
//!
//! Per-connection ECDSA P-256 key with a bounded signing service:
//! - One signature per connection
//! - Verification against the connection's public key
//! - A 32-bit random number service
//!
//! ## Nonce Source
//!
//! Random numbers and signing nonces come from the same Mersenne Twister.
//! Its output is predictable from enough observed values, so the nonce of
//! the single signature can be reconstructed and the private key solved
//! for. That weakness is what the exercise asks players to find.

use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::ops::{Invert, Reduce};
use p256::elliptic_curve::point::AffineCoordinates;
use p256::{AffinePoint, FieldBytes, NonZeroScalar, ProjectivePoint, Scalar, U256};
use rand::rngs::OsRng;
use rand::RngCore;
use rand_mt::Mt;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{ProtocolError, ProtocolResult};
use crate::{CHALLENGE_SIZE, SEED_WORDS};

/// Signing key, nonce generator and one-shot flag for a connection
pub struct SigningOracle {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    rng: Mt,
    used: bool,
}

impl SigningOracle {
    /// Generate a fresh key and seed the generator from the OS
    pub fn generate() -> Self {
        let mut seed = [0u32; SEED_WORDS];
        for word in seed.iter_mut() {
            *word = OsRng.next_u32();
        }
        let oracle = Self::from_parts(SigningKey::random(&mut OsRng), &seed);
        seed.zeroize();
        oracle
    }

    /// Build an oracle from an existing key and generator seed
    pub fn from_parts(signing_key: SigningKey, seed: &[u32]) -> Self {
        let verifying_key = VerifyingKey::from(&signing_key);
        Self {
            signing_key,
            verifying_key,
            rng: Mt::new_with_key(seed.iter().copied()),
            used: false,
        }
    }

    /// Next 32-bit output of the connection generator
    pub fn roll_random_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    /// Whether the one signature has been handed out
    pub fn is_used(&self) -> bool {
        self.used
    }

    /// Sign `message` with SHA-256. Succeeds once per oracle.
    pub fn sign_once(&mut self, message: &[u8]) -> ProtocolResult<Signature> {
        if self.used {
            return Err(ProtocolError::AlreadyUsed);
        }
        self.used = true;

        let digest = Sha256::digest(message);
        Ok(self.sign_digest(&digest))
    }

    fn sign_digest(&mut self, digest: &[u8]) -> Signature {
        let z = <Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(digest));
        let d: Scalar = **self.signing_key.as_nonzero_scalar();

        loop {
            let k = draw_nonce(&mut self.rng);
            let big_r = AffinePoint::from(ProjectivePoint::GENERATOR * *k);
            let r = <Scalar as Reduce<U256>>::reduce_bytes(&big_r.x());
            let k_inv = Invert::invert(&k);
            let s = *k_inv * (z + r * d);

            // r or s of zero is rejected by from_scalars; draw again
            if let Ok(signature) = Signature::from_scalars(r, s) {
                return signature;
            }
        }
    }

    /// Check a signature over `message`. Never fails on malformed input.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        self.check(message, signature).is_ok()
    }

    /// Like [`verify`](Self::verify) but reports why a signature was refused
    pub fn check(&self, message: &[u8], signature: &[u8]) -> ProtocolResult<()> {
        let signature = Signature::from_slice(signature)
            .map_err(|_| ProtocolError::VerificationFailure("malformed signature".into()))?;

        self.verifying_key
            .verify(message, &signature)
            .map_err(|_| ProtocolError::VerificationFailure("signature mismatch".into()))
    }

    /// Check a hex-encoded signature the way a client sends it
    pub fn check_hex(&self, message: &[u8], signature_hex: &[u8]) -> ProtocolResult<()> {
        let signature = decode_hex(signature_hex)?;
        self.check(message, &signature)
    }

    /// Fresh debug-menu challenge from the OS entropy source
    pub fn challenge(&self) -> [u8; CHALLENGE_SIZE] {
        let mut message = [0u8; CHALLENGE_SIZE];
        OsRng.fill_bytes(&mut message);
        message
    }

    /// Public half of the connection key
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }
}

/// Draw a nonce in `[1, n)` by rejection sampling 32-byte blocks
pub fn draw_nonce(rng: &mut Mt) -> NonZeroScalar {
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        let candidate = NonZeroScalar::from_repr(FieldBytes::clone_from_slice(&bytes));
        if let Some(k) = Option::<NonZeroScalar>::from(candidate) {
            return k;
        }
    }
}

/// Decode hex with whitespace allowed between byte pairs
pub fn decode_hex(text: &[u8]) -> ProtocolResult<Vec<u8>> {
    let mut decoded = Vec::with_capacity(text.len() / 2);
    for group in text.split(|b| b.is_ascii_whitespace()) {
        if group.is_empty() {
            continue;
        }
        let bytes = hex::decode(group)
            .map_err(|e| ProtocolError::VerificationFailure(format!("bad hex: {}", e)))?;
        decoded.extend_from_slice(&bytes);
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer;
    use p256::elliptic_curve::Field;

    fn test_oracle(seed: &[u32]) -> (SigningOracle, SigningKey) {
        let key = SigningKey::random(&mut OsRng);
        (SigningOracle::from_parts(key.clone(), seed), key)
    }

    #[test]
    fn test_sign_once_only_once() {
        let (mut oracle, _) = test_oracle(&[1, 2, 3]);

        let signature = oracle.sign_once(b"hello").unwrap();
        assert!(oracle.is_used());
        assert!(matches!(
            oracle.sign_once(b"another"),
            Err(ProtocolError::AlreadyUsed)
        ));
        assert!(matches!(
            oracle.sign_once(b"hello"),
            Err(ProtocolError::AlreadyUsed)
        ));

        // Earlier signature is still good
        assert!(oracle.verify(b"hello", &signature.to_bytes()));
    }

    #[test]
    fn test_signature_is_64_bytes() {
        let (mut oracle, _) = test_oracle(&[7]);
        let signature = oracle.sign_once(b"msg").unwrap();
        assert_eq!(signature.to_bytes().len(), 64);
        assert_eq!(hex::encode(signature.to_bytes()).len(), 128);
    }

    #[test]
    fn test_verify_rejects_wrong_message() {
        let (mut oracle, _) = test_oracle(&[9]);
        let signature = oracle.sign_once(b"hello").unwrap();
        assert!(!oracle.verify(b"hellp", &signature.to_bytes()));
    }

    #[test]
    fn test_verify_malformed_is_false() {
        let (oracle, _) = test_oracle(&[1]);
        assert!(!oracle.verify(b"msg", &[]));
        assert!(!oracle.verify(b"msg", &[0u8]));
        assert!(!oracle.verify(b"msg", &[0u8; 64]));
        assert!(!oracle.verify(b"msg", &[0xffu8; 64]));
    }

    #[test]
    fn test_verify_accepts_any_valid_signature() {
        let (oracle, key) = test_oracle(&[1]);
        let challenge = oracle.challenge();

        // Never went through sign_once
        let signature: Signature = key.sign(&challenge);
        assert!(oracle.verify(&challenge, &signature.to_bytes()));
        assert!(!oracle.is_used());
    }

    #[test]
    fn test_check_hex() {
        let (oracle, key) = test_oracle(&[1]);
        let signature: Signature = key.sign(b"abc");
        let hex_sig = hex::encode(signature.to_bytes());

        assert!(oracle.check_hex(b"abc", hex_sig.as_bytes()).is_ok());
        assert!(matches!(
            oracle.check_hex(b"abc", b"00"),
            Err(ProtocolError::VerificationFailure(_))
        ));
        assert!(matches!(
            oracle.check_hex(b"abc", b"zz"),
            Err(ProtocolError::VerificationFailure(_))
        ));
    }

    #[test]
    fn test_decode_hex_whitespace() {
        assert_eq!(decode_hex(b"00ff").unwrap(), vec![0x00, 0xff]);
        assert_eq!(decode_hex(b" 00 ff\r").unwrap(), vec![0x00, 0xff]);
        assert_eq!(decode_hex(b"").unwrap(), Vec::<u8>::new());
        assert!(decode_hex(b"0 0").is_err());
        assert!(decode_hex(b"abc").is_err());
    }

    #[test]
    fn test_random_rolls_are_deterministic_per_seed() {
        let (mut a, _) = test_oracle(&[42, 43]);
        let (mut b, _) = test_oracle(&[42, 43]);
        let rolls_a: Vec<u32> = (0..8).map(|_| a.roll_random_u32()).collect();
        let rolls_b: Vec<u32> = (0..8).map(|_| b.roll_random_u32()).collect();
        assert_eq!(rolls_a, rolls_b);
    }

    #[test]
    fn test_challenges_differ() {
        let (oracle, _) = test_oracle(&[1]);
        assert_ne!(oracle.challenge(), oracle.challenge());
    }

    #[test]
    fn test_predictable_nonce_recovers_key() {
        let seed = [0xdead_beef, 0x1234_5678];
        let (mut oracle, key) = test_oracle(&seed);
        let message = b"sign me";

        for _ in 0..3 {
            oracle.roll_random_u32();
        }
        let signature = oracle.sign_once(message).unwrap();

        // Replay the generator to the same position
        let mut replica = Mt::new_with_key(seed.iter().copied());
        for _ in 0..3 {
            replica.next_u32();
        }
        let k = draw_nonce(&mut replica);

        let (r, s) = signature.split_scalars();
        let digest = Sha256::digest(message);
        let z = <Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(&digest));
        let r_inv = *Invert::invert(&r);
        let d = (*s * *k - z) * r_inv;

        assert_eq!(d, **key.as_nonzero_scalar());
        assert!(!bool::from(d.is_zero()));
    }
}
