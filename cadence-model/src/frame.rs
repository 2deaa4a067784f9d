//! Frame identity derivations and self-verification
//!
//! A frame's selector is content-addressed from its output; its address is
//! derived from the signing key; its distance is the absolute difference
//! between the selector and a frame-local discriminator. All three are
//! arbitrary-precision unsigned integers serialized big-endian.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use num_bigint::BigUint;
use thiserror::Error;

use crate::proto::ClockFrame;

/// Errors from frame identity derivation or self-verification.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame carries no signature")]
    MissingSignature,

    #[error("malformed public key")]
    MalformedPublicKey,

    #[error("malformed signature")]
    MalformedSignature,

    #[error("signature does not verify")]
    BadSignature,
}

/// The big-integer identity of a frame relative to its parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameIdentity {
    pub parent_selector: BigUint,
    pub selector: BigUint,
    pub distance: BigUint,
}

impl FrameIdentity {
    /// Big-endian byte forms, the encoding used for storage keys and wire
    /// fields. No leading-zero normalization is guaranteed beyond what
    /// `BigUint` emits.
    pub fn parent_selector_bytes(&self) -> Vec<u8> {
        self.parent_selector.to_bytes_be()
    }

    pub fn selector_bytes(&self) -> Vec<u8> {
        self.selector.to_bytes_be()
    }

    pub fn distance_bytes(&self) -> Vec<u8> {
        self.distance.to_bytes_be()
    }
}

impl ClockFrame {
    /// Content-addressed selector of this frame.
    pub fn selector(&self) -> BigUint {
        BigUint::from_bytes_be(blake3::hash(&self.output).as_bytes())
    }

    /// Prover identity: hash of the signing public key.
    pub fn address(&self) -> Result<Vec<u8>, FrameError> {
        let sig = self
            .public_key_signature
            .as_ref()
            .ok_or(FrameError::MissingSignature)?;
        Ok(blake3::hash(&sig.public_key).as_bytes().to_vec())
    }

    /// Selector, parent selector, and the distance between this frame's
    /// selector and its discriminator.
    pub fn identity(&self) -> Result<FrameIdentity, FrameError> {
        let parent_selector = BigUint::from_bytes_be(&self.parent_selector);
        let selector = self.selector();

        let address = self.address()?;
        let mut preimage = Vec::with_capacity(address.len() + self.parent_selector.len());
        preimage.extend_from_slice(&address);
        preimage.extend_from_slice(&self.parent_selector);
        let discriminator = BigUint::from_bytes_be(blake3::hash(&preimage).as_bytes());

        let distance = if selector >= discriminator {
            &selector - &discriminator
        } else {
            &discriminator - &selector
        };

        Ok(FrameIdentity {
            parent_selector,
            selector,
            distance,
        })
    }

    /// The bytes the frame signature covers: header fields plus content
    /// hashes of input and output.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.filter.len() + self.parent_selector.len() + 84);
        bytes.extend_from_slice(&self.filter);
        bytes.extend_from_slice(&self.frame_number.to_be_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.difficulty.to_be_bytes());
        bytes.extend_from_slice(&self.parent_selector);
        bytes.extend_from_slice(blake3::hash(&self.input).as_bytes());
        bytes.extend_from_slice(blake3::hash(&self.output).as_bytes());
        bytes
    }

    /// Structural self-verification: the Ed25519 signature must cover the
    /// signable bytes under the embedded public key.
    pub fn verify_signature(&self) -> Result<(), FrameError> {
        let sig = self
            .public_key_signature
            .as_ref()
            .ok_or(FrameError::MissingSignature)?;

        let key_bytes: [u8; 32] = sig
            .public_key
            .as_slice()
            .try_into()
            .map_err(|_| FrameError::MalformedPublicKey)?;
        let key =
            VerifyingKey::from_bytes(&key_bytes).map_err(|_| FrameError::MalformedPublicKey)?;

        let sig_bytes: [u8; 64] = sig
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| FrameError::MalformedSignature)?;
        let signature = Signature::from_bytes(&sig_bytes);

        key.verify(&self.signable_bytes(), &signature)
            .map_err(|_| FrameError::BadSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::Ed25519Signature;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn signed_frame() -> ClockFrame {
        let key = SigningKey::generate(&mut OsRng);
        let mut frame = ClockFrame {
            filter: vec![1, 2, 3, 4],
            frame_number: 12,
            timestamp: 1_700_000_000,
            difficulty: 100,
            parent_selector: vec![0x10; 32],
            input: vec![0u8; 516],
            output: vec![9u8; 32],
            aggregate_proofs: vec![],
            public_key_signature: None,
        };
        let signature = key.sign(&frame.signable_bytes());
        frame.public_key_signature = Some(Ed25519Signature {
            public_key: key.verifying_key().to_bytes().to_vec(),
            signature: signature.to_bytes().to_vec(),
        });
        frame
    }

    #[test]
    fn selector_is_deterministic_over_output() {
        let a = signed_frame();
        let mut b = a.clone();
        assert_eq!(a.selector(), b.selector());

        b.output[0] ^= 0xFF;
        assert_ne!(a.selector(), b.selector());
    }

    #[test]
    fn identity_is_deterministic_and_prover_dependent() {
        let frame = signed_frame();
        let identity = frame.identity().unwrap();
        assert_eq!(identity, frame.identity().unwrap());
        assert_eq!(identity.parent_selector, BigUint::from_bytes_be(&[0x10; 32]));
        assert_eq!(identity.selector, frame.selector());

        // A different prover yields a different discriminator, so a
        // different distance for the same content.
        let other = signed_frame();
        assert_ne!(
            identity.distance,
            other.identity().unwrap().distance,
        );
    }

    #[test]
    fn signature_verifies_and_detects_tampering() {
        let mut frame = signed_frame();
        frame.verify_signature().unwrap();

        frame.frame_number += 1;
        assert!(matches!(
            frame.verify_signature(),
            Err(FrameError::BadSignature)
        ));
    }

    #[test]
    fn missing_signature_is_an_error() {
        let mut frame = signed_frame();
        frame.public_key_signature = None;
        assert!(matches!(frame.address(), Err(FrameError::MissingSignature)));
        assert!(matches!(
            frame.verify_signature(),
            Err(FrameError::MissingSignature)
        ));
    }
}
