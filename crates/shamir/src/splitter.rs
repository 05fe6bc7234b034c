//! Split a secret into threshold shares and combine them again.
//!
//! Secrets are encoded as a sequence of field elements of the
//! secp256k1 scalar field. Each element carries 31 bytes of the
//! secret behind a non-zero marker byte so that every element is
//! a valid, non-zero scalar. Every element is split independently
//! with the same threshold; the shares for one participant are
//! concatenated into a single share value:
//!
//! ```text
//! | version (1) | secret length (4, BE) | element share length (1) | element shares... |
//! ```
use crate::{Error, Result, ShareRecord};
use k256::{elliptic_curve::PrimeField, Scalar};
use keyward_core::{
    constants::{MAX_TRUSTEES, MIN_THRESHOLD},
    csprng, PublicKey, RelaySet, SplitId, UtcDateTime, VaultId,
};
use secrecy::SecretBox;
use std::collections::BTreeMap;
use vsss_rs::{combine_shares, shamir};

/// Identifier for the field used by this implementation:
/// the order of the secp256k1 group.
pub const PRIME_MODULUS: &str =
    "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";

const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 6;
const CHUNK_LEN: usize = 31;
const CHUNK_MARKER: u8 = 0x01;

/// Splits secrets for one vault on behalf of its owner.
#[derive(Debug, Clone)]
pub struct SecretSplitter {
    vault_id: VaultId,
    creator: PublicKey,
    relays: RelaySet,
}

impl SecretSplitter {
    /// Create a splitter for a vault.
    pub fn new(vault_id: VaultId, creator: PublicKey, relays: RelaySet) -> Self {
        Self {
            vault_id,
            creator,
            relays,
        }
    }

    /// Split a secret into `total` shares any `threshold` of
    /// which reconstruct it.
    pub fn split(
        &self,
        secret: &[u8],
        threshold: u8,
        total: u8,
    ) -> Result<Vec<ShareRecord>> {
        if threshold < MIN_THRESHOLD || threshold > total || total > MAX_TRUSTEES
        {
            return Err(Error::InvalidThreshold {
                threshold,
                total,
                max: MAX_TRUSTEES,
            });
        }
        if secret.is_empty() {
            return Err(Error::EmptySecret);
        }
        let secret_len = u32::try_from(secret.len())
            .map_err(|_| Error::SecretTooLarge(secret.len()))?;

        let mut rng = csprng();
        let mut values: Vec<Vec<u8>> = Vec::new();
        let mut element_len: Option<usize> = None;
        for chunk in secret.chunks(CHUNK_LEN) {
            let element = encode_element(chunk)?;
            let element_shares = shamir::split_secret::<Scalar, u8, Vec<u8>>(
                threshold as usize,
                total as usize,
                element,
                &mut rng,
            )
            .map_err(|e| Error::Vsss(e.to_string()))?;

            if values.is_empty() {
                let len = element_shares.first().map(|s| s.len()).unwrap_or(0);
                if len == 0 || len > u8::MAX as usize {
                    return Err(Error::Vsss("unexpected share length".into()));
                }
                element_len = Some(len);
                for _ in 0..total {
                    let mut value = Vec::with_capacity(HEADER_LEN);
                    value.push(FORMAT_VERSION);
                    value.extend_from_slice(&secret_len.to_be_bytes());
                    value.push(len as u8);
                    values.push(value);
                }
            }

            for (value, share) in values.iter_mut().zip(element_shares) {
                if Some(share.len()) != element_len {
                    return Err(Error::Vsss("unexpected share length".into()));
                }
                value.extend_from_slice(&share);
            }
        }

        let split_id = SplitId::new_v4();
        let created_at = UtcDateTime::now();
        tracing::debug!(
            vault_id = %self.vault_id,
            split_id = %split_id,
            threshold = threshold,
            total = total,
            "shamir::split");

        Ok(values
            .into_iter()
            .enumerate()
            .map(|(index, share_value)| ShareRecord {
                share_value,
                share_index: index as u8 + 1,
                threshold,
                total_shares: total,
                prime_modulus: PRIME_MODULUS.to_string(),
                creator: self.creator.clone(),
                vault_id: self.vault_id,
                relays: self.relays.clone(),
                split_id,
                created_at,
                received_at: None,
            })
            .collect())
    }

    /// Reconstruct a secret from shares.
    ///
    /// The shares must all come from the same split and at least
    /// `threshold` distinct share indices must be present.
    pub fn reconstruct(shares: &[ShareRecord]) -> Result<SecretBox<Vec<u8>>> {
        let first = shares.first().ok_or(Error::NoShares)?;
        if !shares.iter().all(|share| first.is_compatible(share)) {
            return Err(Error::HeterogeneousShareSet);
        }
        if first.prime_modulus != PRIME_MODULUS {
            return Err(Error::PrimeMismatch {
                expected: PRIME_MODULUS.to_string(),
                actual: first.prime_modulus.clone(),
            });
        }

        let mut distinct: BTreeMap<u8, DecodedShare<'_>> = BTreeMap::new();
        for share in shares {
            if share.share_index == 0 || share.share_index > share.total_shares {
                return Err(Error::MalformedShare("share index out of range"));
            }
            distinct
                .entry(share.share_index)
                .or_insert(DecodedShare::parse(&share.share_value)?);
        }

        if distinct.len() < first.threshold as usize {
            return Err(Error::InsufficientShares {
                required: first.threshold,
                provided: distinct.len(),
            });
        }

        let selected: Vec<DecodedShare<'_>> = distinct
            .into_values()
            .take(first.threshold as usize)
            .collect();
        let reference = &selected[0];
        if selected.iter().any(|s| {
            s.secret_len != reference.secret_len
                || s.element_len != reference.element_len
                || s.elements.len() != reference.elements.len()
        }) {
            return Err(Error::HeterogeneousShareSet);
        }

        let mut secret = Vec::with_capacity(reference.secret_len);
        for position in 0..reference.elements.len() {
            let element_shares: Vec<Vec<u8>> = selected
                .iter()
                .map(|s| s.elements[position].to_vec())
                .collect();
            let element: Scalar = combine_shares(&element_shares)
                .map_err(|e| Error::Vsss(e.to_string()))?;
            let repr = element.to_repr();
            if repr[0] != CHUNK_MARKER {
                return Err(Error::MalformedShare("element marker mismatch"));
            }
            secret.extend_from_slice(&repr[1..]);
        }

        if secret.len() < reference.secret_len {
            return Err(Error::MalformedShare("secret length mismatch"));
        }
        secret.truncate(reference.secret_len);
        Ok(SecretBox::new(Box::new(secret)))
    }
}

fn encode_element(chunk: &[u8]) -> Result<Scalar> {
    let mut repr = [0u8; 32];
    repr[0] = CHUNK_MARKER;
    repr[1..1 + chunk.len()].copy_from_slice(chunk);
    Option::<Scalar>::from(Scalar::from_repr(repr.into()))
        .ok_or(Error::MalformedShare("element out of range"))
}

/// View of an encoded share value.
struct DecodedShare<'a> {
    secret_len: usize,
    element_len: usize,
    elements: Vec<&'a [u8]>,
}

impl<'a> DecodedShare<'a> {
    fn parse(value: &'a [u8]) -> Result<Self> {
        if value.len() < HEADER_LEN {
            return Err(Error::MalformedShare("share value too short"));
        }
        if value[0] != FORMAT_VERSION {
            return Err(Error::MalformedShare("unknown share format"));
        }
        let secret_len =
            u32::from_be_bytes([value[1], value[2], value[3], value[4]]) as usize;
        let element_len = value[5] as usize;
        let body = &value[HEADER_LEN..];
        let expected_elements = secret_len.div_ceil(CHUNK_LEN);
        if secret_len == 0
            || element_len == 0
            || body.len() != expected_elements * element_len
        {
            return Err(Error::MalformedShare("share value length mismatch"));
        }
        Ok(Self {
            secret_len,
            element_len,
            elements: body.chunks(element_len).collect(),
        })
    }
}
