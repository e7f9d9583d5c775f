use alloy::primitives::{B256, U256};
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use light_poseidon::{Poseidon, PoseidonHasher};

/// Domain separator for epoch-key nullifiers.
pub const EPOCH_KEY_NULLIFIER_DOMAIN: u64 = 1;

/// Domain separator for reputation nullifiers.
pub const REPUTATION_NULLIFIER_DOMAIN: u64 = 2;

/// Domain separator for attestation nullifiers.
pub const ATTESTATION_NULLIFIER_DOMAIN: u64 = 3;

/// Convert B256 to BN254 field element.
fn b256_to_fr(value: B256) -> Fr {
    Fr::from_be_bytes_mod_order(value.as_ref())
}

/// Convert BN254 field element to B256.
fn fr_to_b256(value: Fr) -> B256 {
    let big_int = value.into_bigint();
    let bytes = big_int.to_bytes_be();
    B256::from_slice(&bytes)
}

/// Encode an integer as a field element.
pub fn field(value: u64) -> B256 {
    B256::from(U256::from(value))
}

/// Interpret a field element as an unsigned 256-bit integer.
pub fn to_u256(value: B256) -> U256 {
    U256::from_be_bytes(value.0)
}

/// Whether `value` is a canonical BN254 scalar (strictly below the field modulus).
pub fn is_field_element(value: B256) -> bool {
    fr_to_b256(b256_to_fr(value)) == value
}

/// Reduce a value modulo `2^bits`, the index domain of a sparse tree of that depth.
pub fn reduce_to_bits(value: B256, bits: usize) -> B256 {
    if bits >= 256 {
        return value;
    }
    let mask = (U256::from(1u8) << bits) - U256::from(1u8);
    B256::from(to_u256(value) & mask)
}

/// Poseidon hash over an arbitrary (1..=12) number of inputs.
pub fn poseidon(inputs: &[B256]) -> B256 {
    let mut hasher =
        Poseidon::<Fr>::new_circom(inputs.len()).expect("Failed to create Poseidon hasher");
    let inputs: Vec<Fr> = inputs.iter().copied().map(b256_to_fr).collect();
    let result = hasher
        .hash(&inputs)
        .expect("Failed to compute Poseidon hash");
    fr_to_b256(result)
}

/// Poseidon hash with 2 inputs (binary Merkle nodes and hash chains).
pub fn hash_left_right(left: B256, right: B256) -> B256 {
    poseidon(&[left, right])
}

/// Poseidon hash with 5 inputs (leaves, nullifiers, epoch keys).
pub fn hash5(inputs: [B256; 5]) -> B256 {
    poseidon(&inputs)
}

/// Default leaf of the nullifier tree: `hash(0, 0)`.
pub fn smt_zero_leaf() -> B256 {
    hash_left_right(B256::ZERO, B256::ZERO)
}

/// Marker leaf `hash(1, 0)`: default of the epoch tree, "spent" in the nullifier tree.
/// It also equals a sealed empty hash chain.
pub fn smt_one_leaf() -> B256 {
    hash_left_right(field(1), B256::ZERO)
}
