use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSignUp {
    pub transaction_hash: B256,
    pub identity_commitment: B256,
    pub hashed_leaf: B256,
    pub epoch: u64,
}

/// One sign-up per identity commitment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpStore {
    by_commitment: BTreeMap<B256, UserSignUp>,
}

impl SignUpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Ok(true)` when this exact sign-up is already stored.
    pub fn check(&self, sign_up: &UserSignUp) -> Result<bool, StoreError> {
        match self.by_commitment.get(&sign_up.identity_commitment) {
            None => Ok(false),
            Some(existing) if existing == sign_up => Ok(true),
            Some(existing) => Err(StoreError::DuplicateSignUp {
                commitment: sign_up.identity_commitment,
                first_tx: existing.transaction_hash,
            }),
        }
    }

    pub fn insert(&mut self, sign_up: UserSignUp) -> Result<bool, StoreError> {
        if self.check(&sign_up)? {
            return Ok(false);
        }
        self.by_commitment
            .insert(sign_up.identity_commitment, sign_up);
        Ok(true)
    }

    pub fn get(&self, identity_commitment: &B256) -> Option<&UserSignUp> {
        self.by_commitment.get(identity_commitment)
    }

    pub fn len(&self) -> usize {
        self.by_commitment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_commitment.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_up(tx: u8) -> UserSignUp {
        UserSignUp {
            transaction_hash: B256::repeat_byte(tx),
            identity_commitment: B256::repeat_byte(0xC0),
            hashed_leaf: B256::repeat_byte(0x1E),
            epoch: 1,
        }
    }

    #[test]
    fn test_one_sign_up_per_commitment() {
        let mut store = SignUpStore::new();
        assert_eq!(store.insert(sign_up(1)), Ok(true));
        assert_eq!(
            store.insert(sign_up(2)),
            Err(StoreError::DuplicateSignUp {
                commitment: B256::repeat_byte(0xC0),
                first_tx: B256::repeat_byte(1),
            })
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_identical_sign_up_is_noop() {
        let mut store = SignUpStore::new();
        store.insert(sign_up(1)).unwrap();
        assert_eq!(store.insert(sign_up(1)), Ok(false));
        assert_eq!(store.get(&B256::repeat_byte(0xC0)), Some(&sign_up(1)));
    }
}
