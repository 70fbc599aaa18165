//! The ledger surface the coordinators read from and write to.
//!
//! Accounts are keyed by their packed public key. Argument order of every
//! write call matches the deployed contract and must not be rearranged.

use crate::{
    curve::PackedPoint,
    encoding::EncryptedBalance,
    errors::{Error, Result},
    prover::Proof,
    Balance,
};

use codec::{Decode, Encode, MaxEncodedLen};
use core::{fmt, str::FromStr};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};

/// A 20-byte ledger address.
#[derive(
    Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, MaxEncodedLen, TypeInfo,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Parses a `0x`-prefixed string of exactly 40 hex digits.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::AddressValidationError {
            address: s.to_string(),
        };
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(invalid)?;
        ensure!(digits.len() == 40, invalid());
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| invalid())?;
        Ok(Self(bytes))
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// The hash of a submitted ledger transaction.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, Encode, Decode, TypeInfo)]
pub struct TxHandle(pub [u8; 32]);

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHandle({self})")
    }
}

/// A staged cleartext deposit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct PendingDeposit {
    pub amount: Balance,
    pub fee: Balance,
}

/// A staged encrypted transfer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct PendingTransfer {
    pub amount: EncryptedBalance,
    pub fee: Balance,
}

/// Read and write calls against the confidential balance contract.
///
/// Implementations map contract reverts and malformed responses to
/// `ChainCallError`.
#[allow(async_fn_in_trait)]
pub trait Ledger {
    async fn balances(&self, account: &PackedPoint) -> Result<EncryptedBalance>;

    async fn pending_deposit_counts(&self, account: &PackedPoint) -> Result<u64>;

    async fn all_pending_deposits_mapping(
        &self,
        account: &PackedPoint,
        index: u64,
    ) -> Result<PendingDeposit>;

    async fn pending_transfer_counts(&self, account: &PackedPoint) -> Result<u64>;

    async fn all_pending_transfers_mapping(
        &self,
        account: &PackedPoint,
        index: u64,
    ) -> Result<PendingTransfer>;

    async fn deposit(&self, amount: Balance, to: &PackedPoint, fee: Balance) -> Result<TxHandle>;

    #[allow(clippy::too_many_arguments)]
    async fn transfer(
        &self,
        to: &PackedPoint,
        from: &PackedPoint,
        process_fee: Balance,
        relay_fee: Balance,
        relay_fee_recipient: &Address,
        encrypted_amount: &EncryptedBalance,
        new_balance: &EncryptedBalance,
        proof: &Proof,
    ) -> Result<TxHandle>;

    #[allow(clippy::too_many_arguments)]
    async fn withdraw(
        &self,
        from: &PackedPoint,
        to: &Address,
        amount: Balance,
        relay_fee: Balance,
        relay_fee_recipient: &Address,
        proof: &Proof,
        new_balance: &EncryptedBalance,
    ) -> Result<TxHandle>;

    async fn process_pending_deposit(
        &self,
        proof: &Proof,
        indexes: &[u64],
        relay_fee_recipient: &Address,
        account: &PackedPoint,
        zero_balance: &EncryptedBalance,
        new_balance: &EncryptedBalance,
    ) -> Result<TxHandle>;

    async fn process_pending_transfer(
        &self,
        proof: &Proof,
        indexes: &[u64],
        process_fee_recipient: &Address,
        account: &PackedPoint,
        new_balance: &EncryptedBalance,
    ) -> Result<TxHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parsing() {
        let addr = Address::parse("0x00000000000000000000000000000000000000Ab").unwrap();
        assert_eq!(addr.0[19], 0xab);
        assert_eq!(addr.to_string(), "0x00000000000000000000000000000000000000ab");
        assert_eq!("0x00000000000000000000000000000000000000ab".parse::<Address>(), Ok(addr));

        for bad in [
            "",
            "0x",
            "00000000000000000000000000000000000000ab",
            "0x00000000000000000000000000000000000000a",
            "0x00000000000000000000000000000000000000abc",
            "0x00000000000000000000000000000000000000zz",
        ] {
            assert_eq!(
                Address::parse(bad),
                Err(Error::AddressValidationError {
                    address: bad.to_string()
                })
            );
        }
    }

    #[test]
    fn address_serde() {
        let addr = Address([0x11; 20]);
        let value = toml::Value::try_from(addr).unwrap();
        assert_eq!(value.as_str(), Some("0x1111111111111111111111111111111111111111"));
        let back: Address = value.try_into().unwrap();
        assert_eq!(back, addr);
    }
}
