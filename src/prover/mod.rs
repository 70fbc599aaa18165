//! The external prover capability.
//!
//! Coordinators hand a named-field input document to a `ProverClient` and get
//! opaque proof bytes back. How the prover runs is up to the implementation;
//! `NargoProver` drives the Noir toolchain through the filesystem.

use crate::{
    curve::{PackedPoint, Point},
    encoding::to_decimal,
    errors::{Error, Result},
};

use ark_ff::PrimeField;
use codec::{Decode, Encode};
use core::fmt;
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod nargo;

pub use nargo::NargoProver;

/// One value of a prover input document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    /// A field element or integer, as a decimal string.
    Field(String),
    /// Affine point coordinates, as decimal strings.
    Point { x: String, y: String },
    /// Raw bytes, rendered as an array of `u8`.
    Bytes(Vec<u8>),
    List(Vec<InputValue>),
}

impl InputValue {
    pub fn field<F: PrimeField>(value: &F) -> Self {
        Self::Field(to_decimal(value))
    }

    pub fn integer(value: u64) -> Self {
        Self::Field(value.to_string())
    }

    pub fn point(p: &Point) -> Self {
        Self::Point {
            x: to_decimal(&p.x()),
            y: to_decimal(&p.y()),
        }
    }

    /// `{x: 0, y: 0}`, the filler the fixed-size circuit inputs are padded with.
    pub fn zero_point() -> Self {
        Self::Point {
            x: "0".into(),
            y: "0".into(),
        }
    }

    pub fn packed(p: &PackedPoint) -> Self {
        Self::Bytes(p.0.to_vec())
    }
}

/// The named inputs of one proof request, in field-name order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofInputs(BTreeMap<String, InputValue>);

impl ProofInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: InputValue) -> &mut Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Renders the document in the `Prover.toml` format.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(&self.0)
            .map_err(|e| Error::ProofGenerationError(format!("cannot render prover inputs: {e}")))
    }
}

/// Opaque proof bytes.
#[derive(Clone, Default, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct Proof(pub Vec<u8>);

impl Proof {
    /// Parses a hex proof, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        hex::decode(digits)
            .map(Self)
            .map_err(|e| Error::ProofGenerationError(format!("malformed proof output: {e}")))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proof({} bytes)", self.0.len())
    }
}

/// Produces a proof for a named circuit.
///
/// A prover that errors, or exits without producing a proof, fails with
/// `ProofGenerationError`. Retrying is left to the caller.
#[allow(async_fn_in_trait)]
pub trait ProverClient {
    async fn prove(&self, circuit: &str, inputs: &ProofInputs) -> Result<Proof>;
}
