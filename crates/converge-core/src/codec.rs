//! Bidirectional lookup between a closed vocabulary and its wire names
//!
//! A vocabulary declares its variants and the wire name of each one. An
//! [`EnumCodec`] is built from that declaration once, checked for duplicate
//! names, and then handed by reference (usually behind an `Arc`) to whatever
//! needs to translate in either direction.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// A small closed set of values with a stable wire representation.
pub trait Vocabulary: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Name of the vocabulary, used in error messages.
    const NAME: &'static str;

    /// Every variant, in declaration order.
    const VARIANTS: &'static [Self];

    /// Wire name of this variant.
    fn wire_name(self) -> &'static str;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("{vocabulary}: wire name '{name}' is declared more than once")]
    DuplicateName {
        vocabulary: &'static str,
        name: &'static str,
    },

    #[error("{vocabulary}: unknown value '{name}' (expected one of: {expected})")]
    UnknownName {
        vocabulary: &'static str,
        name: String,
        expected: String,
    },
}

/// Immutable two-way table for a [`Vocabulary`].
#[derive(Debug, Clone)]
pub struct EnumCodec<T: Vocabulary> {
    by_name: HashMap<&'static str, T>,
}

impl<T: Vocabulary> EnumCodec<T> {
    pub fn new() -> Result<Self, CodecError> {
        let mut by_name = HashMap::with_capacity(T::VARIANTS.len());
        for &variant in T::VARIANTS {
            let name = variant.wire_name();
            if by_name.insert(name, variant).is_some() {
                return Err(CodecError::DuplicateName {
                    vocabulary: T::NAME,
                    name,
                });
            }
        }
        Ok(Self { by_name })
    }

    pub fn encode(&self, value: T) -> &'static str {
        value.wire_name()
    }

    pub fn decode(&self, name: &str) -> Option<T> {
        self.by_name.get(name).copied()
    }

    /// Like [`decode`](Self::decode), but reports the accepted names on failure.
    pub fn parse(&self, name: &str) -> Result<T, CodecError> {
        self.decode(name).ok_or_else(|| CodecError::UnknownName {
            vocabulary: T::NAME,
            name: name.to_string(),
            expected: self.names().join(", "),
        })
    }

    /// Wire names in declaration order.
    pub fn names(&self) -> Vec<&'static str> {
        T::VARIANTS.iter().map(|v| v.wire_name()).collect()
    }
}
