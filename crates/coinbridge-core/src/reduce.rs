//! Consensus over multi-provider answers.
//!
//! [`check_conflicts`] verifies that every provider returned the same
//! answer; [`reduce_results`] collapses the agreed answers into one value,
//! keeping the first-configured provider's view and folding in every other
//! provider's wallet metadata.

use std::fmt;

use crate::amount::SatoshiAmount;
use crate::error::CoreError;
use crate::types::{Address, ProviderId, SpendableOutput, Transaction, Wallet};

// ==============================================================================
// Agreement
// ==============================================================================

/// Why two provider answers were judged different.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disagreement {
    Value,
    Length { left: usize, right: usize },
    Element { index: usize },
}

impl fmt::Display for Disagreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => write!(f, "values differ"),
            Self::Length { left, right } => write!(f, "lengths differ ({left} vs {right})"),
            Self::Element { index } => write!(f, "element {index} differs"),
        }
    }
}

/// Comparison used by the conflict check.
///
/// Scalars compare by equality; sequences compare length first, then
/// element by element in the order the providers returned them.
pub trait Agreement {
    fn agreement(&self, other: &Self) -> Result<(), Disagreement>;
}

macro_rules! agree_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Agreement for $ty {
                fn agreement(&self, other: &Self) -> Result<(), Disagreement> {
                    if self == other {
                        Ok(())
                    } else {
                        Err(Disagreement::Value)
                    }
                }
            }

            impl Reducible for $ty {}
        )*
    };
}

agree_by_eq!(SatoshiAmount, String, bool, SpendableOutput, Transaction, Address);

// `provider_data` is provider-specific by construction and never compared.
impl Agreement for Wallet {
    fn agreement(&self, other: &Self) -> Result<(), Disagreement> {
        if self.name == other.name && self.addresses == other.addresses {
            Ok(())
        } else {
            Err(Disagreement::Value)
        }
    }
}

impl<T: Agreement> Agreement for Vec<T> {
    fn agreement(&self, other: &Self) -> Result<(), Disagreement> {
        if self.len() != other.len() {
            return Err(Disagreement::Length {
                left: self.len(),
                right: other.len(),
            });
        }
        for (index, (a, b)) in self.iter().zip(other).enumerate() {
            if a.agreement(b).is_err() {
                return Err(Disagreement::Element { index });
            }
        }
        Ok(())
    }
}

/// Compare adjacent provider answers and fail on the first mismatch.
///
/// Fewer than two answers never conflict. Answers that hold the same items
/// in a different order are reported as a conflict.
pub fn check_conflicts<T: Agreement>(
    operation: &'static str,
    results: &[(ProviderId, T)],
) -> Result<(), CoreError> {
    for pair in results.windows(2) {
        let (left, a) = &pair[0];
        let (right, b) = &pair[1];
        a.agreement(b).map_err(|detail| CoreError::Conflict {
            operation,
            left: left.clone(),
            right: right.clone(),
            detail,
        })?;
    }
    Ok(())
}

// ==============================================================================
// Reduction
// ==============================================================================

/// A value that can absorb another provider's agreeing answer.
///
/// The default keeps the canonical value untouched.
pub trait Reducible: Agreement + Sized {
    fn absorb(&mut self, _provider: &ProviderId, _other: Self) -> Result<(), CoreError> {
        Ok(())
    }
}

impl Reducible for Wallet {
    fn absorb(&mut self, provider: &ProviderId, mut other: Self) -> Result<(), CoreError> {
        if other.name != self.name {
            return Err(CoreError::ResultReduction(format!(
                "provider `{provider}` returned wallet `{}` where `{}` was expected",
                other.name, self.name
            )));
        }
        // Only the provider's own entry is trusted; anything else it echoes
        // back may be stale.
        if let Some(data) = other.provider_data.remove(provider) {
            self.provider_data
                .entry(provider.clone())
                .or_default()
                .extend(data);
        }
        Ok(())
    }
}

impl<T: Reducible> Reducible for Vec<T> {
    fn absorb(&mut self, provider: &ProviderId, other: Self) -> Result<(), CoreError> {
        if other.len() != self.len() {
            return Err(CoreError::ResultReduction(format!(
                "provider `{provider}` returned {} items, expected {}",
                other.len(),
                self.len()
            )));
        }
        for (mine, theirs) in self.iter_mut().zip(other) {
            mine.absorb(provider, theirs)?;
        }
        Ok(())
    }
}

/// Collapse agreed provider answers into one value.
///
/// The first entry wins; every later entry is absorbed into it so that
/// per-provider wallet metadata from all providers survives.
pub fn reduce_results<T: Reducible>(
    operation: &'static str,
    results: Vec<(ProviderId, T)>,
) -> Result<T, CoreError> {
    let mut results = results.into_iter();
    let (_, mut canonical) = results
        .next()
        .ok_or_else(|| CoreError::ResultReduction(format!("{operation}: no provider results")))?;
    for (provider, value) in results {
        canonical.absorb(&provider, value)?;
    }
    Ok(canonical)
}
