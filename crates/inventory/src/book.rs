use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, ProductId};

use crate::ledger::MovementCause;
use crate::lines::LineDelta;

/// A requested change to one product's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub product_id: ProductId,
    /// Signed balance change (negative takes stock out).
    pub change: i64,
    pub cause: MovementCause,
}

impl Movement {
    /// Take `quantity` out of stock for an order.
    pub fn reserve(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            change: -quantity,
            cause: MovementCause::OrderOut,
        }
    }

    /// Hand `quantity` back to stock from an order.
    pub fn release(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            change: quantity,
            cause: MovementCause::OrderReturn,
        }
    }

    /// Credit `quantity` received with a supply.
    pub fn receive(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            change: quantity,
            cause: MovementCause::SupplyIn,
        }
    }

    /// Operator correction.
    pub fn adjust(product_id: ProductId, change: i64) -> Self {
        Self {
            product_id,
            change,
            cause: MovementCause::ManualAdjust,
        }
    }

    /// Order-out for a positive delta, order-return for a negative one.
    pub fn from_delta(delta: LineDelta) -> Self {
        if delta.delta > 0 {
            Self::reserve(delta.product_id, delta.delta)
        } else {
            Self::release(delta.product_id, -delta.delta)
        }
    }
}

/// A product's balance as read inside the current transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAccount {
    pub product_id: ProductId,
    pub name: String,
    pub balance: i64,
}

/// A movement that has been applied, with the resulting balance snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub product_id: ProductId,
    pub change: i64,
    pub balance_after: i64,
    pub cause: MovementCause,
}

/// Balances of the products touched by one operation.
///
/// `post` checks every movement against the balances first and only then
/// applies them, so a rejected batch leaves the book untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockBook {
    accounts: BTreeMap<ProductId, StockAccount>,
}

impl StockBook {
    pub fn new(accounts: impl IntoIterator<Item = StockAccount>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|a| (a.product_id, a))
                .collect(),
        }
    }

    pub fn balance(&self, product_id: ProductId) -> Option<i64> {
        self.accounts.get(&product_id).map(|a| a.balance)
    }

    /// Apply a batch of movements atomically.
    ///
    /// Zero-change movements are skipped. Fails with `InsufficientStock` when a
    /// movement would drive a balance below zero, with `Validation` when a
    /// balance would leave the `i64` range and with `NotFound` for a product
    /// that was not loaded into the book.
    pub fn post(&mut self, movements: &[Movement]) -> DomainResult<Vec<Posting>> {
        let mut scratch: BTreeMap<ProductId, i64> = BTreeMap::new();
        let mut postings = Vec::with_capacity(movements.len());

        for movement in movements.iter().filter(|m| m.change != 0) {
            let account = self
                .accounts
                .get(&movement.product_id)
                .ok_or_else(|| DomainError::not_found(format!("product {}", movement.product_id)))?;

            let current = scratch
                .get(&movement.product_id)
                .copied()
                .unwrap_or(account.balance);
            let out_of_range = || {
                DomainError::validation(format!(
                    "stock change {} for {} is out of range",
                    movement.change, account.name
                ))
            };
            let next = current.checked_add(movement.change).ok_or_else(out_of_range)?;
            if next < 0 {
                return Err(DomainError::InsufficientStock {
                    product: account.name.clone(),
                    requested: movement.change.checked_neg().ok_or_else(out_of_range)?,
                    available: current,
                });
            }

            scratch.insert(movement.product_id, next);
            postings.push(Posting {
                product_id: movement.product_id,
                change: movement.change,
                balance_after: next,
                cause: movement.cause,
            });
        }

        for (product_id, balance) in scratch {
            if let Some(account) = self.accounts.get_mut(&product_id) {
                account.balance = balance;
            }
        }

        Ok(postings)
    }
}
