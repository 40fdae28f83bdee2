use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{
    ActorId, DomainError, DomainResult, LedgerEntryId, OrderId, ProductId, SupplyId,
};

use crate::book::Posting;

/// Why a balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MovementCause {
    SupplyIn,
    OrderOut,
    OrderReturn,
    ManualAdjust,
}

impl MovementCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementCause::SupplyIn => "supply-in",
            MovementCause::OrderOut => "order-out",
            MovementCause::OrderReturn => "order-return",
            MovementCause::ManualAdjust => "manual-adjust",
        }
    }
}

impl core::fmt::Display for MovementCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementCause {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supply-in" => Ok(MovementCause::SupplyIn),
            "order-out" => Ok(MovementCause::OrderOut),
            "order-return" => Ok(MovementCause::OrderReturn),
            "manual-adjust" => Ok(MovementCause::ManualAdjust),
            other => Err(DomainError::validation(format!(
                "unknown movement cause '{other}'"
            ))),
        }
    }
}

/// Who/what caused a batch of postings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerContext {
    pub actor: Option<ActorId>,
    pub order_id: Option<OrderId>,
    pub supply_id: Option<SupplyId>,
    pub note: String,
}

impl LedgerContext {
    pub fn for_order(actor: Option<ActorId>, order_id: OrderId, note: impl Into<String>) -> Self {
        Self {
            actor,
            order_id: Some(order_id),
            supply_id: None,
            note: note.into(),
        }
    }

    pub fn for_supply(actor: Option<ActorId>, supply_id: SupplyId, note: impl Into<String>) -> Self {
        Self {
            actor,
            order_id: None,
            supply_id: Some(supply_id),
            note: note.into(),
        }
    }

    pub fn manual(actor: Option<ActorId>, note: impl Into<String>) -> Self {
        Self {
            actor,
            note: note.into(),
            ..Self::default()
        }
    }
}

/// Immutable audit record of one balance change.
///
/// Entries are append-only: once recorded they are never updated or deleted.
/// The order / supply links are nulled by the store when the referenced
/// document is purged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub product_id: ProductId,
    pub change: i64,
    pub balance_after: i64,
    pub cause: MovementCause,
    pub actor: Option<ActorId>,
    pub order_id: Option<OrderId>,
    pub supply_id: Option<SupplyId>,
    pub note: String,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn record(posting: &Posting, ctx: &LedgerContext, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: LedgerEntryId::new(),
            product_id: posting.product_id,
            change: posting.change,
            balance_after: posting.balance_after,
            cause: posting.cause,
            actor: ctx.actor,
            order_id: ctx.order_id,
            supply_id: ctx.supply_id,
            note: ctx.note.clone(),
            recorded_at,
        }
    }

    /// One entry per posting, sharing the same context and timestamp.
    pub fn record_all(
        postings: &[Posting],
        ctx: &LedgerContext,
        recorded_at: DateTime<Utc>,
    ) -> Vec<Self> {
        postings
            .iter()
            .map(|p| Self::record(p, ctx, recorded_at))
            .collect()
    }
}

// -------------------------
// Read-only aggregations
// -------------------------

/// Sum of signed changes per product.
pub fn net_change_by_product(entries: &[LedgerEntry]) -> BTreeMap<ProductId, i64> {
    let mut out = BTreeMap::new();
    for e in entries {
        let total = out.entry(e.product_id).or_insert(0i64);
        *total = total.saturating_add(e.change);
    }
    out
}

/// Replay a product's entries (oldest first) from an opening balance.
///
/// Every snapshot must equal the running balance; returns the closing balance.
pub fn replay_balance<'a>(
    opening: i64,
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
) -> DomainResult<i64> {
    let mut balance = opening;
    for e in entries {
        balance = balance.checked_add(e.change).ok_or_else(|| {
            DomainError::invariant(format!("ledger entry {} overflows the balance", e.id))
        })?;
        if e.balance_after != balance {
            return Err(DomainError::invariant(format!(
                "ledger entry {} records balance {} but replay gives {}",
                e.id, e.balance_after, balance
            )));
        }
    }
    Ok(balance)
}
