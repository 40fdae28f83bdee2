//! Order summary: ordered quantities per period and product.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, ProductId};

use crate::order::Order;

/// Bucket width for the summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryPeriod {
    Day,
    #[default]
    Month,
    Year,
}

impl SummaryPeriod {
    /// First day of the bucket containing `date`.
    pub fn bucket(&self, date: NaiveDate) -> NaiveDate {
        let start = match self {
            SummaryPeriod::Day => Some(date),
            SummaryPeriod::Month => date.with_day(1),
            SummaryPeriod::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1),
        };
        start.unwrap_or(date)
    }
}

impl core::str::FromStr for SummaryPeriod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(SummaryPeriod::Day),
            "month" => Ok(SummaryPeriod::Month),
            "year" => Ok(SummaryPeriod::Year),
            other => Err(DomainError::validation(format!(
                "unknown summary period '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub period: NaiveDate,
    pub product_name: String,
    pub total_quantity: i64,
}

/// Sum ordered quantities per (period, product name).
///
/// Only orders for which [`Order::counts_toward_summary`] holds are included;
/// `from` / `to` bound the creation date inclusively. Rows are ordered by
/// period, then product name. Products missing from `names` are skipped.
pub fn order_summary<'a>(
    orders: impl IntoIterator<Item = &'a Order>,
    names: &BTreeMap<ProductId, String>,
    period: SummaryPeriod,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Vec<SummaryRow> {
    let mut totals: BTreeMap<(NaiveDate, String), i64> = BTreeMap::new();

    for order in orders {
        if !order.counts_toward_summary() {
            continue;
        }
        let created = order.state().created_at.date_naive();
        if from.is_some_and(|f| created < f) || to.is_some_and(|t| created > t) {
            continue;
        }
        let bucket = period.bucket(created);
        for line in order.lines().to_lines() {
            if let Some(name) = names.get(&line.product_id) {
                let total = totals.entry((bucket, name.clone())).or_insert(0);
                *total = total.saturating_add(line.quantity);
            }
        }
    }

    totals
        .into_iter()
        .map(|((period, product_name), total_quantity)| SummaryRow {
            period,
            product_name,
            total_quantity,
        })
        .collect()
}

/// Orders grouped under their delivery date, earliest first.
///
/// Input order is kept inside each group.
pub fn group_by_delivery_date(orders: Vec<Order>) -> Vec<(NaiveDate, Vec<Order>)> {
    let mut groups: BTreeMap<NaiveDate, Vec<Order>> = BTreeMap::new();
    for order in orders {
        groups
            .entry(order.state().delivery_date)
            .or_default()
            .push(order);
    }
    groups.into_iter().collect()
}

/// Orders grouped by delivery month (first day of the month), newest first.
///
/// Inside a month, later delivery dates come first; ties keep input order.
pub fn group_by_delivery_month(orders: Vec<Order>) -> Vec<(NaiveDate, Vec<Order>)> {
    let mut groups: BTreeMap<NaiveDate, Vec<Order>> = BTreeMap::new();
    for order in orders {
        let month = SummaryPeriod::Month.bucket(order.state().delivery_date);
        groups.entry(month).or_default().push(order);
    }
    groups
        .into_iter()
        .rev()
        .map(|(month, mut orders)| {
            orders.sort_by(|a, b| b.state().delivery_date.cmp(&a.state().delivery_date));
            (month, orders)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use stockroom_core::OrderId;
    use stockroom_inventory::{LineSet, StockLine};

    use crate::order::{OrderState, OrderStatus};

    fn order_at(
        created: (i32, u32, u32),
        status: OrderStatus,
        archived: bool,
        lines: &[StockLine],
    ) -> Order {
        let (y, m, d) = created;
        Order::restore(
            OrderId::new(),
            OrderState {
                customer: "Northwind".to_string(),
                notes: None,
                delivery_date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
                shift_id: None,
                driver_id: None,
                car_id: None,
                status,
                archived,
                lines: LineSet::from_lines(lines).unwrap(),
                created_at: Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap(),
            },
            1,
        )
    }

    #[test]
    fn buckets_by_month_and_skips_ineligible_orders() {
        let film = ProductId::new();
        let tape = ProductId::new();
        let names = BTreeMap::from([
            (film, "Film".to_string()),
            (tape, "Tape".to_string()),
        ]);

        let orders = vec![
            order_at((2025, 1, 3), OrderStatus::Shipped, true, &[StockLine::new(film, 10)]),
            order_at((2025, 1, 20), OrderStatus::Loaded, false, &[StockLine::new(film, 5), StockLine::new(tape, 2)]),
            order_at((2025, 1, 21), OrderStatus::Loaded, true, &[StockLine::new(film, 100)]),
            order_at((2025, 1, 22), OrderStatus::Pending, false, &[StockLine::new(film, 100)]),
            order_at((2025, 1, 23), OrderStatus::Cancelled, false, &[StockLine::new(film, 100)]),
            order_at((2025, 2, 1), OrderStatus::Shipped, false, &[StockLine::new(tape, 7)]),
        ];

        let rows = order_summary(&orders, &names, SummaryPeriod::Month, None, None);
        let jan = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let feb = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        assert_eq!(
            rows,
            vec![
                SummaryRow { period: jan, product_name: "Film".into(), total_quantity: 15 },
                SummaryRow { period: jan, product_name: "Tape".into(), total_quantity: 2 },
                SummaryRow { period: feb, product_name: "Tape".into(), total_quantity: 7 },
            ]
        );
    }

    #[test]
    fn date_range_is_inclusive() {
        let p = ProductId::new();
        let names = BTreeMap::from([(p, "Film".to_string())]);
        let orders = vec![
            order_at((2025, 3, 1), OrderStatus::Shipped, false, &[StockLine::new(p, 1)]),
            order_at((2025, 3, 2), OrderStatus::Shipped, false, &[StockLine::new(p, 2)]),
            order_at((2025, 3, 3), OrderStatus::Shipped, false, &[StockLine::new(p, 4)]),
        ];
        let rows = order_summary(
            &orders,
            &names,
            SummaryPeriod::Year,
            NaiveDate::from_ymd_opt(2025, 3, 2),
            NaiveDate::from_ymd_opt(2025, 3, 3),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_quantity, 6);
        assert_eq!(rows[0].period, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn archived_listing_groups_newest_month_first() {
        let p = ProductId::new();
        let lines = [StockLine::new(p, 1)];
        let orders = vec![
            order_at((2025, 1, 5), OrderStatus::Shipped, true, &lines),
            order_at((2025, 3, 9), OrderStatus::Shipped, true, &lines),
            order_at((2025, 1, 28), OrderStatus::Cancelled, true, &lines),
        ];
        let groups = group_by_delivery_month(orders);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        let january: Vec<NaiveDate> = groups[1].1.iter().map(|o| o.state().delivery_date).collect();
        assert_eq!(
            january,
            vec![
                NaiveDate::from_ymd_opt(2025, 1, 28).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            ]
        );

        let by_day = group_by_delivery_date(groups.into_iter().flat_map(|(_, o)| o).collect());
        assert_eq!(by_day.len(), 3);
        assert_eq!(by_day[0].0, NaiveDate::from_ymd_opt(2025, 1, 5).unwrap());
    }

    #[test]
    fn huge_quantities_saturate_instead_of_overflowing() {
        let p = ProductId::new();
        let names = BTreeMap::from([(p, "Film".to_string())]);
        let orders = vec![
            order_at((2025, 3, 1), OrderStatus::Shipped, false, &[StockLine::new(p, i64::MAX)]),
            order_at((2025, 3, 2), OrderStatus::Shipped, false, &[StockLine::new(p, 5)]),
        ];
        let rows = order_summary(&orders, &names, SummaryPeriod::Month, None, None);
        assert_eq!(rows[0].total_quantity, i64::MAX);
    }

    #[test]
    fn unknown_period_is_rejected() {
        assert!("week".parse::<SummaryPeriod>().is_err());
        assert_eq!("day".parse::<SummaryPeriod>().unwrap(), SummaryPeriod::Day);
    }

    proptest! {
        #[test]
        fn bucketing_never_changes_the_grand_total(
            quantities in proptest::collection::vec((1u32..28, 1i64..500), 1..30),
        ) {
            let p = ProductId::new();
            let names = BTreeMap::from([(p, "Film".to_string())]);
            let orders: Vec<Order> = quantities
                .iter()
                .map(|(day, q)| order_at((2025, 5, *day), OrderStatus::Shipped, false, &[StockLine::new(p, *q)]))
                .collect();
            let expected: i64 = quantities.iter().map(|(_, q)| q).sum();

            for period in [SummaryPeriod::Day, SummaryPeriod::Month, SummaryPeriod::Year] {
                let rows = order_summary(&orders, &names, period, None, None);
                let total: i64 = rows.iter().map(|r| r.total_quantity).sum();
                prop_assert_eq!(total, expected);
            }
        }
    }
}
