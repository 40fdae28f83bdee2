use chrono::{DateTime, NaiveDate, Utc};

use stockroom_core::{DomainError, DomainResult, ShiftId};

use crate::shift::Shift;

/// An order is fulfilled immediately when it is due today or earlier.
pub fn is_immediate(delivery_date: NaiveDate, today: NaiveDate) -> bool {
    delivery_date <= today
}

/// The system-wide shift switch, as read inside the current transaction.
///
/// Built from the store's single active shift (if any); every decision that
/// depends on whether a shift is open goes through this value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShiftGate {
    active: Option<Shift>,
}

impl ShiftGate {
    pub fn new(active: Option<Shift>) -> Self {
        Self { active }
    }

    pub fn active(&self) -> Option<&Shift> {
        self.active.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// Open a new shift. Fails with `AlreadyActive` while one is open.
    pub fn start(&self, id: ShiftId, at: DateTime<Utc>) -> DomainResult<Shift> {
        if self.active.is_some() {
            return Err(DomainError::AlreadyActive);
        }
        Ok(Shift::open(id, at))
    }

    /// Close the open shift. Fails with `NoActiveShift` when none is open.
    pub fn end(&self, at: DateTime<Utc>) -> DomainResult<Shift> {
        self.active
            .as_ref()
            .map(|s| s.closed_at(at))
            .ok_or(DomainError::NoActiveShift)
    }

    /// Shift an order created now should be bound to.
    ///
    /// Immediate orders need an open shift and get bound to it; future orders
    /// are never bound.
    pub fn shift_for(&self, delivery_date: NaiveDate, today: NaiveDate) -> DomainResult<Option<ShiftId>> {
        if !is_immediate(delivery_date, today) {
            return Ok(None);
        }
        self.active
            .as_ref()
            .map(|s| Some(s.id))
            .ok_or(DomainError::NoActiveShift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn start_twice_is_already_active() {
        let gate = ShiftGate::default();
        let shift = gate.start(ShiftId::new(), Utc::now()).unwrap();
        assert!(shift.active);

        let gate = ShiftGate::new(Some(shift));
        assert_eq!(
            gate.start(ShiftId::new(), Utc::now()),
            Err(DomainError::AlreadyActive)
        );
    }

    #[test]
    fn end_without_open_shift_fails() {
        assert_eq!(
            ShiftGate::default().end(Utc::now()),
            Err(DomainError::NoActiveShift)
        );
    }

    #[test]
    fn end_closes_the_open_shift() {
        let open = Shift::open(ShiftId::new(), Utc::now());
        let closed = ShiftGate::new(Some(open.clone())).end(Utc::now()).unwrap();
        assert_eq!(closed.id, open.id);
        assert!(!closed.active);
        assert!(closed.ended_at.is_some());
    }

    #[test]
    fn immediate_orders_need_an_open_shift() {
        let closed = ShiftGate::default();
        assert_eq!(closed.shift_for(day(10), day(10)), Err(DomainError::NoActiveShift));
        assert_eq!(closed.shift_for(day(9), day(10)), Err(DomainError::NoActiveShift));
        assert_eq!(closed.shift_for(day(11), day(10)), Ok(None));

        let open = Shift::open(ShiftId::new(), Utc::now());
        let gate = ShiftGate::new(Some(open.clone()));
        assert_eq!(gate.shift_for(day(10), day(10)), Ok(Some(open.id)));
        assert_eq!(gate.shift_for(day(11), day(10)), Ok(None));
    }
}
