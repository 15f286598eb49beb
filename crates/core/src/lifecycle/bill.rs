//! Bill lifecycle.
//!
//! Totals are computed once at creation and never recomputed here. Payment confirmation moves
//! a pending or partially paid bill to paid; an admin may cancel any bill that is not already
//! cancelled.

use super::{Collection, EntityMeta, Lifecycle, StatusBearing, TransitionAction};
use crate::constants::BILL_NUMBER_PREFIX;
use crate::error::{TransitionError, TransitionResult};
use crate::permissions::{Actor, Capability};
use chrono::{DateTime, Utc};
use clinic_types::{Money, NonEmptyText};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl Lifecycle for BillStatus {
    const TRANSITIONS: &'static [(Self, Self)] = &[
        (BillStatus::Pending, BillStatus::Paid),
        (BillStatus::PartiallyPaid, BillStatus::Paid),
        (BillStatus::Pending, BillStatus::Cancelled),
        (BillStatus::PartiallyPaid, BillStatus::Cancelled),
        (BillStatus::Paid, BillStatus::Cancelled),
    ];

    fn as_str(self) -> &'static str {
        match self {
            BillStatus::Pending => "pending",
            BillStatus::PartiallyPaid => "partially_paid",
            BillStatus::Paid => "paid",
            BillStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillItem {
    pub description: NonEmptyText,
    pub quantity: u32,
    pub unit_price: Money,
    pub total: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medicine_id: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBillItem {
    pub description: NonEmptyText,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default)]
    pub medicine_id: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBill {
    pub patient_id: Uuid,
    pub items: Vec<NewBillItem>,
    #[serde(default)]
    pub discount: Money,
    /// Amount collected at the counter when the bill is raised.
    #[serde(default)]
    pub initial_payment: Option<Money>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BillAction {
    ConfirmPayment,
    Cancel,
}

impl TransitionAction for BillAction {
    type Status = BillStatus;

    fn target(&self) -> BillStatus {
        match self {
            BillAction::ConfirmPayment => BillStatus::Paid,
            BillAction::Cancel => BillStatus::Cancelled,
        }
    }

    fn capability(&self) -> Capability {
        match self {
            BillAction::ConfirmPayment => Capability::UpdateInvoiceStatus,
            BillAction::Cancel => Capability::CancelInvoice,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub bill_number: String,
    pub patient_id: Uuid,
    pub items: Vec<BillItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub gst_amount: Money,
    pub grand_total: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_amount: Option<Money>,
    pub status: BillStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    pub created_by: String,
    #[serde(flatten)]
    pub meta: EntityMeta,
}

impl Bill {
    /// Totals the items and raises a bill.
    ///
    /// GST is charged on `subtotal - discount` at `gst_rate_bps` basis points.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::ValidationFailed`] if:
    /// - there are no items or an item has zero quantity,
    /// - the discount exceeds the subtotal,
    /// - the initial payment covers the whole bill (use payment confirmation instead),
    /// - any amount overflows.
    pub fn new(
        input: NewBill,
        gst_rate_bps: u32,
        created_by: &Actor,
        now: DateTime<Utc>,
    ) -> TransitionResult<Self> {
        if input.items.is_empty() {
            return Err(TransitionError::ValidationFailed(
                "a bill needs at least one item".into(),
            ));
        }

        let mut items = Vec::with_capacity(input.items.len());
        let mut subtotal = Money::ZERO;
        for item in input.items {
            if item.quantity == 0 {
                return Err(TransitionError::ValidationFailed(format!(
                    "item '{}' has zero quantity",
                    item.description
                )));
            }
            let total = item.unit_price.checked_mul(item.quantity)?;
            subtotal = subtotal.checked_add(total)?;
            items.push(BillItem {
                description: item.description,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total,
                medicine_id: item.medicine_id,
            });
        }

        let taxable = subtotal.checked_sub(input.discount).map_err(|_| {
            TransitionError::ValidationFailed(format!(
                "discount {} exceeds subtotal {}",
                input.discount, subtotal
            ))
        })?;
        let gst_amount = taxable.apply_basis_points(gst_rate_bps)?;
        let grand_total = taxable.checked_add(gst_amount)?;

        let (status, paid_amount) = match input.initial_payment.filter(|p| !p.is_zero()) {
            None => (BillStatus::Pending, None),
            Some(paid) if paid < grand_total => (BillStatus::PartiallyPaid, Some(paid)),
            Some(paid) => {
                return Err(TransitionError::ValidationFailed(format!(
                    "initial payment {paid} covers the grand total {grand_total}; confirm payment instead"
                )))
            }
        };

        let id = Uuid::new_v4();
        Ok(Self {
            id,
            bill_number: bill_number(id, now),
            patient_id: input.patient_id,
            items,
            subtotal,
            discount: input.discount,
            gst_amount,
            grand_total,
            paid_amount,
            status,
            paid_at: None,
            created_by: created_by.id().to_string(),
            meta: EntityMeta::new(now),
        })
    }

    /// Amount still owed. Cancelled bills owe nothing.
    pub fn outstanding(&self) -> Money {
        match self.status {
            BillStatus::Cancelled | BillStatus::Paid => Money::ZERO,
            _ => self
                .grand_total
                .checked_sub(self.paid_amount.unwrap_or(Money::ZERO))
                .unwrap_or(Money::ZERO),
        }
    }
}

fn bill_number(id: Uuid, now: DateTime<Utc>) -> String {
    let suffix = id.simple().to_string()[..6].to_uppercase();
    format!("{BILL_NUMBER_PREFIX}-{}-{suffix}", now.format("%Y%m%d"))
}

impl StatusBearing for Bill {
    type Status = BillStatus;
    type Action = BillAction;

    const COLLECTION: Collection = Collection::Bills;

    fn id(&self) -> Uuid {
        self.id
    }

    fn patient_id(&self) -> Uuid {
        self.patient_id
    }

    fn status(&self) -> BillStatus {
        self.status
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn validate(&self, _action: &BillAction) -> TransitionResult<()> {
        Ok(())
    }

    fn apply(&mut self, action: BillAction, _actor: &Actor, at: DateTime<Utc>) {
        self.status = action.target();
        if action == BillAction::ConfirmPayment {
            self.paid_amount = Some(self.grand_total);
            self.paid_at = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Role;

    fn reception() -> Actor {
        Actor::new(NonEmptyText::new("desk-1").unwrap(), Role::Reception)
    }

    fn item(description: &str, quantity: u32, unit_price: i64) -> NewBillItem {
        NewBillItem {
            description: NonEmptyText::new(description).unwrap(),
            quantity,
            unit_price: Money::from_minor(unit_price).unwrap(),
            medicine_id: None,
        }
    }

    fn new_bill(items: Vec<NewBillItem>, discount: i64, paid: Option<i64>) -> NewBill {
        NewBill {
            patient_id: Uuid::new_v4(),
            items,
            discount: Money::from_minor(discount).unwrap(),
            initial_payment: paid.map(|p| Money::from_minor(p).unwrap()),
        }
    }

    #[test]
    fn totals_follow_grand_total_formula() {
        let input = new_bill(
            vec![item("Consultation", 1, 50_000), item("Amoxicillin strip", 2, 8_000)],
            6_000,
            None,
        );
        let bill = Bill::new(input, 1_800, &reception(), Utc::now()).unwrap();

        assert_eq!(bill.subtotal.minor(), 66_000);
        assert_eq!(bill.items[1].total.minor(), 16_000);
        // 18% of 600.00
        assert_eq!(bill.gst_amount.minor(), 10_800);
        assert_eq!(
            bill.grand_total.minor(),
            bill.subtotal.minor() - bill.discount.minor() + bill.gst_amount.minor()
        );
        assert_eq!(bill.status, BillStatus::Pending);
        assert!(bill.paid_amount.is_none());
    }

    #[test]
    fn partial_initial_payment_marks_partially_paid() {
        let bill = Bill::new(
            new_bill(vec![item("Consultation", 1, 50_000)], 0, Some(20_000)),
            0,
            &reception(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(bill.status, BillStatus::PartiallyPaid);
        assert_eq!(bill.outstanding().minor(), 30_000);
    }

    #[test]
    fn full_initial_payment_is_rejected() {
        let err = Bill::new(
            new_bill(vec![item("Consultation", 1, 50_000)], 0, Some(50_000)),
            0,
            &reception(),
            Utc::now(),
        )
        .expect_err("full payment goes through confirmation");
        assert!(matches!(err, TransitionError::ValidationFailed(_)));
    }

    #[test]
    fn discount_above_subtotal_is_rejected() {
        let err = Bill::new(
            new_bill(vec![item("Dressing", 1, 1_000)], 5_000, None),
            1_800,
            &reception(),
            Utc::now(),
        )
        .expect_err("discount too large");
        assert!(matches!(err, TransitionError::ValidationFailed(_)));
    }

    #[test]
    fn empty_and_zero_quantity_bills_are_rejected() {
        assert!(Bill::new(new_bill(vec![], 0, None), 0, &reception(), Utc::now()).is_err());
        assert!(Bill::new(
            new_bill(vec![item("Dressing", 0, 1_000)], 0, None),
            0,
            &reception(),
            Utc::now()
        )
        .is_err());
    }

    #[test]
    fn bill_number_carries_date_and_prefix() {
        let bill = Bill::new(
            new_bill(vec![item("Consultation", 1, 50_000)], 0, None),
            0,
            &reception(),
            Utc::now(),
        )
        .unwrap();
        assert!(bill.bill_number.starts_with("BILL-"));
        assert_eq!(bill.bill_number.len(), "BILL-20240101-ABCDEF".len());
    }

    #[test]
    fn confirm_payment_settles_grand_total() {
        let mut bill = Bill::new(
            new_bill(vec![item("Consultation", 1, 50_000)], 0, Some(10_000)),
            1_800,
            &reception(),
            Utc::now(),
        )
        .unwrap();
        bill.apply(BillAction::ConfirmPayment, &reception(), Utc::now());
        assert_eq!(bill.status, BillStatus::Paid);
        assert_eq!(bill.paid_amount, Some(bill.grand_total));
        assert!(bill.outstanding().is_zero());
    }
}
