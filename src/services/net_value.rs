//! Splits a line item's total value between its delivered and returned quantities.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::AppError;

const PER_UNIT_SCALE: u32 = 4;
const CURRENCY_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetValueSplit {
    pub delivered_net_value: Decimal,
    pub returned_net_value: Decimal,
}

/// Computes delivered and returned net values for one line item.
///
/// The per-unit value (net value + VAT over sales quantity) is rounded to 4 places
/// half-to-even, each side is rounded to cents half-up, and whatever the two sides miss
/// of the total goes to the returned side when anything was returned, otherwise to the
/// delivered side. The two results always add up to `sales_net_value + vat` exactly.
pub fn split_net_value(
    vat: Option<Decimal>,
    sales_quantity: Option<Decimal>,
    sales_net_value: Option<Decimal>,
    delivered_quantity: Decimal,
    returned_quantity: Decimal,
) -> Result<NetValueSplit, AppError> {
    let vat = vat.ok_or_else(|| {
        AppError::invalid_input("VAT must be provided for net value calculation")
    })?;
    let (sales_quantity, sales_net_value) = match (sales_quantity, sales_net_value) {
        (Some(q), Some(v)) if !q.is_zero() && !v.is_zero() => (q, v),
        _ => {
            return Err(AppError::invalid_input(
                "Sales quantity and sales net value must be provided for net value calculation",
            ))
        }
    };
    if sales_quantity <= Decimal::ZERO {
        return Err(AppError::invalid_input("Sales quantity must be greater than 0"));
    }

    let total = sales_net_value + vat;
    let per_unit = (total / sales_quantity)
        .round_dp_with_strategy(PER_UNIT_SCALE, RoundingStrategy::MidpointNearestEven);

    let mut delivered = round_currency(per_unit * delivered_quantity);
    let mut returned = round_currency(per_unit * returned_quantity);

    let difference = total - (delivered + returned);
    if !difference.is_zero() {
        if returned_quantity > Decimal::ZERO {
            returned += difference;
        } else {
            delivered += difference;
        }
    }

    Ok(NetValueSplit {
        delivered_net_value: delivered,
        returned_net_value: returned,
    })
}

fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}
