//! 价格计算: 从目录解析行项目，并按订单字段计算金额
//!
//! 所有计算使用 `Decimal`，落库时转回 `f64`。

use std::collections::HashMap;

use rust_decimal::Decimal;
use shared::models::{
    AppliedDiscount, BundleLine, DishLine, LineItem, LineItemInput, Order, OrderType,
    SelectedOption, Store,
};
use sqlx::SqlitePool;

use super::error::OrderError;
use super::money::{self, Totals, line_subtotal, round_currency, to_decimal, to_f64};
use crate::db::repository::{bundle, catalog};
use crate::utils::ErrorCode;
use crate::utils::validation::{MAX_LINE_QUANTITY, MAX_NOTE_LEN, validate_optional_text};

fn check_quantity(quantity: i32) -> Result<(), OrderError> {
    if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
        return Err(OrderError::invalid(
            ErrorCode::InvalidQuantity,
            format!("quantity must be between 1 and {MAX_LINE_QUANTITY}, got {quantity}"),
        ));
    }
    Ok(())
}

/// Resolve requested line items against the brand catalog
pub async fn resolve_items(
    pool: &SqlitePool,
    store: &Store,
    inputs: &[LineItemInput],
) -> Result<Vec<LineItem>, OrderError> {
    if inputs.is_empty() {
        return Err(OrderError::invalid(ErrorCode::OrderEmpty, "order has no items"));
    }

    let mut items = Vec::with_capacity(inputs.len());
    for input in inputs {
        match input {
            LineItemInput::Dish {
                template_id,
                option_ids,
                quantity,
                note,
            } => {
                check_quantity(*quantity)?;
                validate_optional_text(note, "note", MAX_NOTE_LEN)?;

                let template = catalog::find_template(pool, *template_id)
                    .await?
                    .filter(|t| t.brand_id == store.brand_id)
                    .ok_or(OrderError::DishNotFound(*template_id))?;
                if !template.is_active {
                    return Err(OrderError::DishUnavailable(template.name));
                }

                let mut options = Vec::with_capacity(option_ids.len());
                for option_id in option_ids {
                    let option = catalog::find_option(pool, *option_id)
                        .await?
                        .filter(|o| o.brand_id == store.brand_id && o.is_active)
                        .ok_or(OrderError::OptionNotFound(*option_id))?;
                    options.push(SelectedOption {
                        option_id: Some(option.id),
                        name: option.name,
                        price_modifier: option.price_modifier,
                        bound_template_id: option.bound_template_id,
                    });
                }

                let subtotal = line_subtotal(
                    template.price,
                    options.iter().map(|o| o.price_modifier),
                    *quantity,
                );
                items.push(LineItem::Dish(DishLine {
                    template_id: Some(template.id),
                    name: template.name,
                    unit_price: template.price,
                    quantity: *quantity,
                    options,
                    subtotal: to_f64(subtotal),
                    note: note.clone(),
                    external_id: None,
                }));
            }
            LineItemInput::Bundle {
                bundle_id,
                quantity,
            } => {
                check_quantity(*quantity)?;
                let found = bundle::find_by_id(pool, *bundle_id)
                    .await?
                    .filter(|b| b.brand_id == store.brand_id)
                    .ok_or(OrderError::BundleNotFound(*bundle_id))?;
                let subtotal = to_decimal(found.price) * Decimal::from(*quantity);
                items.push(LineItem::Bundle(BundleLine {
                    bundle_id: found.id,
                    name: found.name,
                    unit_price: found.price,
                    quantity: *quantity,
                    subtotal: to_f64(subtotal),
                }));
            }
        }
    }
    Ok(items)
}

/// Compute the monetary fields of an order.
///
/// Service charge applies to dine-in only, on dishes + bundles.
pub fn compute_totals(
    items: &[LineItem],
    order_type: OrderType,
    service_charge_rate: f64,
    discounts: &[AppliedDiscount],
    manual_adjustment: f64,
    currency_decimals: i32,
) -> Totals {
    let mut dish = Decimal::ZERO;
    let mut bundle = Decimal::ZERO;
    for item in items {
        match item {
            LineItem::Dish(d) => dish += to_decimal(d.subtotal),
            LineItem::Bundle(b) => bundle += to_decimal(b.subtotal),
        }
    }
    let service = match order_type {
        OrderType::DineIn => money::service_charge(service_charge_rate, dish + bundle),
        OrderType::Takeout | OrderType::Delivery => Decimal::ZERO,
    };
    let discount: Decimal = discounts.iter().map(|d| to_decimal(d.amount)).sum();

    Totals {
        dish_subtotal: round_currency(dish, currency_decimals),
        bundle_subtotal: round_currency(bundle, currency_decimals),
        service_charge: round_currency(service, currency_decimals),
        total_discount: round_currency(discount, currency_decimals),
        manual_adjustment: to_decimal(manual_adjustment),
    }
}

/// Write computed totals onto the order
pub fn apply_totals(order: &mut Order, totals: &Totals) {
    order.dish_subtotal = to_f64(totals.dish_subtotal);
    order.bundle_subtotal = to_f64(totals.bundle_subtotal);
    order.service_charge = to_f64(totals.service_charge);
    order.total_discount = to_f64(totals.total_discount);
    order.manual_adjustment = to_f64(totals.manual_adjustment);
    order.total = to_f64(totals.total());
}

/// Display names of stock-tracked items, for actionable error messages
pub fn item_names(items: &[LineItem]) -> HashMap<i64, String> {
    let mut names = HashMap::new();
    for item in items {
        let LineItem::Dish(d) = item else { continue };
        if let Some(id) = d.template_id {
            names.entry(id).or_insert_with(|| d.name.clone());
        }
        for option in &d.options {
            if let Some(bound) = option.bound_template_id {
                names.entry(bound).or_insert_with(|| option.name.clone());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::DiscountModel;

    fn dish(price: f64, modifier: Option<f64>, quantity: i32) -> LineItem {
        let options: Vec<SelectedOption> = modifier
            .map(|m| SelectedOption {
                option_id: Some(1),
                name: "extra".into(),
                price_modifier: m,
                bound_template_id: None,
            })
            .into_iter()
            .collect();
        let subtotal = line_subtotal(price, options.iter().map(|o| o.price_modifier), quantity);
        LineItem::Dish(DishLine {
            template_id: Some(1),
            name: "Beef Noodle".into(),
            unit_price: price,
            quantity,
            options,
            subtotal: to_f64(subtotal),
            note: None,
            external_id: None,
        })
    }

    fn voucher(amount: f64) -> AppliedDiscount {
        AppliedDiscount {
            discount_model: DiscountModel::Voucher,
            ref_ids: vec![1],
            claimed_amount: 90.0,
            amount,
        }
    }

    #[test]
    fn test_dish_with_option_and_voucher() {
        // $120 + $20 option × 2 = $280, voucher bound to the dish takes $120
        let items = [dish(120.0, Some(20.0), 2)];
        let totals = compute_totals(&items, OrderType::Takeout, 10.0, &[voucher(120.0)], 0.0, 0);
        assert_eq!(to_f64(totals.dish_subtotal), 280.0);
        assert_eq!(to_f64(totals.service_charge), 0.0);
        assert_eq!(to_f64(totals.total_discount), 120.0);
        assert_eq!(to_f64(totals.total()), 160.0);
    }

    #[test]
    fn test_service_charge_dine_in_only() {
        let items = [
            dish(100.0, None, 1),
            LineItem::Bundle(BundleLine {
                bundle_id: 1,
                name: "Lunch pack".into(),
                unit_price: 200.0,
                quantity: 1,
                subtotal: 200.0,
            }),
        ];
        let dine_in = compute_totals(&items, OrderType::DineIn, 10.0, &[], 0.0, 0);
        assert_eq!(to_f64(dine_in.service_charge), 30.0);
        assert_eq!(to_f64(dine_in.total()), 330.0);

        let takeout = compute_totals(&items, OrderType::Takeout, 10.0, &[], 0.0, 0);
        assert_eq!(to_f64(takeout.total()), 300.0);
    }

    #[test]
    fn test_total_never_negative() {
        let items = [dish(50.0, None, 1)];
        let totals = compute_totals(&items, OrderType::Takeout, 0.0, &[voucher(120.0)], 0.0, 0);
        assert_eq!(totals.total(), Decimal::ZERO);
    }

    #[test]
    fn test_item_names_include_bound_options() {
        let mut line = dish(120.0, Some(20.0), 1);
        if let LineItem::Dish(d) = &mut line {
            d.options[0].bound_template_id = Some(42);
            d.options[0].name = "Fried Egg".into();
        }
        let names = item_names(&[line]);
        assert_eq!(names.get(&1).map(String::as_str), Some("Beef Noodle"));
        assert_eq!(names.get(&42).map(String::as_str), Some("Fried Egg"));
    }

    #[test]
    fn test_check_quantity() {
        assert!(check_quantity(1).is_ok());
        assert!(check_quantity(0).is_err());
        assert!(check_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }
}
