//! Derived money values computed before a record is written.

use serde::{Deserialize, Serialize};

/// Rounds to cents, the precision every money field is stored with.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Unit price of a purchase, `None` when the quantity is not positive.
pub fn purchase_unit_price(total: f64, quantity: f64) -> Option<f64> {
    (quantity > 0.0).then(|| round2(total / quantity))
}

/// One ingredient line of a formula, serialised into the materials field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialLine {
    pub name: String,
    pub amount: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormulaCost {
    pub material: f64,
    pub packaging: f64,
    pub utility: f64,
    pub total: f64,
    pub unit: f64,
}

/// Batch cost of a formula. A non-positive batch quantity counts as 1.
pub fn formula_cost(
    materials: &[MaterialLine],
    packaging: f64,
    utility: f64,
    quantity: f64,
) -> FormulaCost {
    let material: f64 = materials.iter().map(|m| m.price * m.amount).sum();
    let total = material + packaging + utility;
    let quantity = if quantity > 0.0 { quantity } else { 1.0 };

    FormulaCost {
        material,
        packaging,
        utility,
        total,
        unit: round2(total / quantity),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaleFigures {
    pub unit_price: f64,
    pub total_cost: f64,
    pub profit: f64,
}

pub fn sale_figures(quantity: f64, total_amount: f64, unit_cost: f64) -> SaleFigures {
    let unit_price = if quantity > 0.0 {
        round2(total_amount / quantity)
    } else {
        0.0
    };
    let total_cost = round2(unit_cost * quantity);

    SaleFigures {
        unit_price,
        total_cost,
        profit: round2(total_amount - total_cost),
    }
}
