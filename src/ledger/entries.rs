//! Builders for the field-name payloads written to each table.

use serde_json::{json, Map, Value};

use super::pricing::{self, MaterialLine};
use crate::models::table::fields;

#[derive(Debug, Clone, Default)]
pub struct PurchaseInput {
    pub material: String,
    pub spec: String,
    pub quantity: f64,
    pub unit: String,
    pub total_price: f64,
    /// Epoch milliseconds.
    pub date: i64,
    pub supplier: String,
}

#[derive(Debug, Clone, Default)]
pub struct FormulaInput {
    pub product: String,
    pub quantity: f64,
    pub materials: Vec<MaterialLine>,
    pub packaging_cost: f64,
    pub utility_cost: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SaleInput {
    /// Epoch milliseconds.
    pub date: i64,
    pub product: String,
    pub quantity: f64,
    pub total_amount: f64,
    pub unit_cost: f64,
}

fn require(ok: bool, what: &str) -> anyhow::Result<()> {
    if !ok {
        anyhow::bail!("{} is required", what);
    }
    Ok(())
}

pub fn purchase_fields(input: &PurchaseInput) -> anyhow::Result<Map<String, Value>> {
    require(!input.material.trim().is_empty(), "material name")?;
    require(input.quantity > 0.0, "a positive quantity")?;
    require(input.total_price > 0.0, "a positive total price")?;
    require(input.date != 0, "purchase date")?;

    let unit_price = pricing::purchase_unit_price(input.total_price, input.quantity).unwrap_or(0.0);

    let mut out = Map::new();
    out.insert(fields::MATERIAL_NAME.into(), json!(input.material.trim()));
    out.insert(fields::SPEC.into(), json!(input.spec.trim()));
    out.insert(fields::PURCHASE_QUANTITY.into(), json!(input.quantity));
    out.insert(fields::UNIT.into(), json!(input.unit.trim()));
    out.insert(fields::PURCHASE_TOTAL.into(), json!(input.total_price));
    out.insert(fields::PURCHASE_UNIT_PRICE.into(), json!(unit_price));
    out.insert(fields::PURCHASE_DATE.into(), json!(input.date));
    out.insert(fields::SUPPLIER.into(), json!(input.supplier.trim()));
    Ok(out)
}

/// Materials with no name or a non-positive amount are dropped.
pub fn formula_fields(input: &FormulaInput) -> anyhow::Result<Map<String, Value>> {
    require(!input.product.trim().is_empty(), "product name")?;
    require(input.quantity > 0.0, "a positive batch quantity")?;

    let materials: Vec<MaterialLine> = input
        .materials
        .iter()
        .filter(|m| !m.name.is_empty() && m.amount > 0.0)
        .cloned()
        .collect();
    let cost = pricing::formula_cost(
        &materials,
        input.packaging_cost,
        input.utility_cost,
        input.quantity,
    );

    let mut out = Map::new();
    out.insert(fields::PRODUCT_NAME.into(), json!(input.product.trim()));
    out.insert(fields::BATCH_QUANTITY.into(), json!(input.quantity));
    // Stored as JSON text, not a nested object.
    out.insert(
        fields::MATERIALS.into(),
        json!(serde_json::to_string(&materials)?),
    );
    out.insert(fields::PACKAGING_COST.into(), json!(input.packaging_cost));
    out.insert(fields::UTILITY_COST.into(), json!(input.utility_cost));
    out.insert(fields::UNIT_COST.into(), json!(cost.unit));
    Ok(out)
}

pub fn sale_fields(input: &SaleInput) -> anyhow::Result<Map<String, Value>> {
    require(input.date != 0, "sale date")?;
    require(!input.product.trim().is_empty(), "product name")?;
    require(input.quantity > 0.0, "a positive quantity")?;
    require(input.total_amount > 0.0, "a positive total amount")?;

    let figures = pricing::sale_figures(input.quantity, input.total_amount, input.unit_cost);

    let mut out = Map::new();
    out.insert(fields::SALE_DATE.into(), json!(input.date));
    out.insert(fields::PRODUCT_NAME.into(), json!(input.product.trim()));
    out.insert(fields::SALE_QUANTITY.into(), json!(input.quantity));
    out.insert(fields::SALE_TOTAL.into(), json!(input.total_amount));
    out.insert(fields::SALE_UNIT_PRICE.into(), json!(figures.unit_price));
    out.insert(fields::UNIT_COST.into(), json!(input.unit_cost));
    out.insert(fields::COST_TOTAL.into(), json!(figures.total_cost));
    out.insert(fields::PROFIT.into(), json!(figures.profit));
    Ok(out)
}

/// Parses the materials field, which is JSON text or (rarely) a raw array.
pub fn parse_materials(value: &Value) -> Vec<MaterialLine> {
    match value {
        Value::String(s) => serde_json::from_str(s).unwrap_or_default(),
        Value::Array(_) => serde_json::from_value(value.clone()).unwrap_or_default(),
        _ => Vec::new(),
    }
}
