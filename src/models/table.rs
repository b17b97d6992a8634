use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Bitable field type codes used by the three tables.
pub const FIELD_TYPE_TEXT: u8 = 1;
pub const FIELD_TYPE_NUMBER: u8 = 2;
pub const FIELD_TYPE_DATE: u8 = 5;

pub const DEFAULT_VIEW_NAME: &str = "网格视图";

/// Field names, stable across table re-creation.
pub mod fields {
    pub const MATERIAL_NAME: &str = "原料名称";
    pub const SPEC: &str = "规格";
    pub const PURCHASE_QUANTITY: &str = "采购数量";
    pub const UNIT: &str = "单位";
    pub const PURCHASE_TOTAL: &str = "采购总价";
    pub const PURCHASE_UNIT_PRICE: &str = "采购单价";
    pub const PURCHASE_DATE: &str = "采购日期";
    pub const SUPPLIER: &str = "供应商";

    pub const PRODUCT_NAME: &str = "产品名称";
    pub const BATCH_QUANTITY: &str = "制作数量";
    pub const MATERIALS: &str = "原料组成";
    pub const PACKAGING_COST: &str = "包装成本";
    pub const UTILITY_COST: &str = "水电成本";
    pub const UNIT_COST: &str = "单位成本";

    pub const SALE_DATE: &str = "销售日期";
    pub const SALE_QUANTITY: &str = "销售数量";
    pub const SALE_TOTAL: &str = "销售总金额";
    pub const SALE_UNIT_PRICE: &str = "销售单价";
    pub const COST_TOTAL: &str = "成本总额";
    pub const PROFIT: &str = "利润";
}

/// The three logical tables of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Purchase,
    Formula,
    Sales,
}

impl TableKind {
    pub const ALL: [TableKind; 3] = [TableKind::Purchase, TableKind::Formula, TableKind::Sales];

    /// Table name in the upstream workspace; used to find existing tables.
    pub fn display_name(self) -> &'static str {
        match self {
            TableKind::Purchase => "原料采购",
            TableKind::Formula => "产品配方",
            TableKind::Sales => "商品销售",
        }
    }

    /// Field definitions sent when the table has to be created.
    pub fn schema(self) -> Vec<FieldSpec> {
        use fields::*;
        match self {
            TableKind::Purchase => vec![
                FieldSpec::text(MATERIAL_NAME),
                FieldSpec::text(SPEC),
                FieldSpec::number(PURCHASE_QUANTITY),
                FieldSpec::text(UNIT),
                FieldSpec::money(PURCHASE_TOTAL),
                FieldSpec::money(PURCHASE_UNIT_PRICE),
                FieldSpec::date(PURCHASE_DATE),
                FieldSpec::text(SUPPLIER),
            ],
            TableKind::Formula => vec![
                FieldSpec::text(PRODUCT_NAME),
                FieldSpec::number(BATCH_QUANTITY),
                FieldSpec::text(MATERIALS).describe("JSON文本"),
                FieldSpec::money(PACKAGING_COST),
                FieldSpec::money(UTILITY_COST),
                FieldSpec::money(UNIT_COST),
            ],
            TableKind::Sales => vec![
                FieldSpec::date(SALE_DATE),
                FieldSpec::text(PRODUCT_NAME),
                FieldSpec::number(SALE_QUANTITY),
                FieldSpec::money(SALE_TOTAL),
                FieldSpec::money(SALE_UNIT_PRICE),
                FieldSpec::money(UNIT_COST),
                FieldSpec::money(COST_TOTAL),
                FieldSpec::money(PROFIT),
            ],
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableKind::Purchase => "purchase",
            TableKind::Formula => "formula",
            TableKind::Sales => "sales",
        };
        f.write_str(s)
    }
}

impl FromStr for TableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "purchase" | "purchases" => Ok(TableKind::Purchase),
            "formula" | "formulas" => Ok(TableKind::Formula),
            "sales" | "sale" => Ok(TableKind::Sales),
            other => Err(format!(
                "unknown table '{}': expected purchase, formula or sales",
                other
            )),
        }
    }
}

/// One column definition in a create-table request.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub field_name: &'static str,
    #[serde(rename = "type")]
    pub field_type: u8,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<Value>,
}

impl FieldSpec {
    fn text(name: &'static str) -> Self {
        Self {
            field_name: name,
            field_type: FIELD_TYPE_TEXT,
            description: "文本",
            property: None,
        }
    }

    fn number(name: &'static str) -> Self {
        Self {
            field_name: name,
            field_type: FIELD_TYPE_NUMBER,
            description: "数字",
            property: None,
        }
    }

    /// Number shown with two decimals.
    fn money(name: &'static str) -> Self {
        Self {
            property: Some(json!({ "formatter": { "pattern": "0.00" } })),
            ..Self::number(name)
        }
    }

    fn date(name: &'static str) -> Self {
        Self {
            field_name: name,
            field_type: FIELD_TYPE_DATE,
            description: "日期",
            property: None,
        }
    }

    fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }
}
