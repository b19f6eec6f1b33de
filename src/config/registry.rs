//! Static registry of the datasets this pipeline moves.
//!
//! Every table is staged under the same folder and loaded into the same
//! BigQuery dataset; all columns are declared `STRING NULLABLE` so the load
//! never rejects a row on type grounds.

use crate::domain::model::staged_object_path;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_STAGING_FOLDER: &str = "data";
pub const SOURCE_FILE_EXTENSION: &str = "csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Numeric,
    Boolean,
    Timestamp,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Nullable,
    Required,
    Repeated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mode: FieldMode,
}

impl ColumnSpec {
    pub fn nullable_string(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::String,
            mode: FieldMode::Nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub name: String,
    pub staging_folder: String,
    pub destination: TableRef,
    pub columns: Vec<ColumnSpec>,
}

impl DatasetDescriptor {
    /// Name of the file in the Drive folder and in the staging folder.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, SOURCE_FILE_EXTENSION)
    }

    pub fn object_path(&self) -> String {
        staged_object_path(&self.staging_folder, &self.file_name())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

const TABLES: &[(&str, &[&str])] = &[
    (
        "olist_closed_deals",
        &[
            "mql_id",
            "seller_id",
            "sdr_id",
            "sr_id",
            "won_date",
            "business_segment",
            "lead_type",
            "lead_behaviour_profile",
            "has_comnpany",
            "has_gtin",
            "average_stock",
            "business_type",
            "declared_product_catalog_size",
            "declared_monthly_revenue",
        ],
    ),
    (
        "olist_customers",
        &[
            "customer_id",
            "customer_unique_id",
            "customer_zip_code_prefix",
            "customer_city",
            "customer_state",
        ],
    ),
    (
        "olist_geolocation",
        &[
            "geolocation_zip_code_prefix",
            "geolocation_lat",
            "geolocation_lng",
            "geolocation_city",
            "geolocation_state",
        ],
    ),
    (
        "olist_marketing_qualified_leads",
        &["mql_id", "first_contact_date", "landing_page_id", "origin"],
    ),
    (
        "olist_order_items",
        &[
            "order_id",
            "order_item_id",
            "product_id",
            "seller_id",
            "shipping_limit_date",
            "price",
            "freight_value",
        ],
    ),
    (
        "olist_order_payments",
        &[
            "order_id",
            "payment_sequential",
            "payment_type",
            "payment_installments",
            "payment_value",
        ],
    ),
    (
        "olist_order_reviews",
        &[
            "review_id",
            "order_id",
            "review_score",
            "review_comment_title",
            "review_comment_message",
            "review_creation_date",
            "review_answer_timestamp",
        ],
    ),
    (
        "olist_orders",
        &[
            "order_id",
            "customer_id",
            "order_status",
            "order_purchase_timestamp",
            "order_approved_at",
            "order_delivered_carrier_date",
            "order_delivered_customer_date",
            "order_estimated_delivery_date",
        ],
    ),
    (
        "olist_products",
        &[
            "product_id",
            "product_category_name",
            "product_name_lenght",
            "product_description_lenght",
            "product_photos_qty",
            "product_weight_g",
            "product_length_cm",
            "product_height_cm",
            "product_width_cm",
        ],
    ),
    (
        "olist_sellers",
        &[
            "seller_id",
            "seller_zip_code_prefix",
            "seller_city",
            "seller_state",
        ],
    ),
    (
        "olist_product_category_name",
        &["product_category_name", "product_category_name_english"],
    ),
];

/// Table names in registry order.
pub fn table_names() -> impl Iterator<Item = &'static str> {
    TABLES.iter().map(|(name, _)| *name)
}

/// Builds the descriptors for a project and dataset, in registry order.
pub fn registry(project_id: &str, dataset_id: &str) -> Vec<DatasetDescriptor> {
    TABLES
        .iter()
        .map(|(name, columns)| DatasetDescriptor {
            name: name.to_string(),
            staging_folder: DEFAULT_STAGING_FOLDER.to_string(),
            destination: TableRef {
                project_id: project_id.to_string(),
                dataset_id: dataset_id.to_string(),
                table_id: name.to_string(),
            },
            columns: columns.iter().map(|c| ColumnSpec::nullable_string(c)).collect(),
        })
        .collect()
}
