use drive_etl::config::registry::{registry, table_names, FieldMode, FieldType};
use drive_etl::core::sanitize::sanitize;
use std::path::PathBuf;

fn sample(file_name: &str) -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/samples")
        .join(file_name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("reading {}: {}", path.display(), e))
}

#[test]
fn test_every_table_matches_its_sample_header() {
    for table in registry("analytics-prod", "ecommerce_data") {
        let clean = sanitize(&sample(&table.file_name())).unwrap();
        assert_eq!(
            clean.header,
            table.column_names(),
            "schema of {} does not match its source header",
            table.name
        );
    }
}

#[test]
fn test_customers_schema_is_exact() {
    let tables = registry("analytics-prod", "ecommerce_data");
    let customers = tables.iter().find(|t| t.name == "olist_customers").unwrap();

    assert_eq!(
        customers.column_names(),
        vec![
            "customer_id",
            "customer_unique_id",
            "customer_zip_code_prefix",
            "customer_city",
            "customer_state",
        ]
    );
    assert!(customers
        .columns
        .iter()
        .all(|c| c.field_type == FieldType::String && c.mode == FieldMode::Nullable));
}

#[test]
fn test_samples_keep_good_rows_and_drop_bad_ones() {
    let customers = sanitize(&sample("olist_customers.csv")).unwrap();
    assert_eq!((customers.kept_rows, customers.dropped_rows), (3, 1));

    // An unquoted comma inside the review message adds a field.
    let reviews = sanitize(&sample("olist_order_reviews.csv")).unwrap();
    assert_eq!((reviews.kept_rows, reviews.dropped_rows), (2, 1));

    let orders = sanitize(&sample("olist_orders.csv")).unwrap();
    assert_eq!((orders.kept_rows, orders.dropped_rows), (2, 0));
}

#[test]
fn test_registry_covers_all_samples() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/samples");
    let mut on_disk: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    on_disk.sort();

    let mut registered: Vec<String> = table_names().map(|name| format!("{name}.csv")).collect();
    registered.sort();

    assert_eq!(on_disk, registered);
}
