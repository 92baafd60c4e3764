//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Once;

use fold_kv::schema::{
    ComplexSchemaField, CounterSchemaField, DeleteAction, SchemaCompositeIndex, SchemaModel,
    SchemaObjectType, SimpleSchemaField,
};

static INIT: Once = Once::new();

/// Initialize test logging once per test binary
pub fn init_test_env() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init()
            .unwrap_or(());
    });
}

/// Decode a hex key literal such as `"ff53"`
pub fn key(hex_str: &str) -> Vec<u8> {
    hex::decode(hex_str).expect("valid hex key")
}

/// A two-type schema using every field variant and a composite index
pub fn people_schema() -> SchemaModel {
    SchemaModel::new()
        .with_object_type(
            SchemaObjectType::new("Person", 100)
                .with_field(SimpleSchemaField::value("name", 101, "string").with_indexed(true))
                .with_field(SimpleSchemaField::value("age", 102, "long"))
                .with_field(
                    SimpleSchemaField::reference("employer", 103)
                        .with_object_types([200])
                        .with_on_delete(DeleteAction::Unreference),
                )
                .with_field(SimpleSchemaField::enumeration(
                    "mood",
                    104,
                    ["HAPPY", "GRUMPY"],
                ))
                .with_field(CounterSchemaField::new("logins", 105))
                .with_field(ComplexSchemaField::list(
                    "nicknames",
                    106,
                    SimpleSchemaField::value("element", 107, "string"),
                ))
                .with_field(ComplexSchemaField::map(
                    "scores",
                    108,
                    SimpleSchemaField::value("key", 109, "string"),
                    SimpleSchemaField::value("value", 110, "long"),
                ))
                .with_composite_index(SchemaCompositeIndex::new("byNameAge", 120, [101, 102])),
        )
        .with_object_type(
            SchemaObjectType::new("Company", 200)
                .with_field(SimpleSchemaField::value("name", 101, "string").with_indexed(true))
                .with_field(ComplexSchemaField::set(
                    "offices",
                    201,
                    SimpleSchemaField::value("element", 202, "string"),
                )),
        )
}
