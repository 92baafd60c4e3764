mod common;

use std::fs;

use fold_kv::schema::{
    Compatible, DiffGenerating, SchemaError, SchemaModel, CURRENT_FORMAT_VERSION,
};

use common::{init_test_env, people_schema};

#[test]
fn test_round_trip_preserves_schema() {
    init_test_env();
    let schema = people_schema();
    schema.validate().unwrap();

    let bytes = schema.to_bytes().unwrap();
    let read = SchemaModel::from_bytes(&bytes).unwrap();
    assert_eq!(read, schema);
    assert_eq!(read.compatibility_hash(), schema.compatibility_hash());
    assert_eq!(read.to_bytes().unwrap(), bytes);
}

#[test]
fn test_output_is_current_version_sorted_by_name() {
    let value: serde_json::Value =
        serde_json::from_slice(&people_schema().to_bytes().unwrap()).unwrap();
    assert_eq!(value["SchemaModel"]["formatVersion"], CURRENT_FORMAT_VERSION);
    let object_types = value["SchemaModel"]["ObjectType"].as_array().unwrap();
    assert_eq!(object_types[0]["name"], "Company");
    assert_eq!(object_types[1]["name"], "Person");

    let person_fields = object_types[1]["fields"].as_array().unwrap();
    assert!(person_fields[2].get("ReferenceField").is_some());
    assert_eq!(person_fields[2]["ReferenceField"]["onDelete"], "UNREFERENCE");
    assert!(person_fields[4].get("CounterField").is_some());
    assert!(person_fields[6]["MapField"]["key"]["SimpleField"].get("name").is_none());
}

#[test]
fn test_display_matches_document() {
    let schema = people_schema();
    let text = schema.to_string();
    assert!(text.starts_with('{'));
    assert_eq!(SchemaModel::from_bytes(text.as_bytes()).unwrap(), schema);
}

#[test]
fn test_reads_legacy_versions() {
    let v0 = r#"{
        "SchemaModel": {
            "Object": [
                { "name": "Account", "storageId": 1, "fields": [
                    { "SimpleField": { "name": "balance", "storageId": 2, "type": "long" } }
                ] }
            ]
        }
    }"#;
    let v1 = r#"{
        "SchemaModel": {
            "formatVersion": 1,
            "ObjectType": [
                { "name": "Account", "storageId": 1, "fields": [
                    { "SimpleField": { "name": "balance", "storageId": 2, "type": "long" } }
                ] }
            ]
        }
    }"#;
    let from_v0 = SchemaModel::from_bytes(v0.as_bytes()).unwrap();
    let from_v1 = SchemaModel::from_bytes(v1.as_bytes()).unwrap();
    assert_eq!(from_v0, from_v1);
    assert!(from_v0.differences_from(&from_v1).is_empty());
}

#[test]
fn test_rejects_unsupported_documents() {
    let future = r#"{ "SchemaModel": { "formatVersion": 9, "ObjectType": [] } }"#;
    assert!(matches!(
        SchemaModel::from_bytes(future.as_bytes()),
        Err(SchemaError::UnsupportedFormatVersion(9))
    ));

    let v1_with_index = r#"{
        "SchemaModel": {
            "formatVersion": 1,
            "ObjectType": [ {
                "name": "A", "storageId": 1,
                "fields": [
                    { "SimpleField": { "name": "x", "storageId": 2, "type": "long" } },
                    { "SimpleField": { "name": "y", "storageId": 3, "type": "long" } }
                ],
                "compositeIndexes": [ { "name": "xy", "storageId": 4, "fields": [2, 3] } ]
            } ]
        }
    }"#;
    assert!(matches!(
        SchemaModel::from_bytes(v1_with_index.as_bytes()),
        Err(SchemaError::Format(_))
    ));

    assert!(matches!(
        SchemaModel::from_bytes(b"not json"),
        Err(SchemaError::Format(_))
    ));
}

#[test]
fn test_reading_rejects_invalid_schema() {
    let conflicting = r#"{
        "SchemaModel": {
            "formatVersion": 2,
            "ObjectType": [
                { "name": "A", "storageId": 1, "fields": [
                    { "SimpleField": { "name": "x", "storageId": 5, "type": "long" } }
                ] },
                { "name": "B", "storageId": 2, "fields": [
                    { "SimpleField": { "name": "x", "storageId": 5, "type": "string" } }
                ] }
            ]
        }
    }"#;
    assert!(matches!(
        SchemaModel::from_bytes(conflicting.as_bytes()),
        Err(SchemaError::StorageIdConflict { storage_id: 5, .. })
    ));
}

#[test]
fn test_save_and_load() {
    init_test_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.json");

    let schema = people_schema();
    schema.save(&path).unwrap();
    assert!(fs::metadata(&path).unwrap().len() > 0);
    let loaded = SchemaModel::load(&path).unwrap();
    assert!(loaded.is_compatible_with(&schema));
    assert_eq!(loaded, schema);

    let mut buffer = Vec::new();
    schema.write_to(&mut buffer).unwrap();
    assert_eq!(SchemaModel::read_from(buffer.as_slice(), "buffer").unwrap(), schema);
}

#[test]
fn test_io_errors_name_their_source() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.json");
    match SchemaModel::load(&missing) {
        Err(SchemaError::Io { source_id, .. }) => {
            assert!(source_id.ends_with("missing.json"));
        }
        other => panic!("expected an I/O error, got {other:?}"),
    }
}
