//! derive(Table) 매크로 테스트

use gdx_core::api::{FromRow, TableSchema};
use gdx_core::schema::{FieldType, Value};
use gdx_core::{Geodatabase, Table, VersionId};

#[derive(Table, Debug, Clone, PartialEq)]
#[gdx(table_name = "Parcels")]
pub struct Parcel {
    #[gdx(object_id)]
    pub id: i64,
    #[gdx(rename = "APN", length = 12)]
    pub apn: String,
    pub zone: i32,
    pub area: Option<f64>,
}

#[derive(Table)]
pub struct Hydrant {
    pub flow: f64,
}

#[test]
fn test_table_name() {
    assert_eq!(Parcel::TABLE_NAME, "Parcels");
    assert_eq!(Hydrant::TABLE_NAME, "Hydrant");
}

#[test]
fn test_description() {
    let desc = Parcel::description();
    assert_eq!(desc.name, "Parcels");
    assert_eq!(desc.fields.len(), 3);
    assert_eq!(desc.fields[0].name, "APN");
    assert_eq!(desc.fields[0].field_type, FieldType::Text);
    assert_eq!(desc.fields[0].length, Some(12));
    assert!(!desc.fields[0].nullable);
    assert_eq!(desc.fields[1].name, "zone");
    assert_eq!(desc.fields[1].field_type, FieldType::Integer);
    assert_eq!(desc.fields[2].name, "area");
    assert_eq!(desc.fields[2].field_type, FieldType::Double);
    assert!(desc.fields[2].nullable);
}

#[test]
fn test_to_values() {
    let parcel = Parcel {
        id: 0,
        apn: "001-A".to_string(),
        zone: 3,
        area: None,
    };
    assert_eq!(
        parcel.to_values(),
        vec![
            ("APN", Value::from("001-A")),
            ("zone", Value::Integer(3)),
            ("area", Value::Null),
        ]
    );
}

#[test]
fn test_round_trip_through_database() {
    let db = Geodatabase::open_in_memory().unwrap();
    db.create_table(Parcel::description()).unwrap();
    let draft = Parcel {
        id: 0,
        apn: "001-A".to_string(),
        zone: 3,
        area: Some(120.5),
    };
    let id = db
        .write_row(VersionId::DEFAULT, Parcel::TABLE_NAME, None, draft.to_values())
        .unwrap();

    let row = db.get_row(VersionId::DEFAULT, Parcel::TABLE_NAME, id).unwrap();
    let parcel: Parcel = row.decode().unwrap();
    assert_eq!(parcel, Parcel { id, ..draft });
    assert_eq!(Parcel::from_row(&row).unwrap().id, id);
}
