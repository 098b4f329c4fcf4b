// Schema batches and spatial search — 스키마 빌더 통합 테스트

use gdx_core::api::{QueryFilter, SpatialFilter};
use gdx_core::geometry::{Geometry, GeometryType, SpatialRelationship};
use gdx_core::schema::{
    Cardinality, DatasetKind, FeatureDatasetDescription, FieldDescription, RelationshipDescription,
    TableDescription, Value,
};
use gdx_core::{GdxResult, Geodatabase, VersionId};

const D: VersionId = VersionId::DEFAULT;

#[test]
fn tokens_chain_operations_inside_one_batch() -> GdxResult<()> {
    let db = Geodatabase::open_in_memory()?;
    let mut builder = db.schema_builder();
    let utilities = builder.create_feature_dataset(FeatureDatasetDescription::new("Utilities"));
    let poles = builder.create_table(
        TableDescription::feature_class("Poles", GeometryType::Point)
            .in_dataset(&utilities)
            .field(FieldDescription::integer("POLE_ID")),
    );
    let lines = builder.create_table(
        TableDescription::feature_class("Lines", GeometryType::Polyline)
            .in_dataset(&utilities)
            .field(FieldDescription::integer("FROM_POLE")),
    );
    builder.create_relationship_class(RelationshipDescription::new(
        "PoleLines",
        &poles,
        &lines,
        "POLE_ID",
        "FROM_POLE",
        Cardinality::OneToMany,
    ));
    builder.rename_table(&poles, "UtilityPoles");
    let result = builder.build()?;
    assert!(result.success, "{:?}", result.errors);

    let catalog = db.catalog();
    let poles = catalog.require_table("UtilityPoles")?;
    assert_eq!(
        poles.kind,
        DatasetKind::FeatureClass { geometry_type: GeometryType::Point }
    );
    assert_eq!(poles.feature_dataset.as_deref(), Some("Utilities"));
    assert!(poles.shape().is_some());
    let rel = catalog.relationship("PoleLines").expect("relationship created");
    assert_eq!(rel.origin_table, "UtilityPoles");
    assert_eq!(rel.destination_table, "Lines");
    Ok(())
}

#[test]
fn tokens_from_another_builder_are_rejected() -> GdxResult<()> {
    let db = Geodatabase::open_in_memory()?;
    let mut first = db.schema_builder();
    let token = first.create_table(TableDescription::new("Hydrants"));

    let mut second = db.schema_builder();
    second.add_field(&token, FieldDescription::integer("PRESSURE"));
    let result = second.build()?;
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);

    assert!(first.build()?.success);
    assert!(db.table_exists("Hydrants"));
    Ok(())
}

#[test]
fn spatial_filters_select_by_shape() -> GdxResult<()> {
    let db = Geodatabase::open_in_memory()?;
    db.create_table(
        TableDescription::feature_class("Hydrants", GeometryType::Point)
            .field(FieldDescription::text("CODE", 8)),
    )?;
    for (code, x, y) in [("A", 1.0, 1.0), ("B", 5.0, 5.0), ("C", 20.0, 20.0)] {
        db.write_row(
            D,
            "Hydrants",
            None,
            [("CODE", Value::from(code)), ("SHAPE", Value::from(Geometry::point(x, y)))],
        )?;
    }
    // rows without a shape never match a spatial filter
    db.write_row(D, "Hydrants", None, [("CODE", "D")])?;

    let area = Geometry::envelope(0.0, 0.0, 10.0, 10.0);
    let inside = QueryFilter::new().spatial(SpatialFilter::intersects(area.clone()));
    assert_eq!(db.count(D, "Hydrants", &inside)?, 2);

    let within = QueryFilter::new()
        .spatial(SpatialFilter::new(area, SpatialRelationship::Within))
        .where_clause("CODE <> 'A'");
    let codes: Vec<Value> = db
        .search(D, "Hydrants", &within)?
        .map(|r| r.map(|row| row.get("CODE").cloned().unwrap_or(Value::Null)))
        .collect::<GdxResult<_>>()?;
    assert_eq!(codes, vec![Value::from("B")]);

    // shapes must match the declared geometry type
    let wrong = db.write_row(
        D,
        "Hydrants",
        None,
        [("SHAPE", Geometry::polyline(&[(0.0, 0.0), (1.0, 1.0)]))],
    );
    assert!(wrong.is_err());
    Ok(())
}
