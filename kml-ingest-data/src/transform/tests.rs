use super::*;
use crate::unify::infer;
use rstest::{fixture, rstest};

fn kml(body: &str) -> String {
    format!("<kml><Document>{body}</Document></kml>")
}

fn schemas(source: &str, collate: bool) -> Vec<UnifiedSchema> {
    infer(KmlReader::new(source.as_bytes(), ReadMode::Full), "layer", collate)
        .unwrap_or_else(|err| panic!("inference failed: {err}"))
        .schemas
}

fn transform_all(source: &str, schema: &UnifiedSchema) -> Vec<TypedRecord> {
    RecordTransformer::from_source(source.as_bytes(), schema, false)
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|err| panic!("transform failed: {err}"))
}

#[fixture]
fn mixed_source() -> String {
    kml(concat!(
        r#"<Placemark id="pt"><Point><coordinates>1,2</coordinates></Point></Placemark>"#,
        r#"<Placemark id="none"><name>floating</name></Placemark>"#,
        r#"<Placemark id="line"><LineString><coordinates>0,0 1,1</coordinates></LineString></Placemark>"#,
        r#"<Placemark id="area"><Polygon><outerBoundaryIs><LinearRing>"#,
        "<coordinates>0,0 1,0 1,1 0,0</coordinates></LinearRing></outerBoundaryIs>",
        "</Polygon></Placemark>",
        r#"<Placemark id="pt2"><Point><coordinates>3,4</coordinates></Point></Placemark>"#,
    ))
}

#[rstest]
fn empty_source_transforms_to_nothing() {
    let source = kml("");
    assert!(schemas(&source, false).is_empty());
    let schema = UnifiedSchema::new("layer", Vec::new());
    assert!(transform_all(&source, &schema).is_empty());
}

#[rstest]
fn bare_placemark_omits_style_and_folder() {
    let source = kml("<Placemark><name>solo</name></Placemark>");
    let schemas = schemas(&source, false);
    let records = transform_all(&source, &schemas[0]);
    let [record] = records.as_slice() else {
        panic!("expected one record");
    };
    assert_eq!(record.text("name"), Some("solo"));
    assert!(record.get("Style").is_none());
    assert!(record.get("Folder").is_none());
    assert!(record.get("Geometry").is_none());
    assert_eq!(record.id, "layer.1");
}

#[rstest]
fn typed_extended_data_survives_the_second_pass() {
    let source = kml(concat!(
        r#"<Schema name="schema1"><SimpleField type="int" name="berths"/></Schema>"#,
        r#"<Schema name="schema2"><SimpleField type="float" name="depth"/></Schema>"#,
        "<Placemark><ExtendedData>",
        r##"<SchemaData schemaUrl="#schema1"><SimpleData name="berths">42</SimpleData></SchemaData>"##,
        r##"<SchemaData schemaUrl="#schema2"><SimpleData name="depth">4.2</SimpleData></SchemaData>"##,
        "</ExtendedData></Placemark>",
    ));
    let schemas = schemas(&source, false);
    let records = transform_all(&source, &schemas[0]);
    let [record] = records.as_slice() else {
        panic!("expected one record");
    };
    assert_eq!(record.get("berths"), Some(&Value::Integer(42)));
    assert_eq!(record.get("depth"), Some(&Value::Float(4.2)));
}

#[rstest]
fn custom_schema_elements_become_records() {
    let source = kml(concat!(
        r#"<Schema name="myschema"><SimpleField type="int" name="berths"/></Schema>"#,
        "<myschema><berths>7</berths></myschema>",
    ));
    let schemas = schemas(&source, false);
    let records = transform_all(&source, &schemas[0]);
    let [record] = records.as_slice() else {
        panic!("expected one record");
    };
    assert_eq!(record.get("berths"), Some(&Value::Integer(7)));
}

#[rstest]
fn synthesises_style_and_folder() {
    let source = kml(concat!(
        r#"<Style id="s"><LineStyle><width>2</width></LineStyle></Style>"#,
        "<Folder><name>a</name><Folder><Folder><name>c</name>",
        "<Placemark><styleUrl>#s</styleUrl></Placemark>",
        "</Folder></Folder></Folder>",
    ));
    let schemas = schemas(&source, false);
    let records = transform_all(&source, &schemas[0]);
    let [record] = records.as_slice() else {
        panic!("expected one record");
    };
    assert_eq!(record.text("Style"), Some("#s"));
    assert_eq!(record.text("Folder"), Some("a -> c"));
}

#[rstest]
fn records_follow_schema_field_order() {
    let source = kml(concat!(
        r#"<Placemark><ExtendedData><Data name="zeta"><value>z</value></Data></ExtendedData>"#,
        "<description>d</description><name>n</name>",
        "<Point><coordinates>1,2</coordinates></Point></Placemark>",
    ));
    let schemas = schemas(&source, false);
    let records = transform_all(&source, &schemas[0]);
    let keys: Vec<&str> = records[0].attrs.keys().map(String::as_str).collect();
    assert_eq!(keys, ["Geometry", "name", "description", "zeta"]);
    assert!(keys.iter().all(|key| schemas[0].contains(key)));
}

#[rstest]
fn untyped_values_fill_only_schema_fields() {
    let source = kml(
        r#"<Placemark><ExtendedData><Data name="berth"><value>north</value></Data></ExtendedData></Placemark>"#,
    );
    let schema = UnifiedSchema::new("narrow", vec![kml_ingest_core::Field::text("name")]);
    let records = transform_all(&source, &schema);
    assert!(records[0].attrs.is_empty());
}

#[rstest]
#[case::name("name")]
#[case::description("description")]
fn untyped_values_override_structural_fields(#[case] field: &str) {
    let source = kml(&format!(
        r#"<Placemark><name>Pier</name><description>Quay side</description><ExtendedData><Data name="{field}"><value>Override</value></Data></ExtendedData></Placemark>"#
    ));
    let schemas = schemas(&source, false);
    let records = transform_all(&source, &schemas[0]);
    let [record] = records.as_slice() else {
        panic!("expected one record");
    };
    assert_eq!(record.text(field), Some("Override"));
    assert_eq!(
        schemas[0].fields.iter().filter(|f| f.name == field).count(),
        1
    );
}

#[rstest]
fn uncoercible_values_are_dropped_with_a_warning() {
    let source = kml(
        r#"<Placemark><ExtendedData><Data name="count"><value>many</value></Data></ExtendedData></Placemark>"#,
    );
    let schema = UnifiedSchema::new(
        "typed",
        vec![kml_ingest_core::Field::new(
            "count",
            kml_ingest_core::FieldType::Integer,
        )],
    );
    let mut transformer = RecordTransformer::from_source(source.as_bytes(), &schema, false);
    let record = transformer
        .next()
        .expect("one record")
        .expect("transform succeeds");
    assert!(record.get("count").is_none());
    assert_eq!(transformer.take_warnings().len(), 1);
}

#[rstest]
fn rewrites_description_links() {
    let source = kml(concat!(
        "<Placemark><name>images/a.png</name>",
        r#"<description><![CDATA[<img src="images/a.png">]]></description></Placemark>"#,
    ));
    let schemas = schemas(&source, false);
    let rule = RewriteRule::new("/ctx/styles", ["images/a.png"]).expect("rule");
    let records: Vec<TypedRecord> =
        RecordTransformer::from_source(source.as_bytes(), &schemas[0], false)
            .with_rewrite(rule)
            .collect::<Result<_, _>>()
            .expect("transform");
    assert_eq!(
        records[0].text("description"),
        Some(r#"<img src="/ctx/stylesimages/a.png">"#)
    );
    assert_eq!(records[0].text("name"), Some("images/a.png"));
}

#[rstest]
fn partitions_cover_every_record_once(mixed_source: String) {
    let uncollated = schemas(&mixed_source, false);
    let all: Vec<String> = transform_all(&mixed_source, &uncollated[0])
        .into_iter()
        .map(|record| record.id)
        .collect();

    let partitions = schemas(&mixed_source, true);
    assert_eq!(partitions.len(), 3);
    let mut seen: Vec<String> = Vec::new();
    for partition in &partitions {
        let kind = partition.geometry_kind().expect("partition kind");
        for record in transform_all(&mixed_source, partition) {
            let geometry = record.get("Geometry").and_then(|value| match value {
                Value::Geometry(geometry) => Some(geometry),
                _ => None,
            });
            assert!(kind.admits(geometry), "{} leaked into {kind}", record.id);
            seen.push(record.id);
        }
    }
    seen.sort();
    let mut expected = all;
    expected.sort();
    assert_eq!(seen, expected);
}

#[rstest]
fn null_geometry_lands_in_the_point_partition(mixed_source: String) {
    let partitions = schemas(&mixed_source, true);
    let points = partitions
        .iter()
        .find(|schema| schema.geometry_kind() == Some(GeometryKind::Point))
        .expect("point partition");
    let ids: Vec<String> = transform_all(&mixed_source, points)
        .into_iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(ids, ["pt", "none", "pt2"]);
}

#[rstest]
fn parse_errors_surface_unchanged() {
    let source = kml(
        "<Placemark><name>ok</name></Placemark><Placemark><Point><coordinates>x</coordinates></Point></Placemark>",
    );
    let schema = UnifiedSchema::new("layer", Vec::new());
    let mut transformer = RecordTransformer::from_source(source.as_bytes(), &schema, false);
    assert!(matches!(transformer.next(), Some(Ok(_))));
    assert!(matches!(
        transformer.next(),
        Some(Err(ParseError::Geometry { .. }))
    ));
    assert!(transformer.next().is_none());
}

#[rstest]
fn lenient_second_pass_drops_geometry() {
    let source = kml("<Placemark><Point><coordinates>x</coordinates></Point></Placemark>");
    let schema = UnifiedSchema::new(
        "layer",
        vec![kml_ingest_core::Field::new(
            GEOMETRY_FIELD,
            kml_ingest_core::FieldType::Geometry(None),
        )],
    );
    let mut transformer = RecordTransformer::from_source(source.as_bytes(), &schema, true);
    let record = transformer.next().expect("record").expect("lenient");
    assert!(record.get("Geometry").is_none());
    assert_eq!(transformer.take_warnings().len(), 1);
}

#[rstest]
fn reader_mode_carries_declared_names() {
    let schema = UnifiedSchema::new("layer", Vec::new()).with_declared_schemas(vec!["s".into()]);
    assert_eq!(
        reader_mode_for(&schema),
        ReadMode::FeaturesOnly {
            schema_names: vec!["s".into()]
        }
    );
}
