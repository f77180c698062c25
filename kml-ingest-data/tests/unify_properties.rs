//! Property-based tests for schema inference.
//!
//! # Invariants tested
//!
//! - **Disjoint union:** two records with disjoint free-form attributes give
//!   a schema holding the baseline plus every distinct name, each once.
//! - **Idempotence:** inferring twice over the same bytes gives the same
//!   schemas.

use std::collections::BTreeSet;

use kml_ingest_data::reader::{KmlReader, ReadMode};
use kml_ingest_data::unify::{Inference, infer};
use proptest::prelude::*;

const BASELINE_FIELDS: usize = 9;

fn placemark(attributes: &BTreeSet<String>) -> String {
    let data: String = attributes
        .iter()
        .map(|name| format!(r#"<Data name="{name}"><value>v</value></Data>"#))
        .collect();
    format!("<Placemark><ExtendedData>{data}</ExtendedData></Placemark>")
}

fn run(source: &str, collate: bool) -> Inference {
    infer(
        KmlReader::new(source.as_bytes(), ReadMode::Full),
        "props",
        collate,
    )
    .unwrap_or_else(|err| panic!("inference failed: {err}"))
}

fn attribute_names() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("attr_[a-z]{1,6}", 0..6)
}

fn geometry() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "",
        "<Point><coordinates>1,2</coordinates></Point>",
        "<LineString><coordinates>0,0 1,1</coordinates></LineString>",
        "<Polygon><outerBoundaryIs><LinearRing><coordinates>0,0 1,0 1,1 0,0</coordinates></LinearRing></outerBoundaryIs></Polygon>",
    ])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Disjoint free-form attributes are unioned without duplicates.
    #[test]
    fn disjoint_attributes_are_unioned(
        left in attribute_names(),
        right in attribute_names(),
    ) {
        let right: BTreeSet<String> = right.difference(&left).cloned().collect();
        let source = format!("<kml>{}{}</kml>", placemark(&left), placemark(&right));
        let inference = run(&source, false);

        prop_assert_eq!(inference.schemas.len(), 1);
        let schema = &inference.schemas[0];
        prop_assert_eq!(schema.fields.len(), BASELINE_FIELDS + left.len() + right.len());
        let distinct: BTreeSet<&str> = schema.field_names().collect();
        prop_assert_eq!(distinct.len(), schema.fields.len());
    }

    /// Inference is a pure function of the source bytes.
    #[test]
    fn inference_is_idempotent(
        attributes in attribute_names(),
        shapes in prop::collection::vec(geometry(), 1..5),
        collate in any::<bool>(),
    ) {
        let body: String = shapes
            .iter()
            .map(|shape| {
                let mut record = placemark(&attributes);
                record.insert_str(record.len() - "</Placemark>".len(), shape);
                record
            })
            .collect();
        let source = format!("<kml><Document>{body}</Document></kml>");

        prop_assert_eq!(run(&source, collate), run(&source, collate));
    }
}
