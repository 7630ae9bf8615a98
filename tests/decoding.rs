//! XML text to datasets and trees, without any product knowledge.
use num_complex::Complex64;
use pretty_assertions::assert_eq;
use safetree::core::decode::classify;
use safetree::io::decode_xml;
use safetree::types::StructuralClass;
use safetree::{ArrayData, DecodedNode, Error, LayoutRule, Markers, ReaderOptions, Scalar, build_tree, extract_dataset, merge_siblings};

fn decode(xml: &str) -> DecodedNode {
    decode_xml(xml.as_bytes(), &Markers::default()).unwrap()
}

#[test]
fn complex_values_from_data_streams() {
    let doc = decode(
        r#"<lut>
             <gain dataStream="Real">1 2</gain>
             <gain dataStream="Imaginary">3 4</gain>
           </lut>"#,
    );
    let ds = extract_dataset(&doc, None, &Markers::default()).unwrap();
    let gain = &ds.data_vars["gain"];
    assert_eq!(gain.attrs["type"], Scalar::from("complex"));
    assert_eq!(
        gain.data,
        ArrayData::from_complex(vec![Complex64::new(1.0, 3.0), Complex64::new(2.0, 4.0)])
    );
}

#[test]
fn magnitude_values_stay_real() {
    let doc = decode(r#"<lut><gain dataStream="Magnitude">5 6</gain></lut>"#);
    let markers = Markers::default();
    let gain = doc.get("gain").unwrap();
    // a single element is not a list; the composite needs its one-element form
    let items = DecodedNode::List(vec![gain.clone()]);
    assert_eq!(classify(&items, &markers).unwrap().class(), StructuralClass::CompositeValue);
    let ds = extract_dataset(
        &DecodedNode::Map([("gain".to_string(), items)].into_iter().collect()),
        None,
        &markers,
    )
    .unwrap();
    assert_eq!(ds.data_vars["gain"].attrs["type"], Scalar::from("magnitude"));
    assert_eq!(ds.data_vars["gain"].data.to_f64_vec(), Some(vec![5.0, 6.0]));
}

#[test]
fn attributed_rows_become_a_coordinate() {
    let doc = decode(
        r#"<table>
             <value beam="S1">1.5</value>
             <value beam="S2">2.5</value>
             <value beam="S3">3.5</value>
           </table>"#,
    );
    let ds = extract_dataset(&doc, None, &Markers::default()).unwrap();
    let value = &ds.data_vars["value"];
    assert_eq!(value.dims, vec!["beam"]);
    assert_eq!(value.shape(), &[3]);
    assert_eq!(
        ds.coords["beam"].data.to_scalars(),
        vec![Scalar::from("S1"), Scalar::from("S2"), Scalar::from("S3")]
    );
}

#[test]
fn sparse_grid_is_unstacked_with_missing_cells() {
    let mut rows = String::new();
    for line in 0..3 {
        for pixel in 0..4 {
            if (line, pixel) == (1, 1) || (line, pixel) == (2, 3) {
                continue;
            }
            rows.push_str(&format!(
                r#"<point line="{line}" pixel="{pixel}">{v}.5</point>"#,
                v = line * 4 + pixel
            ));
        }
    }
    let doc = decode(&format!("<grid>{}</grid>", rows));
    let ds = extract_dataset(&doc, None, &Markers::default()).unwrap();
    let point = &ds.data_vars["point"];
    assert_eq!(point.dims, vec!["line", "pixel"]);
    assert_eq!(point.shape(), &[3, 4]);
    assert_eq!(point.data.count_missing(), 2);
}

#[test]
fn lone_row_table_is_flattened_into_its_parent() {
    let doc = decode(
        r#"<beams>
             <mission>RCM</mission>
             <beam><name>S1</name><angle units="deg">20.5</angle></beam>
             <beam><name>S2</name><angle units="deg">25.5</angle></beam>
           </beams>"#,
    );
    let ds = extract_dataset(&doc, None, &Markers::default()).unwrap();
    assert_eq!(ds.attrs["mission"], Scalar::from("RCM"));
    assert!(ds.data_vars.contains_key("angle"));
    assert!(!ds.data_vars.contains_key("beam"));
    assert_eq!(ds.data_vars["angle"].shape(), &[2]);
}

#[test]
fn siblings_of_different_lengths_are_padded() {
    let markers = Markers::default();
    let level = |n: usize| {
        let values: Vec<String> = (0..n).map(|i| format!("{}.5", i)).collect();
        let doc = decode(&format!("<noise><levels>{}</levels></noise>", values.join(" ")));
        extract_dataset(&doc, None, &markers).unwrap()
    };
    let merged = merge_siblings(vec![level(5), level(7)], ["HH", "HV"], "pole").unwrap();
    let levels = &merged.data_vars["levels"];
    assert_eq!(levels.dims, vec!["pole", "levels"]);
    assert_eq!(levels.shape(), &[2, 7]);
    let values = levels.data.to_f64_vec().unwrap();
    assert!(values[5].is_nan() && values[6].is_nan());
    assert!(!values[7].is_nan());
}

#[test]
fn siblings_with_different_beams_share_one_beam_axis() {
    let markers = Markers::default();
    let table = |beams: std::ops::Range<usize>| {
        let rows: String = beams
            .map(|b| format!(r#"<gain beam="B{b}">{b}.5</gain>"#))
            .collect();
        extract_dataset(&decode(&format!("<lut>{}</lut>", rows)), None, &markers).unwrap()
    };
    let merged = merge_siblings(vec![table(0..5), table(0..7)], ["HH", "HV"], "pole").unwrap();
    assert_eq!(merged.coords["beam"].dims, vec!["beam"]);
    assert_eq!(merged.coords["beam"].shape(), &[7]);
    let gain = &merged.data_vars["gain"];
    assert_eq!(gain.dims, vec!["pole", "beam"]);
    assert_eq!(gain.shape(), &[2, 7]);
    assert_eq!(gain.data.count_missing(), 2);
}

#[test]
fn absent_source_path_skips_only_its_rule() {
    let doc = decode("<product><header><mission>RCM</mission></header></product>");
    let rules = vec![
        LayoutRule::metadata("/", "/header", &[]),
        LayoutRule::dataset("/orbit", "/orbitInformation", &["time"]),
    ];
    let tree = build_tree(&doc, &rules, &ReaderOptions::default()).unwrap();
    assert_eq!(tree.paths().collect::<Vec<_>>(), vec!["/"]);
    assert_eq!(tree.get("/").unwrap().attrs["mission"], Scalar::from("RCM"));
    let err = build_tree(&doc, &rules[1..], &ReaderOptions::default()).unwrap_err();
    assert!(matches!(err, Error::MissingPath { path } if path == "/orbitInformation"));
}

#[test]
fn unknown_shapes_are_schema_mismatches() {
    let doc = decode("<a><b><c><d>1</d></c></b><e>2 3</e></a>");
    let err = extract_dataset(&doc, None, &Markers::default()).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch { .. }));
}
