use fgb::*;
use geozero::geojson::{GeoJson, GeoJsonReader, GeoJsonWriter};
use geozero::{ColumnValue, GeozeroDatasource, PropertyProcessor};
use std::io::Cursor;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[test]
fn fgb_to_geojson() -> Result<()> {
    let options = FgbWriterOptions {
        write_index: false,
        ..Default::default()
    };
    let mut fgb = FgbWriter::create_with_options("lines", GeometryType::LineString, options)?;
    let geojson = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "properties": {"name": "line A"}, "geometry": {"type": "LineString", "coordinates": [[1,1],[2,2]]}},
        {"type": "Feature", "properties": {"name": "line B"}, "geometry": {"type": "LineString", "coordinates": [[3,3],[4,4]]}}
    ]}"#;
    GeoJsonReader(&mut geojson.as_bytes()).process(&mut fgb)?;
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf)?;

    let mut cursor = Cursor::new(&fgb_buf);
    let mut fgb = FgbReader::open(&mut cursor)?.select_all()?;
    let mut json_data: Vec<u8> = Vec::new();
    let mut json = GeoJsonWriter::new(&mut json_data);
    fgb.process_features(&mut json)?;
    let json_out = std::str::from_utf8(&json_data)?.to_string();
    assert!(json_out.contains(r#""type": "FeatureCollection""#));
    assert!(json_out.contains("lines"));
    assert!(json_out.contains(r#""name": "line A""#));
    assert!(json_out.contains("[1,1],[2,2]"));
    assert!(json_out.contains(r#""name": "line B""#));
    assert!(json_out.contains("[3,3],[4,4]"));
    Ok(())
}

#[test]
fn polygon_with_hole_roundtrip() -> Result<()> {
    let polygon = r#"{"type": "Polygon", "coordinates": [
        [[0,0],[10,0],[10,10],[0,10],[0,0]],
        [[2,2],[3,2],[3,3],[2,3],[2,2]]
    ]}"#;
    let mut fgb = FgbWriter::create("poly", GeometryType::Polygon)?;
    fgb.add_feature_geom(GeoJson(polygon), |_| {})?;
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf)?;

    let mut cursor = Cursor::new(&fgb_buf);
    let mut fgb = FgbReader::open(&mut cursor)?.select_all()?;
    let feature = fgb.next()?.expect("one feature");
    let geometry = feature.geometry().expect("geometry");
    // cumulative vertex counts per ring
    let ends: Vec<u32> = geometry.ends().expect("ends").iter().collect();
    assert_eq!(ends, vec![5, 10]);
    let xy = geometry.xy().expect("xy");
    assert_eq!(xy.len(), 20);

    let mut json_data: Vec<u8> = Vec::new();
    let mut json = GeoJsonWriter::new(&mut json_data);
    feature.process(&mut json, 0)?;
    let json_out = std::str::from_utf8(&json_data)?.to_string();
    assert!(json_out.contains(r#""type": "Polygon""#));
    assert!(json_out.contains("[[[0,0],[10,0],[10,10],[0,10],[0,0]],[[2,2],[3,2],[3,3],[2,3],[2,2]]]"));
    Ok(())
}

#[test]
fn single_ring_polygon_omits_ends() -> Result<()> {
    let polygon = r#"{"type": "Polygon", "coordinates": [[[0,0],[4,0],[4,4],[0,4],[0,0]]]}"#;
    let mut fgb = FgbWriter::create("poly1", GeometryType::Polygon)?;
    fgb.add_feature_geom(GeoJson(polygon), |_| {})?;
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf)?;

    let mut cursor = Cursor::new(&fgb_buf);
    let mut fgb = FgbReader::open(&mut cursor)?.select_all()?;
    let feature = fgb.next()?.expect("one feature");
    let geometry = feature.geometry().expect("geometry");
    assert!(geometry.ends().is_none());

    let mut json_data: Vec<u8> = Vec::new();
    let mut json = GeoJsonWriter::new(&mut json_data);
    feature.process(&mut json, 0)?;
    let json_out = std::str::from_utf8(&json_data)?.to_string();
    assert!(json_out.contains("[[[0,0],[4,0],[4,4],[0,4],[0,0]]]"));
    Ok(())
}

#[test]
fn multi_polygon_roundtrip() -> Result<()> {
    let multipolygon = r#"{"type": "MultiPolygon", "coordinates": [
        [[[0,0],[2,0],[2,2],[0,2],[0,0]]],
        [[[10,10],[14,10],[14,14],[10,14],[10,10]],[[11,11],[12,11],[12,12],[11,12],[11,11]]]
    ]}"#;
    let mut fgb = FgbWriter::create("mpoly", GeometryType::MultiPolygon)?;
    fgb.add_feature_geom(GeoJson(multipolygon), |_| {})?;
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf)?;

    let mut cursor = Cursor::new(&fgb_buf);
    let mut fgb = FgbReader::open(&mut cursor)?.select_all()?;
    let feature = fgb.next()?.expect("one feature");
    let geometry = feature.geometry().expect("geometry");
    // MultiPolygon is encoded as Polygon sub-geometries
    let parts = geometry.parts().expect("parts");
    assert_eq!(parts.len(), 2);
    assert_eq!(parts.get(0).type_(), GeometryType::Polygon);
    assert!(parts.get(0).ends().is_none());
    let ends: Vec<u32> = parts.get(1).ends().expect("ends").iter().collect();
    assert_eq!(ends, vec![5, 10]);

    let mut json_data: Vec<u8> = Vec::new();
    let mut json = GeoJsonWriter::new(&mut json_data);
    feature.process(&mut json, 0)?;
    let json_out = std::str::from_utf8(&json_data)?.to_string();
    assert!(json_out.contains(r#""type": "MultiPolygon""#));
    assert!(json_out.contains("[[[10,10],[14,10],[14,14],[10,14],[10,10]],[[11,11],[12,11],[12,12],[11,12],[11,11]]]"));
    Ok(())
}

#[test]
fn multi_linestring_roundtrip() -> Result<()> {
    let multiline = r#"{"type": "MultiLineString", "coordinates": [[[0,0],[1,1],[2,2]],[[5,5],[6,6]]]}"#;
    let mut fgb = FgbWriter::create("mline", GeometryType::MultiLineString)?;
    fgb.add_feature_geom(GeoJson(multiline), |_| {})?;
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf)?;

    let mut cursor = Cursor::new(&fgb_buf);
    let mut fgb = FgbReader::open(&mut cursor)?.select_all()?;
    let feature = fgb.next()?.expect("one feature");
    let geometry = feature.geometry().expect("geometry");
    let ends: Vec<u32> = geometry.ends().expect("ends").iter().collect();
    assert_eq!(ends, vec![3, 5]);

    let mut json_data: Vec<u8> = Vec::new();
    let mut json = GeoJsonWriter::new(&mut json_data);
    feature.process(&mut json, 0)?;
    let json_out = std::str::from_utf8(&json_data)?.to_string();
    assert!(json_out.contains(r#""type": "MultiLineString""#));
    assert!(json_out.contains("[[[0,0],[1,1],[2,2]],[[5,5],[6,6]]]"));
    Ok(())
}

#[test]
fn geometry_collection_roundtrip() -> Result<()> {
    let collection = r#"{"type": "GeometryCollection", "geometries": [
        {"type": "Point", "coordinates": [1, 2]},
        {"type": "LineString", "coordinates": [[3,3],[4,4]]}
    ]}"#;
    let mut fgb = FgbWriter::create("gc", GeometryType::GeometryCollection)?;
    fgb.add_feature_geom(GeoJson(collection), |_| {})?;
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf)?;

    let mut cursor = Cursor::new(&fgb_buf);
    let mut fgb = FgbReader::open(&mut cursor)?.select_all()?;
    let feature = fgb.next()?.expect("one feature");
    let geometry = feature.geometry().expect("geometry");
    let parts = geometry.parts().expect("parts");
    assert_eq!(parts.len(), 2);
    assert_eq!(parts.get(0).type_(), GeometryType::Point);
    assert_eq!(parts.get(1).type_(), GeometryType::LineString);

    let mut json_data: Vec<u8> = Vec::new();
    let mut json = GeoJsonWriter::new(&mut json_data);
    feature.process(&mut json, 0)?;
    let json_out = std::str::from_utf8(&json_data)?.to_string();
    assert!(json_out.contains(r#""type": "GeometryCollection""#));
    assert!(json_out.contains("[1,2]"));
    Ok(())
}

#[test]
fn property_types_roundtrip() -> Result<()> {
    let mut fgb = FgbWriter::create("props", GeometryType::Point)?;
    fgb.add_column("flag", ColumnType::Bool);
    fgb.add_column("small", ColumnType::Short);
    fgb.add_column("count", ColumnType::Int);
    fgb.add_column("big", ColumnType::Long);
    fgb.add_column("ratio", ColumnType::Float);
    fgb.add_column("value", ColumnType::Double);
    fgb.add_column("name", ColumnType::String);
    fgb.add_column("meta", ColumnType::Json);
    fgb.add_column("observed", ColumnType::DateTime);
    fgb.add_feature_geom(GeoJson(r#"{"type": "Point", "coordinates": [7, 8]}"#), |feat| {
        feat.property(0, "flag", &ColumnValue::Bool(true)).unwrap();
        feat.property(1, "small", &ColumnValue::Short(-42)).unwrap();
        feat.property(2, "count", &ColumnValue::Int(1234)).unwrap();
        feat.property(3, "big", &ColumnValue::Long(-9876543210)).unwrap();
        feat.property(4, "ratio", &ColumnValue::Float(0.5)).unwrap();
        feat.property(5, "value", &ColumnValue::Double(1.25)).unwrap();
        feat.property(6, "name", &ColumnValue::String("point seven"))
            .unwrap();
        feat.property(7, "meta", &ColumnValue::Json(r#"{"a":1}"#)).unwrap();
        feat.property(
            8,
            "observed",
            &ColumnValue::DateTime("2011-07-14T19:43:37Z"),
        )
        .unwrap();
    })?;
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf)?;

    let mut cursor = Cursor::new(&fgb_buf);
    let mut fgb = FgbReader::open(&mut cursor)?.select_all()?;
    let feature = fgb.next()?.expect("one feature");
    assert_eq!(feature.property::<bool>("flag").ok(), Some(true));
    assert_eq!(feature.property::<i16>("small").ok(), Some(-42));
    assert_eq!(feature.property::<i32>("count").ok(), Some(1234));
    assert_eq!(feature.property::<i64>("big").ok(), Some(-9876543210));
    assert_eq!(feature.property::<f32>("ratio").ok(), Some(0.5));
    assert_eq!(feature.property::<f64>("value").ok(), Some(1.25));
    assert_eq!(
        feature.property::<String>("name").ok(),
        Some("point seven".to_string())
    );
    let props = feature.properties()?;
    assert_eq!(props["meta"], r#"{"a":1}"#);
    assert_eq!(props["observed"], "2011-07-14T19:43:37Z");
    Ok(())
}

#[test]
fn spatial_filter_queries() -> Result<()> {
    let mut fgb = FgbWriter::create("points", GeometryType::Point)?;
    fgb.add_column("name", ColumnType::String);
    for (name, x, y) in [
        ("a", 0.5, 0.5),
        ("b", 50.0, 50.0),
        ("c", 70.0, 70.0),
        ("d", 500.0, 500.0),
    ] {
        let geojson = format!(r#"{{"type": "Point", "coordinates": [{x}, {y}]}}"#);
        fgb.add_feature_geom(GeoJson(&geojson), |feat| {
            feat.property(0, "name", &ColumnValue::String(name)).unwrap();
        })?;
    }
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf)?;

    let queries = [
        ((0.0, 0.0, 1.0, 1.0), vec!["a"]),
        ((10.0, 10.0, 100.0, 100.0), vec!["b", "c"]),
        ((0.0, 0.0, 1000.0, 1000.0), vec!["a", "b", "c", "d"]),
    ];
    for ((min_x, min_y, max_x, max_y), expected) in queries {
        let mut cursor = Cursor::new(&fgb_buf);
        let mut fgb = FgbReader::open(&mut cursor)?.select_bbox(min_x, min_y, max_x, max_y)?;
        assert_eq!(fgb.features_count(), Some(expected.len()));
        let mut names = Vec::new();
        while let Some(feature) = fgb.next()? {
            names.push(feature.property::<String>("name").unwrap());
        }
        names.sort();
        assert_eq!(names, expected);
    }
    Ok(())
}

#[test]
fn indexed_roundtrip_is_set_equal() -> Result<()> {
    let mut fgb = FgbWriter::create("points", GeometryType::Point)?;
    fgb.add_column("fid", ColumnType::Int);
    let input: Vec<(i32, f64, f64)> = (0..20).map(|i| (i, (i * 7 % 13) as f64, (i * 5 % 11) as f64)).collect();
    for (fid, x, y) in &input {
        let geojson = format!(r#"{{"type": "Point", "coordinates": [{x}, {y}]}}"#);
        fgb.add_feature_geom(GeoJson(&geojson), |feat| {
            feat.property(0, "fid", &ColumnValue::Int(*fid)).unwrap();
        })?;
    }
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf)?;

    let mut cursor = Cursor::new(&fgb_buf);
    let mut fgb = FgbReader::open(&mut cursor)?.select_all()?;
    let mut seen = Vec::new();
    while let Some(feature) = fgb.next()? {
        let fid = feature.property::<i32>("fid").unwrap();
        let geometry = feature.geometry().unwrap();
        let xy = geometry.xy().unwrap();
        seen.push((fid, xy.get(0), xy.get(1)));
    }
    assert_eq!(seen.len(), input.len());
    // file order is Hilbert order, so compare as sets
    let mut seen_sorted = seen.clone();
    seen_sorted.sort_by_key(|(fid, _, _)| *fid);
    assert_eq!(seen_sorted, input);
    Ok(())
}
