use fgb::*;
use geozero::geojson::{GeoJson, GeoJsonReader};
use geozero::{GeozeroDatasource, PropertyProcessor};
use std::io::{BufWriter, Cursor, Write};
use tempfile::tempfile;

#[test]
fn write_file() -> std::io::Result<()> {
    let mut file = BufWriter::new(tempfile()?);
    let points = [[1.0, 1.0], [2.0, 2.0]];

    const MAGIC_BYTES: [u8; 8] = [b'f', b'g', b'b', 3, b'f', b'g', b'b', 0];
    file.write_all(&MAGIC_BYTES)?;

    let mut fbb = flatbuffers::FlatBufferBuilder::new();
    let column_args = ColumnArgs {
        name: Some(fbb.create_string("STATE_FIPS")),
        type_: ColumnType::String,
    };
    let column = Column::create(&mut fbb, &column_args);
    let header_args = HeaderArgs {
        name: Some(fbb.create_string("Test1")),
        geometry_type: GeometryType::Point,
        columns: Some(fbb.create_vector(&[column])),
        features_count: points.len() as u64,
        index_node_size: 0,
        ..Default::default()
    };

    let header = Header::create(&mut fbb, &header_args);
    fbb.finish_size_prefixed(header, None);
    let buf = fbb.finished_data();
    file.write_all(buf)?;

    for point in points {
        let mut fbb = flatbuffers::FlatBufferBuilder::new();
        let xy = fbb.create_vector(&point);
        let g = Geometry::create(
            &mut fbb,
            &GeometryArgs {
                xy: Some(xy),
                ..Default::default()
            },
        );
        let f = Feature::create(
            &mut fbb,
            &FeatureArgs {
                geometry: Some(g),
                ..Default::default()
            },
        );
        fbb.finish_size_prefixed(f, None);
        let buf = fbb.finished_data();
        assert_eq!(buf.len(), 64);

        file.write_all(buf)?;
    }

    Ok(())
}

#[test]
fn verify_header() {
    let mut builder = flatbuffers::FlatBufferBuilder::with_capacity(1024);
    let empty_vec = builder.create_vector::<flatbuffers::WIPOffset<Column>>(&[]);
    let header_args = HeaderArgs {
        name: Some(builder.create_string("triangle")),
        envelope: Some(builder.create_vector(&[0.0, 0.0, 9.0, 9.0])),
        geometry_type: GeometryType::Triangle,
        columns: Some(empty_vec),
        features_count: 1,
        ..Default::default()
    };
    let header = Header::create(&mut builder, &header_args);
    builder.finish_size_prefixed(header, None);
    let buf = builder.finished_data();

    // verify
    let header = size_prefixed_root_as_header(buf).unwrap();
    assert_eq!(header.features_count(), 1);

    assert!(
        root_as_header(&buf[4..]).is_err(),
        "Verification without size prefix fails"
    );
}

#[test]
fn single_point_roundtrip() -> geozero::error::Result<()> {
    let mut fgb = FgbWriter::create("single", GeometryType::Point)?;
    fgb.add_feature_geom(GeoJson(r#"{"type": "Point", "coordinates": [1, 1]}"#), |_| {})?;
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf)?;

    let mut cursor = Cursor::new(&fgb_buf);
    let mut fgb = FgbReader::open(&mut cursor)?.select_all()?;
    assert_eq!(fgb.features_count(), Some(1));
    let feature = fgb.next()?.expect("first feature");
    let geometry = feature.geometry().expect("geometry");
    let xy = geometry.xy().expect("xy");
    assert_eq!((xy.get(0), xy.get(1)), (1.0, 1.0));
    assert!(feature.fbs_feature().properties().is_none());
    assert!(fgb.next()?.is_none());
    Ok(())
}

#[test]
fn unindexed_write_preserves_order() -> geozero::error::Result<()> {
    let options = FgbWriterOptions {
        write_index: false,
        ..Default::default()
    };
    let mut fgb = FgbWriter::create_with_options("seq", GeometryType::Point, options)?;
    fgb.add_column("fid", ColumnType::Int);
    // insertion order is far from Hilbert order
    for (fid, xy) in [(0, (0.0, 0.0)), (1, (100.0, 100.0)), (2, (0.5, 0.5))] {
        let geojson = format!(
            r#"{{"type": "Point", "coordinates": [{}, {}]}}"#,
            xy.0, xy.1
        );
        fgb.add_feature_geom(GeoJson(&geojson), |feat| {
            feat.property(0, "fid", &geozero::ColumnValue::Int(fid)).unwrap();
        })?;
    }
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf)?;

    let mut cursor = Cursor::new(&fgb_buf);
    let mut fgb = FgbReader::open(&mut cursor)?.select_all()?;
    assert_eq!(fgb.header().index_node_size(), 0);
    assert!(fgb.header().envelope().is_none());
    let mut fids = Vec::new();
    while let Some(feature) = fgb.next()? {
        fids.push(feature.property::<i32>("fid").unwrap());
    }
    assert_eq!(fids, vec![0, 1, 2]);
    Ok(())
}

#[test]
fn write_without_features() {
    let fgb = FgbWriter::create("empty", GeometryType::Point).unwrap();
    let mut fgb_buf: Vec<u8> = Vec::new();
    let result = fgb.write(&mut fgb_buf);
    assert!(matches!(result, Err(Error::NoFeaturesWritten)));
    // nothing was emitted
    assert!(fgb_buf.is_empty());
}

#[test]
fn reject_mutated_magic_bytes() -> geozero::error::Result<()> {
    let mut fgb = FgbWriter::create("magic", GeometryType::Point)?;
    fgb.add_feature_geom(GeoJson(r#"{"type": "Point", "coordinates": [1, 1]}"#), |_| {})?;
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf)?;

    for i in 0..8 {
        let mut mutated = fgb_buf.clone();
        mutated[i] ^= 0xFF;
        let mut cursor = Cursor::new(&mutated);
        let result = FgbReader::open(&mut cursor);
        assert!(
            matches!(result, Err(Error::MissingMagicBytes)),
            "byte {i} must invalidate the magic"
        );
    }
    Ok(())
}

#[test]
fn detect_geometry_type() -> geozero::error::Result<()> {
    let mut fgb = FgbWriter::create("detect", GeometryType::Unknown)?;
    let geojson = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [3, 4]}}
    ]}"#;
    GeoJsonReader(&mut geojson.as_bytes()).process(&mut fgb)?;
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf)?;

    let mut cursor = Cursor::new(&fgb_buf);
    let fgb = FgbReader::open(&mut cursor)?;
    assert_eq!(fgb.header().geometry_type(), GeometryType::Point);
    Ok(())
}
