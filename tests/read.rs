use fgb::packed_r_tree::PackedRTree;
use fgb::*;
use geozero::geojson::GeoJsonReader;
use geozero::GeozeroDatasource;
use std::io::{Cursor, Read, Seek, SeekFrom};

fn sample_fgb() -> Vec<u8> {
    let mut fgb = FgbWriter::create("sample", GeometryType::Point).unwrap();
    let geojson = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "properties": {"name": "first"}, "geometry": {"type": "Point", "coordinates": [1, 1]}},
        {"type": "Feature", "properties": {"name": "second"}, "geometry": {"type": "Point", "coordinates": [2, 2]}}
    ]}"#;
    GeoJsonReader(&mut geojson.as_bytes())
        .process(&mut fgb)
        .unwrap();
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf).unwrap();
    fgb_buf
}

#[test]
fn read_file_low_level() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let fgb_buf = sample_fgb();
    let mut reader = Cursor::new(&fgb_buf);

    let mut magic_buf: [u8; 8] = [0; 8];
    reader.read_exact(&mut magic_buf)?;
    assert_eq!(magic_buf, MAGIC_BYTES);

    let mut size_buf: [u8; 4] = [0; 4];
    reader.read_exact(&mut size_buf)?;
    let header_size = u32::from_le_bytes(size_buf);

    // verification expects the size prefix to be part of the buffer
    let mut header_buf = vec![0; 4 + header_size as usize];
    header_buf[0..4].copy_from_slice(&size_buf);
    reader.read_exact(&mut header_buf[4..])?;

    let header = size_prefixed_root_as_header(&header_buf)?;
    assert_eq!(header.name(), Some("sample"));
    assert!(header.envelope().is_some());
    let envelope = header.envelope().unwrap();
    assert_eq!(
        (envelope.get(0), envelope.get(1), envelope.get(2), envelope.get(3)),
        (1.0, 1.0, 2.0, 2.0)
    );
    assert_eq!(header.geometry_type(), GeometryType::Point);
    assert!(!header.has_z());
    assert!(!header.has_m());
    assert!(!header.has_t());
    assert!(!header.has_tm());
    assert_eq!(header.features_count(), 2);
    assert_eq!(header.index_node_size(), 16);
    let columns = header.columns().unwrap();
    assert_eq!(columns.len(), 1);
    assert_eq!(columns.get(0).name(), "name");
    assert_eq!(columns.get(0).type_(), ColumnType::String);
    assert!(header.crs().is_none());

    // Skip index
    let index_size =
        PackedRTree::index_size(header.features_count() as usize, header.index_node_size())?;
    // two leaves and one root node, 40 bytes each
    assert_eq!(index_size, 3 * 40);
    reader.seek(SeekFrom::Current(index_size as i64))?;

    // Read first feature
    reader.read_exact(&mut size_buf)?;
    let feature_size = u32::from_le_bytes(size_buf);
    let mut feature_buf = vec![0; 4 + feature_size as usize];
    feature_buf[0..4].copy_from_slice(&size_buf);
    reader.read_exact(&mut feature_buf[4..])?;

    let feature = size_prefixed_root_as_feature(&feature_buf)?;
    assert!(feature.geometry().is_some());
    let geometry = feature.geometry().unwrap();
    let xy = geometry.xy().unwrap();
    assert_eq!(xy.len(), 2);
    assert!(feature.properties().is_some());

    Ok(())
}

#[test]
fn features_count_is_unknown_without_count() {
    // header with features_count = 0 and no index: reader scans to EOF
    let mut fbb = flatbuffers::FlatBufferBuilder::new();
    let header_args = HeaderArgs {
        name: Some(fbb.create_string("nocount")),
        geometry_type: GeometryType::Point,
        features_count: 0,
        index_node_size: 0,
        ..Default::default()
    };
    let header = Header::create(&mut fbb, &header_args);
    fbb.finish_size_prefixed(header, None);

    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb_buf.extend_from_slice(&MAGIC_BYTES);
    fgb_buf.extend_from_slice(fbb.finished_data());
    for point in [[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]] {
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
        fgb_buf.extend_from_slice(fbb.finished_data());
    }

    let mut cursor = Cursor::new(&fgb_buf);
    let mut fgb = FgbReader::open(&mut cursor).unwrap().select_all().unwrap();
    assert_eq!(fgb.features_count(), None);
    let mut count = 0;
    while let Some(feature) = fgb.next().unwrap() {
        assert!(feature.geometry().is_some());
        count += 1;
    }
    assert_eq!(count, 3);
}

#[test]
fn select_bbox_without_index_fails() {
    let options = FgbWriterOptions {
        write_index: false,
        ..Default::default()
    };
    let mut fgb = FgbWriter::create_with_options("noindex", GeometryType::Point, options).unwrap();
    let geojson = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [1, 1]}}
    ]}"#;
    GeoJsonReader(&mut geojson.as_bytes())
        .process(&mut fgb)
        .unwrap();
    let mut fgb_buf: Vec<u8> = Vec::new();
    fgb.write(&mut fgb_buf).unwrap();

    let mut cursor = Cursor::new(&fgb_buf);
    let fgb = FgbReader::open(&mut cursor).unwrap();
    assert!(matches!(
        fgb.select_bbox(0.0, 0.0, 2.0, 2.0),
        Err(Error::NoIndex)
    ));
}

#[test]
fn sequential_reader_skips_index() -> geozero::error::Result<()> {
    let fgb_buf = sample_fgb();
    // non-seekable read: skip the index by reading it
    let mut slice: &[u8] = &fgb_buf;
    let mut fgb = FgbReader::open(&mut slice)?.select_all_seq()?;
    let mut count = 0;
    while let Some(feature) = fgb.next()? {
        assert!(feature.geometry().is_some());
        count += 1;
    }
    assert_eq!(count, 2);
    Ok(())
}
