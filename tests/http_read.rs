#![cfg(feature = "http")]

use fgb::*;
use geozero::geojson::{GeoJson, GeoJsonWriter};
use geozero::{ColumnValue, PropertyProcessor};
use std::io::{Cursor, Write};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn write_test_fgb() -> Result<tempfile::NamedTempFile> {
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
    let mut file = tempfile::NamedTempFile::new()?;
    let mut buf: Vec<u8> = Vec::new();
    fgb.write(&mut buf)?;
    file.write_all(&buf)?;
    file.flush()?;
    Ok(file)
}

#[tokio::test]
async fn http_select_all() -> Result<()> {
    let file = write_test_fgb()?;
    let (fgb, stats) =
        HttpFgbReader::mock_from_file(file.path().to_str().unwrap()).await?;
    assert_eq!(fgb.header().geometry_type(), GeometryType::Point);
    let mut fgb = fgb.select_all().await?;
    assert_eq!(fgb.features_count(), Some(4));
    let mut count = 0;
    while let Some(feature) = fgb.next().await? {
        assert!(feature.geometry().is_some());
        count += 1;
    }
    assert_eq!(count, 4);
    let stats = stats.read().unwrap();
    assert!(stats.request_count > 0);
    Ok(())
}

#[tokio::test]
async fn http_select_bbox_matches_file_reader() -> Result<()> {
    let file = write_test_fgb()?;
    let bbox = (10.0, 10.0, 100.0, 100.0);

    // via mocked http range requests
    let (fgb, _stats) =
        HttpFgbReader::mock_from_file(file.path().to_str().unwrap()).await?;
    let mut fgb = fgb.select_bbox(bbox.0, bbox.1, bbox.2, bbox.3).await?;
    let mut http_names = Vec::new();
    while let Some(feature) = fgb.next().await? {
        http_names.push(feature.properties()?["name"].clone());
    }
    http_names.sort();

    // via the file reader
    let buf = std::fs::read(file.path())?;
    let mut cursor = Cursor::new(&buf);
    let mut fgb = FgbReader::open(&mut cursor)?.select_bbox(bbox.0, bbox.1, bbox.2, bbox.3)?;
    let mut file_names = Vec::new();
    while let Some(feature) = fgb.next()? {
        file_names.push(feature.properties()?["name"].clone());
    }
    file_names.sort();

    assert_eq!(http_names, vec!["b".to_string(), "c".to_string()]);
    assert_eq!(http_names, file_names);
    Ok(())
}

#[tokio::test]
async fn http_to_geojson() -> Result<()> {
    let file = write_test_fgb()?;
    let (fgb, _stats) =
        HttpFgbReader::mock_from_file(file.path().to_str().unwrap()).await?;
    let mut fgb = fgb.select_bbox(0.0, 0.0, 1.0, 1.0).await?;

    let mut json_data: Vec<u8> = Vec::new();
    let mut json = GeoJsonWriter::new(&mut json_data);
    fgb.process_features(&mut json).await?;
    let json_out = std::str::from_utf8(&json_data)?.to_string();
    assert!(json_out.contains(r#""name": "a""#));
    assert!(json_out.contains("[0.5,0.5]"));
    assert!(!json_out.contains(r#""name": "d""#));
    Ok(())
}

#[tokio::test]
async fn http_reject_bad_magic() -> Result<()> {
    let file = write_test_fgb()?;
    let mut buf = std::fs::read(file.path())?;
    buf[3] ^= 0xFF;
    let mut mutated = tempfile::NamedTempFile::new()?;
    mutated.write_all(&buf)?;
    mutated.flush()?;

    let result = HttpFgbReader::mock_from_file(mutated.path().to_str().unwrap()).await;
    assert!(matches!(result, Err(Error::MissingMagicBytes)));
    Ok(())
}
