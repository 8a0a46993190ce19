use crate::feature_generated::*;
use crate::header_generated::*;
use crate::packed_r_tree::NodeItem;
use byteorder::{LittleEndian, WriteBytesExt};
use geozero::error::{GeozeroError, Result};
use geozero::{ColumnValue, CoordDimensions, FeatureProcessor, GeomProcessor, PropertyProcessor};

/// Encoding buffer for one geometry, nested for collection types
struct GeomBuf {
    type_: GeometryType,
    xy: Vec<f64>,
    ends: Vec<u32>,
    parts: Vec<GeomBuf>,
}

impl GeomBuf {
    fn new(type_: GeometryType) -> Self {
        GeomBuf {
            type_,
            xy: Vec::new(),
            ends: Vec::new(),
            parts: Vec::new(),
        }
    }
}

/// Feature sink: collects geozero geometry and property events and encodes
/// them into one size-prefixed feature flatbuffer.
pub struct FeatureWriter<'a> {
    /// Bounding box of the current feature
    pub(crate) bbox: NodeItem,
    /// Dataset geometry type, detected from the first geometry when `Unknown`
    pub(crate) geometry_type: GeometryType,
    detect_type: bool,
    dims: CoordDimensions,
    fbb: flatbuffers::FlatBufferBuilder<'a>,
    /// Stack of open geometries; nested entries are collection members
    geom_stack: Vec<GeomBuf>,
    properties: Vec<u8>,
}

impl<'a> FeatureWriter<'a> {
    pub(crate) fn new(
        geometry_type: GeometryType,
        detect_type: bool,
        dims: CoordDimensions,
    ) -> Self {
        FeatureWriter {
            bbox: NodeItem::create(0),
            geometry_type,
            detect_type,
            dims,
            fbb: flatbuffers::FlatBufferBuilder::new(),
            geom_stack: Vec::new(),
            properties: Vec::new(),
        }
    }

    fn begin_geometry(&mut self, type_: GeometryType) {
        if self.detect_type
            && self.geometry_type == GeometryType::Unknown
            && self.geom_stack.is_empty()
        {
            self.geometry_type = type_;
        }
        self.geom_stack.push(GeomBuf::new(type_));
    }

    fn end_geometry(&mut self) -> Result<()> {
        if self.geom_stack.len() > 1 {
            // finished collection member
            let part = self
                .geom_stack
                .pop()
                .ok_or_else(|| GeozeroError::Geometry("Geometry stack underflow".to_string()))?;
            self.geom_stack
                .last_mut()
                .ok_or_else(|| GeozeroError::Geometry("Geometry stack underflow".to_string()))?
                .parts
                .push(part);
        }
        // the root geometry stays on the stack until finish_to_feature
        Ok(())
    }

    fn cur_geom(&mut self) -> Result<&mut GeomBuf> {
        self.geom_stack
            .last_mut()
            .ok_or_else(|| GeozeroError::Geometry("Coordinate without geometry".to_string()))
    }

    fn push_xy(&mut self, x: f64, y: f64) -> Result<()> {
        self.bbox.expand_xy(x, y);
        let geom = self.cur_geom()?;
        geom.xy.push(x);
        geom.xy.push(y);
        Ok(())
    }

    /// Encode the collected feature and reset for the next one
    pub(crate) fn finish_to_feature(&mut self) -> Vec<u8> {
        let geometry = self
            .geom_stack
            .pop()
            .map(|geom| build_geometry(&mut self.fbb, &geom));
        let properties = if self.properties.is_empty() {
            None
        } else {
            Some(self.fbb.create_vector(&self.properties))
        };
        let feature = Feature::create(
            &mut self.fbb,
            &FeatureArgs {
                geometry,
                properties,
            },
        );
        self.fbb.finish_size_prefixed(feature, None);
        let buf = self.fbb.finished_data().to_vec();
        self.fbb.reset();
        self.geom_stack.clear();
        self.properties.clear();
        self.bbox = NodeItem::create(0);
        buf
    }
}

fn build_geometry<'a>(
    fbb: &mut flatbuffers::FlatBufferBuilder<'a>,
    geom: &GeomBuf,
) -> flatbuffers::WIPOffset<Geometry<'a>> {
    if !geom.parts.is_empty() {
        let parts: Vec<_> = geom
            .parts
            .iter()
            .map(|part| build_geometry(fbb, part))
            .collect();
        let parts = fbb.create_vector(&parts);
        Geometry::create(
            fbb,
            &GeometryArgs {
                parts: Some(parts),
                type_: geom.type_,
                ..Default::default()
            },
        )
    } else {
        let xy = fbb.create_vector(&geom.xy);
        // fewer than two rings/lines are encoded without ends
        let ends = if geom.ends.len() > 1 {
            Some(fbb.create_vector(&geom.ends))
        } else {
            None
        };
        Geometry::create(
            fbb,
            &GeometryArgs {
                ends,
                xy: Some(xy),
                type_: geom.type_,
                ..Default::default()
            },
        )
    }
}

// Feature events are driven by the dataset writer; the buffer is finished
// explicitly with `finish_to_feature`.
impl FeatureProcessor for FeatureWriter<'_> {}

impl GeomProcessor for FeatureWriter<'_> {
    fn dimensions(&self) -> CoordDimensions {
        self.dims
    }
    fn xy(&mut self, x: f64, y: f64, _idx: usize) -> Result<()> {
        self.push_xy(x, y)
    }
    fn coordinate(
        &mut self,
        x: f64,
        y: f64,
        _z: Option<f64>,
        _m: Option<f64>,
        _t: Option<f64>,
        _tm: Option<u64>,
        _idx: usize,
    ) -> Result<()> {
        // z/m/t/tm dimensions are reserved and not encoded
        self.push_xy(x, y)
    }
    fn point_begin(&mut self, _idx: usize) -> Result<()> {
        self.begin_geometry(GeometryType::Point);
        Ok(())
    }
    fn point_end(&mut self, _idx: usize) -> Result<()> {
        self.end_geometry()
    }
    fn multipoint_begin(&mut self, _size: usize, _idx: usize) -> Result<()> {
        self.begin_geometry(GeometryType::MultiPoint);
        Ok(())
    }
    fn multipoint_end(&mut self, _idx: usize) -> Result<()> {
        self.end_geometry()
    }
    fn linestring_begin(&mut self, tagged: bool, _size: usize, _idx: usize) -> Result<()> {
        if tagged {
            self.begin_geometry(GeometryType::LineString);
        }
        // untagged: ring of a polygon or line of a multi-linestring
        Ok(())
    }
    fn linestring_end(&mut self, tagged: bool, _idx: usize) -> Result<()> {
        if tagged {
            self.end_geometry()?;
        } else {
            let geom = self.cur_geom()?;
            geom.ends.push((geom.xy.len() / 2) as u32);
        }
        Ok(())
    }
    fn multilinestring_begin(&mut self, _size: usize, _idx: usize) -> Result<()> {
        self.begin_geometry(GeometryType::MultiLineString);
        Ok(())
    }
    fn multilinestring_end(&mut self, _idx: usize) -> Result<()> {
        self.end_geometry()
    }
    fn polygon_begin(&mut self, _tagged: bool, _size: usize, _idx: usize) -> Result<()> {
        // untagged polygons are MultiPolygon parts and become sub-geometries
        self.begin_geometry(GeometryType::Polygon);
        Ok(())
    }
    fn polygon_end(&mut self, _tagged: bool, _idx: usize) -> Result<()> {
        self.end_geometry()
    }
    fn multipolygon_begin(&mut self, _size: usize, _idx: usize) -> Result<()> {
        self.begin_geometry(GeometryType::MultiPolygon);
        Ok(())
    }
    fn multipolygon_end(&mut self, _idx: usize) -> Result<()> {
        self.end_geometry()
    }
    fn geometrycollection_begin(&mut self, _size: usize, _idx: usize) -> Result<()> {
        self.begin_geometry(GeometryType::GeometryCollection);
        Ok(())
    }
    fn geometrycollection_end(&mut self, _idx: usize) -> Result<()> {
        self.end_geometry()
    }
    fn circularstring_begin(&mut self, _size: usize, _idx: usize) -> Result<()> {
        Err(GeozeroError::Geometry(
            "Unsupported geometry type CircularString".to_string(),
        ))
    }
    fn compoundcurve_begin(&mut self, _size: usize, _idx: usize) -> Result<()> {
        Err(GeozeroError::Geometry(
            "Unsupported geometry type CompoundCurve".to_string(),
        ))
    }
    fn curvepolygon_begin(&mut self, _size: usize, _idx: usize) -> Result<()> {
        Err(GeozeroError::Geometry(
            "Unsupported geometry type CurvePolygon".to_string(),
        ))
    }
    fn multicurve_begin(&mut self, _size: usize, _idx: usize) -> Result<()> {
        Err(GeozeroError::Geometry(
            "Unsupported geometry type MultiCurve".to_string(),
        ))
    }
    fn multisurface_begin(&mut self, _size: usize, _idx: usize) -> Result<()> {
        Err(GeozeroError::Geometry(
            "Unsupported geometry type MultiSurface".to_string(),
        ))
    }
    fn triangle_begin(&mut self, _tagged: bool, _size: usize, _idx: usize) -> Result<()> {
        Err(GeozeroError::Geometry(
            "Unsupported geometry type Triangle".to_string(),
        ))
    }
    fn polyhedralsurface_begin(&mut self, _size: usize, _idx: usize) -> Result<()> {
        Err(GeozeroError::Geometry(
            "Unsupported geometry type PolyhedralSurface".to_string(),
        ))
    }
    fn tin_begin(&mut self, _size: usize, _idx: usize) -> Result<()> {
        Err(GeozeroError::Geometry(
            "Unsupported geometry type TIN".to_string(),
        ))
    }
}

fn write_string_value(properties: &mut Vec<u8>, value: &str) -> Result<()> {
    if value.len() > u32::MAX as usize {
        return Err(GeozeroError::Property(format!(
            "String length {} exceeds u32 range",
            value.len()
        )));
    }
    properties.write_u32::<LittleEndian>(value.len() as u32)?;
    properties.extend_from_slice(value.as_bytes());
    Ok(())
}

impl PropertyProcessor for FeatureWriter<'_> {
    fn property(&mut self, i: usize, _name: &str, colval: &ColumnValue) -> Result<bool> {
        self.properties.write_u16::<LittleEndian>(i as u16)?;
        match colval {
            ColumnValue::Byte(v) => self.properties.write_i8(*v)?,
            ColumnValue::UByte(v) => self.properties.write_u8(*v)?,
            ColumnValue::Bool(v) => self.properties.write_u8(*v as u8)?,
            ColumnValue::Short(v) => self.properties.write_i16::<LittleEndian>(*v)?,
            ColumnValue::UShort(v) => self.properties.write_u16::<LittleEndian>(*v)?,
            ColumnValue::Int(v) => self.properties.write_i32::<LittleEndian>(*v)?,
            ColumnValue::UInt(v) => self.properties.write_u32::<LittleEndian>(*v)?,
            ColumnValue::Long(v) => self.properties.write_i64::<LittleEndian>(*v)?,
            ColumnValue::ULong(v) => self.properties.write_u64::<LittleEndian>(*v)?,
            ColumnValue::Float(v) => self.properties.write_f32::<LittleEndian>(*v)?,
            ColumnValue::Double(v) => self.properties.write_f64::<LittleEndian>(*v)?,
            ColumnValue::String(v) => write_string_value(&mut self.properties, v)?,
            ColumnValue::Json(v) => write_string_value(&mut self.properties, v)?,
            ColumnValue::DateTime(v) => write_string_value(&mut self.properties, v)?,
            ColumnValue::Binary(v) => {
                if v.len() > u32::MAX as usize {
                    return Err(GeozeroError::Property(format!(
                        "Binary length {} exceeds u32 range",
                        v.len()
                    )));
                }
                self.properties.write_u32::<LittleEndian>(v.len() as u32)?;
                self.properties.extend_from_slice(v);
            }
        }
        Ok(false)
    }
}

/// Column type for a property value
pub(crate) fn prop_type(colval: &ColumnValue) -> ColumnType {
    match colval {
        ColumnValue::Byte(_) => ColumnType::Byte,
        ColumnValue::UByte(_) => ColumnType::UByte,
        ColumnValue::Bool(_) => ColumnType::Bool,
        ColumnValue::Short(_) => ColumnType::Short,
        ColumnValue::UShort(_) => ColumnType::UShort,
        ColumnValue::Int(_) => ColumnType::Int,
        ColumnValue::UInt(_) => ColumnType::UInt,
        ColumnValue::Long(_) => ColumnType::Long,
        ColumnValue::ULong(_) => ColumnType::ULong,
        ColumnValue::Float(_) => ColumnType::Float,
        ColumnValue::Double(_) => ColumnType::Double,
        ColumnValue::String(_) => ColumnType::String,
        ColumnValue::Json(_) => ColumnType::Json,
        ColumnValue::DateTime(_) => ColumnType::DateTime,
        ColumnValue::Binary(_) => ColumnType::Binary,
    }
}
