use crate::feature_generated::*;
use crate::geometry_reader::read_geometry;
use crate::header_generated::*;
use byteorder::{ByteOrder, LittleEndian};
use geozero::error::{GeozeroError, Result};
use geozero::GeozeroGeometry;
use geozero::{ColumnValue, GeomProcessor, PropertyProcessor};
use std::mem::size_of;
use std::str;

/// Access to current feature
pub struct FgbFeature {
    // Using type Header<'a> instead of Vec would require adding a lifetime to FgbFeature
    pub(crate) header_buf: Vec<u8>,
    pub(crate) feature_buf: Vec<u8>,
}

impl FgbFeature {
    pub(crate) fn header(&self) -> Header {
        // SAFETY: verification is done before creating instance
        unsafe { size_prefixed_root_as_header_unchecked(&self.header_buf) }
    }
    /// Flatbuffers feature access
    pub fn fbs_feature(&self) -> Feature {
        // SAFETY: verification is done before creating instance
        unsafe { size_prefixed_root_as_feature_unchecked(&self.feature_buf) }
    }
    /// Flatbuffers geometry access
    pub fn geometry(&self) -> Option<Geometry> {
        self.fbs_feature().geometry()
    }
}

impl geozero::FeatureAccess for FgbFeature {}

impl GeozeroGeometry for FgbFeature {
    fn process_geom<P: GeomProcessor>(&self, processor: &mut P) -> Result<()> {
        let geometry = self
            .fbs_feature()
            .geometry()
            .ok_or(GeozeroError::GeometryFormat)?;
        read_geometry(processor, &geometry, self.header().geometry_type(), 0)
    }
}

impl geozero::FeatureProperties for FgbFeature {
    /// Process feature properties.
    fn process_properties<P: PropertyProcessor>(&self, reader: &mut P) -> Result<bool> {
        let Some(columns_meta) = self.header().columns() else {
            return Ok(false);
        };

        let mut finish = false;
        if let Some(properties) = self.fbs_feature().properties() {
            let mut offset = 0;
            let bytes = properties.bytes();
            while offset + 1 < properties.len() && !finish {
                // NOTE: it should be offset < properties.len(), but there is data with a
                // trailing byte in the last column of type Binary
                let column_idx = LittleEndian::read_u16(&bytes[offset..offset + 2]) as usize;
                offset += size_of::<u16>();
                if column_idx >= columns_meta.len() {
                    return Err(GeozeroError::Property(format!(
                        "Undeclared column index {column_idx}"
                    )));
                }
                let column = &columns_meta.get(column_idx);
                match column.type_() {
                    ColumnType::Bool => {
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::Bool(bytes[offset] != 0),
                        )?;
                        offset += size_of::<u8>();
                    }
                    ColumnType::Byte => {
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::Byte(bytes[offset] as i8),
                        )?;
                        offset += size_of::<i8>();
                    }
                    ColumnType::UByte => {
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::UByte(bytes[offset]),
                        )?;
                        offset += size_of::<u8>();
                    }
                    ColumnType::Short => {
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::Short(LittleEndian::read_i16(&bytes[offset..offset + 2])),
                        )?;
                        offset += size_of::<i16>();
                    }
                    ColumnType::UShort => {
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::UShort(LittleEndian::read_u16(
                                &bytes[offset..offset + 2],
                            )),
                        )?;
                        offset += size_of::<u16>();
                    }
                    ColumnType::Int => {
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::Int(LittleEndian::read_i32(&bytes[offset..offset + 4])),
                        )?;
                        offset += size_of::<i32>();
                    }
                    ColumnType::UInt => {
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::UInt(LittleEndian::read_u32(&bytes[offset..offset + 4])),
                        )?;
                        offset += size_of::<u32>();
                    }
                    ColumnType::Long => {
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::Long(LittleEndian::read_i64(&bytes[offset..offset + 8])),
                        )?;
                        offset += size_of::<i64>();
                    }
                    ColumnType::ULong => {
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::ULong(LittleEndian::read_u64(&bytes[offset..offset + 8])),
                        )?;
                        offset += size_of::<u64>();
                    }
                    ColumnType::Float => {
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::Float(LittleEndian::read_f32(&bytes[offset..offset + 4])),
                        )?;
                        offset += size_of::<f32>();
                    }
                    ColumnType::Double => {
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::Double(LittleEndian::read_f64(
                                &bytes[offset..offset + 8],
                            )),
                        )?;
                        offset += size_of::<f64>();
                    }
                    ColumnType::String => {
                        let len = LittleEndian::read_u32(&bytes[offset..offset + 4]) as usize;
                        offset += size_of::<u32>();
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::String(
                                str::from_utf8(&bytes[offset..offset + len]).map_err(|_| {
                                    GeozeroError::Property("Invalid UTF-8 encoding".to_string())
                                })?,
                            ),
                        )?;
                        offset += len;
                    }
                    ColumnType::Json => {
                        let len = LittleEndian::read_u32(&bytes[offset..offset + 4]) as usize;
                        offset += size_of::<u32>();
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::Json(
                                str::from_utf8(&bytes[offset..offset + len]).map_err(|_| {
                                    GeozeroError::Property("Invalid UTF-8 encoding".to_string())
                                })?,
                            ),
                        )?;
                        offset += len;
                    }
                    ColumnType::DateTime => {
                        let len = LittleEndian::read_u32(&bytes[offset..offset + 4]) as usize;
                        offset += size_of::<u32>();
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::DateTime(
                                str::from_utf8(&bytes[offset..offset + len]).map_err(|_| {
                                    GeozeroError::Property("Invalid UTF-8 encoding".to_string())
                                })?,
                            ),
                        )?;
                        offset += len;
                    }
                    ColumnType::Binary => {
                        let len = LittleEndian::read_u32(&bytes[offset..offset + 4]) as usize;
                        offset += size_of::<u32>();
                        finish = reader.property(
                            column_idx,
                            column.name(),
                            &ColumnValue::Binary(&bytes[offset..offset + len]),
                        )?;
                        offset += len;
                    }
                    ColumnType(unknown) => {
                        return Err(GeozeroError::Property(format!(
                            "Unknown column type {unknown}"
                        )));
                    }
                }
            }
        }
        Ok(finish)
    }
}
