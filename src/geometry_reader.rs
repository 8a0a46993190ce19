use crate::feature_generated::*;
use crate::header_generated::*;
use geozero::error::{GeozeroError, Result};
use geozero::{GeomProcessor, GeozeroGeometry};

fn is_collection(geometry_type: GeometryType) -> Result<bool> {
    let coll = match geometry_type {
        GeometryType::Point
        | GeometryType::MultiPoint
        | GeometryType::LineString
        | GeometryType::MultiLineString
        | GeometryType::Polygon => false,
        GeometryType::MultiPolygon | GeometryType::GeometryCollection => true,
        _ => {
            return Err(GeozeroError::Geometry(format!(
                "Unsupported geometry type {geometry_type:?}"
            )))
        }
    };
    Ok(coll)
}

fn read_points<P: GeomProcessor>(
    processor: &mut P,
    geometry: &Geometry,
    offset: usize,
    length: usize,
) -> Result<()> {
    let xy = geometry.xy().ok_or(GeozeroError::GeometryFormat)?;
    let multi = processor.multi_dim();
    for i in (offset..offset + length).step_by(2) {
        if multi {
            // z/m/t/tm dimensions are reserved and decode as absent
            processor.coordinate(xy.get(i), xy.get(i + 1), None, None, None, None, (i - offset) / 2)?;
        } else {
            processor.xy(xy.get(i), xy.get(i + 1), (i - offset) / 2)?;
        }
    }
    Ok(())
}

fn read_multi_line<P: GeomProcessor>(processor: &mut P, geometry: &Geometry, idx: usize) -> Result<()> {
    let xy = geometry.xy().ok_or(GeozeroError::GeometryFormat)?;
    match geometry.ends() {
        // a missing or single-entry ends vector means a single line
        None => read_multi_line_part(processor, geometry, 1, 0, xy.len(), idx),
        Some(ends) if ends.len() < 2 => {
            read_multi_line_part(processor, geometry, 1, 0, xy.len(), idx)
        }
        Some(ends) => {
            processor.multilinestring_begin(ends.len(), idx)?;
            let mut offset = 0;
            for i in 0..ends.len() {
                let end = (ends.get(i) << 1) as usize;
                if end < offset || end > xy.len() {
                    return Err(GeozeroError::GeometryFormat);
                }
                processor.linestring_begin(false, (end - offset) / 2, i)?;
                read_points(processor, geometry, offset, end - offset)?;
                processor.linestring_end(false, i)?;
                offset = end;
            }
            processor.multilinestring_end(idx)
        }
    }
}

fn read_multi_line_part<P: GeomProcessor>(
    processor: &mut P,
    geometry: &Geometry,
    size: usize,
    offset: usize,
    length: usize,
    idx: usize,
) -> Result<()> {
    processor.multilinestring_begin(size, idx)?;
    processor.linestring_begin(false, length / 2, 0)?;
    read_points(processor, geometry, offset, length)?;
    processor.linestring_end(false, 0)?;
    processor.multilinestring_end(idx)
}

fn read_polygon<P: GeomProcessor>(
    processor: &mut P,
    geometry: &Geometry,
    tagged: bool,
    idx: usize,
) -> Result<()> {
    let xy = geometry.xy().ok_or(GeozeroError::GeometryFormat)?;
    match geometry.ends() {
        // a missing or single-entry ends vector means a single ring
        None => read_polygon_ring(processor, geometry, tagged, xy.len(), idx),
        Some(ends) if ends.len() < 2 => {
            read_polygon_ring(processor, geometry, tagged, xy.len(), idx)
        }
        Some(ends) => {
            processor.polygon_begin(tagged, ends.len(), idx)?;
            let mut offset = 0;
            for i in 0..ends.len() {
                let end = (ends.get(i) << 1) as usize;
                if end < offset || end > xy.len() {
                    return Err(GeozeroError::GeometryFormat);
                }
                processor.linestring_begin(false, (end - offset) / 2, i)?;
                read_points(processor, geometry, offset, end - offset)?;
                processor.linestring_end(false, i)?;
                offset = end;
            }
            processor.polygon_end(tagged, idx)
        }
    }
}

fn read_polygon_ring<P: GeomProcessor>(
    processor: &mut P,
    geometry: &Geometry,
    tagged: bool,
    length: usize,
    idx: usize,
) -> Result<()> {
    processor.polygon_begin(tagged, 1, idx)?;
    processor.linestring_begin(false, length / 2, 0)?;
    read_points(processor, geometry, 0, length)?;
    processor.linestring_end(false, 0)?;
    processor.polygon_end(tagged, idx)
}

fn read_multi_polygon<P: GeomProcessor>(processor: &mut P, geometry: &Geometry, idx: usize) -> Result<()> {
    let parts = geometry.parts().ok_or(GeozeroError::GeometryFormat)?;
    processor.multipolygon_begin(parts.len(), idx)?;
    for i in 0..parts.len() {
        read_polygon(processor, &parts.get(i), false, i)?;
    }
    processor.multipolygon_end(idx)
}

fn read_geometry_collection<P: GeomProcessor>(
    processor: &mut P,
    geometry: &Geometry,
    idx: usize,
) -> Result<()> {
    let parts = geometry.parts().ok_or(GeozeroError::GeometryFormat)?;
    processor.geometrycollection_begin(parts.len(), idx)?;
    for i in 0..parts.len() {
        let part = parts.get(i);
        // collection members carry their own type tag
        read_geometry(processor, &part, part.type_(), i)?;
    }
    processor.geometrycollection_end(idx)
}

pub(crate) fn read_geometry<P: GeomProcessor>(
    processor: &mut P,
    geometry: &Geometry,
    geometry_type: GeometryType,
    idx: usize,
) -> Result<()> {
    let geometry_type = if geometry_type == GeometryType::Unknown {
        geometry.type_()
    } else {
        geometry_type
    };
    if !is_collection(geometry_type)? {
        let xy = geometry.xy().ok_or(GeozeroError::GeometryFormat)?;
        match geometry_type {
            GeometryType::Point => {
                if xy.len() < 2 {
                    return Err(GeozeroError::GeometryFormat);
                }
                processor.point_begin(idx)?;
                read_points(processor, geometry, 0, 2)?;
                processor.point_end(idx)?;
            }
            GeometryType::MultiPoint => {
                processor.multipoint_begin(xy.len() / 2, idx)?;
                read_points(processor, geometry, 0, xy.len())?;
                processor.multipoint_end(idx)?;
            }
            GeometryType::LineString => {
                processor.linestring_begin(true, xy.len() / 2, idx)?;
                read_points(processor, geometry, 0, xy.len())?;
                processor.linestring_end(true, idx)?;
            }
            GeometryType::MultiLineString => {
                read_multi_line(processor, geometry, idx)?;
            }
            GeometryType::Polygon => {
                read_polygon(processor, geometry, true, idx)?;
            }
            _ => unreachable!(),
        }
    } else {
        match geometry_type {
            GeometryType::MultiPolygon => {
                read_multi_polygon(processor, geometry, idx)?;
            }
            GeometryType::GeometryCollection => {
                read_geometry_collection(processor, geometry, idx)?;
            }
            _ => unreachable!(),
        }
    }
    Ok(())
}

impl<'a> Geometry<'a> {
    /// Process geometry through a geozero [`GeomProcessor`].
    /// `geometry_type` is the dataset geometry type from the header;
    /// pass [`GeometryType::Unknown`] to use the geometry's own type tag.
    pub fn process<P: GeomProcessor>(
        &self,
        processor: &mut P,
        geometry_type: GeometryType,
    ) -> Result<()> {
        read_geometry(processor, self, geometry_type, 0)
    }
}

impl GeozeroGeometry for Geometry<'_> {
    fn process_geom<P: GeomProcessor>(&self, processor: &mut P) -> Result<()> {
        read_geometry(processor, self, self.type_(), 0)
    }
}
