use crate::error::{Error, Result};
use crate::feature_writer::{prop_type, FeatureWriter};
use crate::header_generated::*;
use crate::packed_r_tree::{calc_extent, hilbert_sort, NodeItem, PackedRTree};
use crate::MAGIC_BYTES;
use flatbuffers::FlatBufferBuilder;
use geozero::error::GeozeroError;
use geozero::{ColumnValue, CoordDimensions, GeozeroDatasource, GeozeroGeometry};
use log::debug;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};

/// FGB dataset writer
///
/// Features are encoded into a temporary scratch file while they are added.
/// [`FgbWriter::write`] assembles magic bytes, header, the optional packed
/// R-Tree index and the feature payload into the output sink. With an index,
/// features are written in Hilbert sort order.
///
/// ```rust
/// use fgb::*;
/// use geozero::geojson::GeoJsonReader;
/// use geozero::GeozeroDatasource;
/// # use std::fs::File;
/// # use std::io::{BufReader, BufWriter};
///
/// # fn json_to_fgb() -> geozero::error::Result<()> {
/// let mut fgb = FgbWriter::create("countries", GeometryType::MultiPolygon)?;
/// let mut fin = BufReader::new(File::open("countries.geojson")?);
/// let mut reader = GeoJsonReader(&mut fin);
/// reader.process(&mut fgb)?;
/// let mut fout = BufWriter::new(File::create("countries.fgb")?);
/// fgb.write(&mut fout)?;
/// # Ok(())
/// # }
/// ```
pub struct FgbWriter<'a> {
    tmpout: BufWriter<File>,
    fbb: FlatBufferBuilder<'a>,
    header_args: HeaderArgs<'a>,
    columns: Vec<flatbuffers::WIPOffset<Column<'a>>>,
    write_index: bool,
    feat_writer: FeatureWriter<'a>,
    feat_offsets: Vec<FeatureOffset>,
    feat_nodes: Vec<NodeItem>,
}

// Offsets in temporary file
struct FeatureOffset {
    offset: usize,
    size: usize,
}

/// Coordinate reference system definition
#[derive(Default)]
pub struct FgbCrs<'a> {
    pub org: Option<&'a str>,
    pub code: i32,
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub wkt: Option<&'a str>,
    pub code_string: Option<&'a str>,
}

/// Dataset writer options
pub struct FgbWriterOptions<'a> {
    /// Write a spatial index
    pub write_index: bool,
    /// Detect geometry type when `geometry_type` is Unknown
    pub detect_type: bool,
    pub crs: FgbCrs<'a>,
    /// Dimensions besides x/y are declared in the header but reserved
    pub has_z: bool,
    pub has_m: bool,
    pub has_t: bool,
    pub has_tm: bool,
}

impl Default for FgbWriterOptions<'_> {
    fn default() -> Self {
        FgbWriterOptions {
            write_index: true,
            detect_type: true,
            crs: FgbCrs::default(),
            has_z: false,
            has_m: false,
            has_t: false,
            has_tm: false,
        }
    }
}

impl<'a> FgbWriter<'a> {
    /// Create a dataset writer with default options (spatial index enabled).
    pub fn create(name: &str, geometry_type: GeometryType) -> Result<Self> {
        Self::create_with_options(name, geometry_type, FgbWriterOptions::default())
    }

    /// Create a dataset writer with custom options.
    pub fn create_with_options(
        name: &str,
        geometry_type: GeometryType,
        options: FgbWriterOptions,
    ) -> Result<Self> {
        let mut fbb = FlatBufferBuilder::new();
        let crs = {
            let empty = options.crs.org.is_none()
                && options.crs.code == 0
                && options.crs.name.is_none()
                && options.crs.description.is_none()
                && options.crs.wkt.is_none()
                && options.crs.code_string.is_none();
            if empty {
                None
            } else {
                let crs_args = CrsArgs {
                    org: options.crs.org.map(|v| fbb.create_string(v)),
                    code: options.crs.code,
                    name: options.crs.name.map(|v| fbb.create_string(v)),
                    description: options.crs.description.map(|v| fbb.create_string(v)),
                    wkt: options.crs.wkt.map(|v| fbb.create_string(v)),
                    code_string: options.crs.code_string.map(|v| fbb.create_string(v)),
                };
                Some(Crs::create(&mut fbb, &crs_args))
            }
        };
        let index_node_size = if options.write_index {
            PackedRTree::DEFAULT_NODE_SIZE
        } else {
            0
        };
        let header_args = HeaderArgs {
            name: Some(fbb.create_string(name)),
            geometry_type,
            index_node_size,
            crs,
            has_z: options.has_z,
            has_m: options.has_m,
            has_t: options.has_t,
            has_tm: options.has_tm,
            ..Default::default()
        };
        let dims = CoordDimensions {
            z: options.has_z,
            m: options.has_m,
            t: options.has_t,
            tm: options.has_tm,
        };
        let feat_writer = FeatureWriter::new(geometry_type, options.detect_type, dims);
        let tmpout = BufWriter::new(tempfile::tempfile()?);
        Ok(FgbWriter {
            tmpout,
            fbb,
            header_args,
            columns: Vec::new(),
            write_index: options.write_index,
            feat_writer,
            feat_offsets: Vec::new(),
            feat_nodes: Vec::new(),
        })
    }

    /// Declare a column. Declaration order defines the column index
    /// used in the property records.
    pub fn add_column(&mut self, name: &str, col_type: ColumnType) {
        let col = ColumnArgs {
            name: Some(self.fbb.create_string(name)),
            type_: col_type,
        };
        self.columns.push(Column::create(&mut self.fbb, &col));
    }

    /// Add a feature from a geozero datasource (geometry and properties).
    pub fn add_feature(&mut self, mut feature: impl GeozeroDatasource) -> geozero::error::Result<()> {
        feature.process(&mut self.feat_writer)?;
        self.write_feature()
            .map_err(|e| GeozeroError::Feature(e.to_string()))
    }

    /// Add a feature from a geometry, with properties set via the
    /// configuration callback.
    pub fn add_feature_geom<F>(
        &mut self,
        geom: impl GeozeroGeometry,
        cfgfn: F,
    ) -> geozero::error::Result<()>
    where
        F: FnOnce(&mut FeatureWriter),
    {
        geom.process_geom(&mut self.feat_writer)?;
        cfgfn(&mut self.feat_writer);
        self.write_feature()
            .map_err(|e| GeozeroError::Feature(e.to_string()))
    }

    fn write_feature(&mut self) -> Result<()> {
        let mut node = self.feat_writer.bbox.clone();
        // offset stores the feature number until the nodes are sorted
        node.offset = self.feat_offsets.len() as u64;
        self.feat_nodes.push(node);
        let feat_buf = self.feat_writer.finish_to_feature();
        let tmpoffset = self
            .feat_offsets
            .last()
            .map(|it| it.offset + it.size)
            .unwrap_or(0);
        self.feat_offsets.push(FeatureOffset {
            offset: tmpoffset,
            size: feat_buf.len(),
        });
        self.tmpout.write_all(&feat_buf)?;
        self.header_args.features_count += 1;
        Ok(())
    }

    /// Write the dataset: magic bytes, header, optional index and all
    /// features. The scratch file is released afterwards.
    pub fn write(mut self, out: &mut impl Write) -> Result<()> {
        if self.feat_offsets.is_empty() {
            return Err(Error::NoFeaturesWritten);
        }
        out.write_all(&MAGIC_BYTES)?;

        // The detected geometry type is only known after the first feature
        self.header_args.geometry_type = self.feat_writer.geometry_type;

        let index = if self.write_index {
            let extent = calc_extent(&self.feat_nodes);
            debug!("Sorting {} features by Hilbert value", self.feat_nodes.len());
            hilbert_sort(&mut self.feat_nodes);
            // assign final offsets within the feature section in sorted order
            let mut offset = 0u64;
            let index_nodes: Vec<NodeItem> = self
                .feat_nodes
                .iter()
                .map(|tmpnode| {
                    let feat = &self.feat_offsets[tmpnode.offset as usize];
                    let mut node = tmpnode.clone();
                    node.offset = offset;
                    offset += feat.size as u64;
                    node
                })
                .collect();
            self.header_args.envelope = Some(self.fbb.create_vector(&[
                extent.min_x,
                extent.min_y,
                extent.max_x,
                extent.max_y,
            ]));
            Some(PackedRTree::build(
                &index_nodes,
                &extent,
                self.header_args.index_node_size,
            )?)
        } else {
            None
        };

        self.header_args.columns = Some(self.fbb.create_vector(&self.columns));
        let header = Header::create(&mut self.fbb, &self.header_args);
        self.fbb.finish_size_prefixed(header, None);
        out.write_all(self.fbb.finished_data())?;

        if let Some(index) = index {
            index.stream_write(out)?;
        }

        // copy features from the scratch file
        let mut tmpin = BufReader::new(self.tmpout.into_inner().map_err(|e| e.into_error())?);
        if self.write_index {
            // in Hilbert sort order
            for node in &self.feat_nodes {
                let feat = &self.feat_offsets[node.offset as usize];
                tmpin.seek(SeekFrom::Start(feat.offset as u64))?;
                let mut data = tmpin.by_ref().take(feat.size as u64);
                std::io::copy(&mut data, out)?;
            }
        } else {
            // in insertion order
            tmpin.rewind()?;
            std::io::copy(&mut tmpin, out)?;
        }
        Ok(())
    }
}

mod geozero_api {
    use super::*;
    use geozero::error::Result;
    use geozero::{FeatureProcessor, GeomProcessor, PropertyProcessor};

    impl FeatureProcessor for FgbWriter<'_> {
        fn feature_end(&mut self, _idx: u64) -> Result<()> {
            self.write_feature()
                .map_err(|e| GeozeroError::Feature(e.to_string()))
        }
    }

    impl PropertyProcessor for FgbWriter<'_> {
        fn property(&mut self, i: usize, colname: &str, colval: &ColumnValue) -> Result<bool> {
            if i >= self.columns.len() {
                if i == self.columns.len() {
                    debug!("Undeclared property index {i}, column: `{colname}` - adding column declaration");
                    self.add_column(colname, prop_type(colval));
                } else {
                    debug!("Undeclared property index {i}, column: `{colname}` - skipping");
                    return Ok(false);
                }
            }
            self.feat_writer.property(i, colname, colval)
        }
    }

    // Delegate geometry events to the feature writer
    impl GeomProcessor for FgbWriter<'_> {
        fn dimensions(&self) -> geozero::CoordDimensions {
            self.feat_writer.dimensions()
        }
        fn xy(&mut self, x: f64, y: f64, idx: usize) -> Result<()> {
            self.feat_writer.xy(x, y, idx)
        }
        fn coordinate(
            &mut self,
            x: f64,
            y: f64,
            z: Option<f64>,
            m: Option<f64>,
            t: Option<f64>,
            tm: Option<u64>,
            idx: usize,
        ) -> Result<()> {
            self.feat_writer.coordinate(x, y, z, m, t, tm, idx)
        }
        fn point_begin(&mut self, idx: usize) -> Result<()> {
            self.feat_writer.point_begin(idx)
        }
        fn point_end(&mut self, idx: usize) -> Result<()> {
            self.feat_writer.point_end(idx)
        }
        fn multipoint_begin(&mut self, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.multipoint_begin(size, idx)
        }
        fn multipoint_end(&mut self, idx: usize) -> Result<()> {
            self.feat_writer.multipoint_end(idx)
        }
        fn linestring_begin(&mut self, tagged: bool, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.linestring_begin(tagged, size, idx)
        }
        fn linestring_end(&mut self, tagged: bool, idx: usize) -> Result<()> {
            self.feat_writer.linestring_end(tagged, idx)
        }
        fn multilinestring_begin(&mut self, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.multilinestring_begin(size, idx)
        }
        fn multilinestring_end(&mut self, idx: usize) -> Result<()> {
            self.feat_writer.multilinestring_end(idx)
        }
        fn polygon_begin(&mut self, tagged: bool, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.polygon_begin(tagged, size, idx)
        }
        fn polygon_end(&mut self, tagged: bool, idx: usize) -> Result<()> {
            self.feat_writer.polygon_end(tagged, idx)
        }
        fn multipolygon_begin(&mut self, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.multipolygon_begin(size, idx)
        }
        fn multipolygon_end(&mut self, idx: usize) -> Result<()> {
            self.feat_writer.multipolygon_end(idx)
        }
        fn geometrycollection_begin(&mut self, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.geometrycollection_begin(size, idx)
        }
        fn geometrycollection_end(&mut self, idx: usize) -> Result<()> {
            self.feat_writer.geometrycollection_end(idx)
        }
        fn circularstring_begin(&mut self, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.circularstring_begin(size, idx)
        }
        fn compoundcurve_begin(&mut self, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.compoundcurve_begin(size, idx)
        }
        fn curvepolygon_begin(&mut self, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.curvepolygon_begin(size, idx)
        }
        fn multicurve_begin(&mut self, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.multicurve_begin(size, idx)
        }
        fn multisurface_begin(&mut self, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.multisurface_begin(size, idx)
        }
        fn triangle_begin(&mut self, tagged: bool, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.triangle_begin(tagged, size, idx)
        }
        fn polyhedralsurface_begin(&mut self, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.polyhedralsurface_begin(size, idx)
        }
        fn tin_begin(&mut self, size: usize, idx: usize) -> Result<()> {
            self.feat_writer.tin_begin(size, idx)
        }
    }
}
