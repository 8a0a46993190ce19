use crate::error::{Error, Result};
use crate::feature_generated::*;
use crate::header_generated::*;
use crate::packed_r_tree::{PackedRTree, SearchResultItem};
use crate::properties_reader::FgbFeature;
use crate::reader_state::*;
use crate::{check_magic_bytes, HEADER_MAX_BUFFER_SIZE, MAGIC_BYTES};
use fallible_streaming_iterator::FallibleStreamingIterator;
use geozero::error::GeozeroError;
use geozero::{FeatureAccess, FeatureProcessor, GeozeroDatasource};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::marker::PhantomData;

/// FGB dataset reader
///
/// ```rust
/// use fgb::*;
/// use geozero::ToJson;
/// # use std::fs::File;
/// # use std::io::BufReader;
///
/// # fn read_fgb() -> geozero::error::Result<()> {
/// let mut filein = BufReader::new(File::open("countries.fgb")?);
/// let mut fgb = FgbReader::open(&mut filein)?.select_all()?;
/// while let Some(feature) = fgb.next()? {
///     println!("{}", feature.property::<String>("name").unwrap());
///     println!("{}", feature.to_json()?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct FgbReader<'a, R, State = Initial> {
    reader: &'a mut R,
    /// FlatBuffers verification
    verify: bool,
    // feature reading requires header access, therefore
    // header_buf is included in the FgbFeature struct.
    fbs: FgbFeature,
    /// Index size in bytes
    index_size: u64,
    /// File offset of the feature section
    feature_base: u64,
    /// Selected features or None if all features are selected
    item_filter: Option<Vec<SearchResultItem>>,
    /// Number of selected features, None if unknown
    count: Option<usize>,
    /// Current feature number
    feat_no: usize,
    /// All selected features have been read
    finished: bool,
    /// Reader state
    state: PhantomData<State>,
}

impl<'a, R: Read> FgbReader<'a, R, Initial> {
    /// Open dataset by reading the header information
    pub fn open(reader: &'a mut R) -> Result<FgbReader<'a, R, Open>> {
        Self::read_header(reader, true)
    }

    /// Open dataset by reading the header information without FlatBuffers verification
    ///
    /// # Safety
    /// This is still safe from the Rust perspective, but reading malformed
    /// data may panic in FlatBuffers accessors.
    pub unsafe fn open_unchecked(reader: &'a mut R) -> Result<FgbReader<'a, R, Open>> {
        Self::read_header(reader, false)
    }

    fn read_header(reader: &'a mut R, verify: bool) -> Result<FgbReader<'a, R, Open>> {
        let mut magic_buf: [u8; 8] = [0; 8];
        reader.read_exact(&mut magic_buf)?;
        if !check_magic_bytes(&magic_buf) {
            return Err(Error::MissingMagicBytes);
        }

        let mut size_buf: [u8; 4] = [0; 4];
        reader.read_exact(&mut size_buf)?;
        let header_size = u32::from_le_bytes(size_buf) as usize;
        if header_size > HEADER_MAX_BUFFER_SIZE || header_size < 8 {
            // minimum size check avoids panic in FlatBuffers header decoding
            return Err(Error::IllegalHeaderSize(header_size));
        }
        let mut header_buf = Vec::with_capacity(header_size + 4);
        header_buf.extend_from_slice(&size_buf);
        header_buf.resize(header_size + 4, 0);
        reader.read_exact(&mut header_buf[4..])?;

        if verify {
            let _header = size_prefixed_root_as_header(&header_buf)?;
        }

        let fbs = FgbFeature {
            header_buf,
            feature_buf: Vec::new(),
        };
        let header = fbs.header();
        let count = header.features_count() as usize;
        let index_size = if header.index_node_size() > 0 && count > 0 {
            PackedRTree::index_size(count, header.index_node_size())? as u64
        } else {
            0
        };
        let feature_base = (MAGIC_BYTES.len() + 4 + header_size) as u64 + index_size;

        Ok(FgbReader {
            reader,
            verify,
            fbs,
            index_size,
            feature_base,
            item_filter: None,
            count: if count > 0 { Some(count) } else { None },
            feat_no: 0,
            finished: false,
            state: PhantomData::<Open>,
        })
    }
}

impl<'a, R, State> FgbReader<'a, R, State> {
    /// Header information
    pub fn header(&self) -> Header {
        self.fbs.header()
    }

    fn transition<To>(self) -> FgbReader<'a, R, To> {
        FgbReader {
            reader: self.reader,
            verify: self.verify,
            fbs: self.fbs,
            index_size: self.index_size,
            feature_base: self.feature_base,
            item_filter: self.item_filter,
            count: self.count,
            feat_no: 0,
            finished: false,
            state: PhantomData::<To>,
        }
    }
}

impl<'a, R: Read> FgbReader<'a, R, Open> {
    /// Select all features without using the spatial index.
    ///
    /// This skips the index by reading it, which also works on non-seekable
    /// inputs.
    pub fn select_all_seq(mut self) -> Result<FgbReader<'a, R, FeaturesSelected>> {
        let index_size = self.index_size;
        std::io::copy(
            &mut self.reader.by_ref().take(index_size),
            &mut std::io::sink(),
        )?;
        Ok(self.transition())
    }
}

impl<'a, R: Read + Seek> FgbReader<'a, R, Open> {
    /// Select all features.
    pub fn select_all(mut self) -> Result<FgbReader<'a, R, FeaturesSelectedSeek>> {
        self.reader.seek(SeekFrom::Current(self.index_size as i64))?;
        Ok(self.transition())
    }

    /// Select features within a bounding box, using the spatial index.
    ///
    /// The index is traversed with range reads; only nodes intersecting the
    /// bounding box are visited.
    pub fn select_bbox(
        mut self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> Result<FgbReader<'a, R, FeaturesSelectedSeek>> {
        let header = self.fbs.header();
        if header.index_node_size() == 0 {
            return Err(Error::NoIndex);
        }
        let count = header.features_count() as usize;
        let node_size = header.index_node_size();
        let mut list = if count > 0 {
            PackedRTree::stream_search(
                &mut self.reader,
                count,
                node_size,
                min_x,
                min_y,
                max_x,
                max_y,
            )?
        } else {
            Vec::new()
        };
        list.sort_unstable_by(|a, b| a.offset.cmp(&b.offset));
        self.count = Some(list.len());
        self.item_filter = Some(list);
        Ok(self.transition())
    }
}

macro_rules! impl_read_selected {
    ($state:ty) => {
        impl<'a, R: Read> FgbReader<'a, R, $state> {
            /// Number of selected features (unknown for datasets without
            /// feature count)
            pub fn features_count(&self) -> Option<usize> {
                self.count
            }
            /// Return current feature
            pub fn cur_feature(&self) -> &FgbFeature {
                &self.fbs
            }
            /// Read and process all selected features
            pub fn process_features<W: FeatureProcessor>(
                &mut self,
                out: &mut W,
            ) -> geozero::error::Result<()>
            where
                Self: FallibleStreamingIterator<Item = FgbFeature, Error = GeozeroError>,
            {
                out.dataset_begin(self.fbs.header().name())?;
                let mut cnt = 0;
                while let Some(feature) = self.next()? {
                    feature.process(out, cnt)?;
                    cnt += 1;
                }
                out.dataset_end()
            }

            fn read_feature_buf(&mut self) -> geozero::error::Result<bool> {
                // size prefix
                self.fbs.feature_buf.resize(4, 0);
                if self.count.is_none() {
                    // unknown feature count: read until end of stream
                    match self.reader.read_exact(&mut self.fbs.feature_buf) {
                        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(false),
                        res => res?,
                    }
                } else {
                    self.reader.read_exact(&mut self.fbs.feature_buf)?;
                }
                let sbuf = &self.fbs.feature_buf;
                let feature_size = u32::from_le_bytes([sbuf[0], sbuf[1], sbuf[2], sbuf[3]]) as usize;
                self.fbs.feature_buf.resize(feature_size + 4, 0);
                self.reader.read_exact(&mut self.fbs.feature_buf[4..])?;
                if self.verify {
                    let _feature = size_prefixed_root_as_feature(&self.fbs.feature_buf)
                        .map_err(|e| GeozeroError::Geometry(e.to_string()))?;
                }
                Ok(true)
            }
        }

        impl<'a, T: Read> GeozeroDatasource for FgbReader<'a, T, $state>
        where
            Self: FallibleStreamingIterator<Item = FgbFeature, Error = GeozeroError>,
        {
            /// Consume and process all selected features.
            fn process<P: FeatureProcessor>(&mut self, processor: &mut P) -> geozero::error::Result<()> {
                self.process_features(processor)
            }
        }
    };
}

impl_read_selected!(FeaturesSelected);
impl_read_selected!(FeaturesSelectedSeek);

/// `FallibleStreamingIterator` differs from the standard library's `Iterator`
/// in two ways:
/// * each call to `next` can fail.
/// * returned `FgbFeature` is valid until `next` is called again or the
///   reader is finalized.
///
/// While these iterators cannot be used with Rust `for` loops, `while let`
/// loops offer a similar level of ergonomics:
/// ```rust
/// use fgb::*;
/// # use std::fs::File;
/// # use std::io::BufReader;
///
/// # fn read_fgb() -> geozero::error::Result<()> {
/// # let mut filein = BufReader::new(File::open("countries.fgb")?);
/// # let mut fgb = FgbReader::open(&mut filein)?.select_all()?;
/// while let Some(feature) = fgb.next()? {
///     let props = feature.properties()?;
///     println!("{}", props["name"]);
/// }
/// # Ok(())
/// # }
/// ```
impl<'a, R: Read> FallibleStreamingIterator for FgbReader<'a, R, FeaturesSelected> {
    type Error = GeozeroError;
    type Item = FgbFeature;

    fn advance(&mut self) -> geozero::error::Result<()> {
        if self.finished {
            return Ok(());
        }
        if let Some(count) = self.count {
            if self.feat_no >= count {
                self.finished = true;
                return Ok(());
            }
        }
        self.feat_no += 1;
        if !self.read_feature_buf()? {
            self.finished = true;
        }
        Ok(())
    }

    fn get(&self) -> Option<&FgbFeature> {
        if self.finished || self.feat_no == 0 {
            None
        } else {
            Some(&self.fbs)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.count {
            _ if self.finished => (0, Some(0)),
            Some(count) => {
                let remaining = count - self.feat_no;
                (remaining, Some(remaining))
            }
            None => (0, None),
        }
    }
}

impl<'a, R: Read + Seek> FallibleStreamingIterator for FgbReader<'a, R, FeaturesSelectedSeek> {
    type Error = GeozeroError;
    type Item = FgbFeature;

    fn advance(&mut self) -> geozero::error::Result<()> {
        if self.finished {
            return Ok(());
        }
        if let Some(filter) = &self.item_filter {
            if self.feat_no >= filter.len() {
                self.finished = true;
                return Ok(());
            }
            let item = &filter[self.feat_no];
            self.reader
                .seek(SeekFrom::Start(self.feature_base + item.offset as u64))?;
        } else if let Some(count) = self.count {
            if self.feat_no >= count {
                self.finished = true;
                return Ok(());
            }
        }
        self.feat_no += 1;
        if !self.read_feature_buf()? {
            self.finished = true;
        }
        Ok(())
    }

    fn get(&self) -> Option<&FgbFeature> {
        if self.finished || self.feat_no == 0 {
            None
        } else {
            Some(&self.fbs)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.count {
            _ if self.finished => (0, Some(0)),
            Some(count) => {
                let remaining = count - self.feat_no;
                (remaining, Some(remaining))
            }
            None => (0, None),
        }
    }
}
