use crate::error::{Error, Result};
use crate::feature_generated::*;
use crate::header_generated::*;
use crate::http_client::{AsyncRangeClient, BufferedRangeClient, HttpRangeClient};
use crate::packed_r_tree::{PackedRTree, SearchResultItem};
use crate::properties_reader::FgbFeature;
use crate::{check_magic_bytes, HEADER_MAX_BUFFER_SIZE, MAGIC_BYTES};
use geozero::error::GeozeroError;
use geozero::{FeatureAccess, FeatureProcessor};
use log::trace;

#[doc(hidden)]
pub mod mock_http_range_client;

// Prefetch size covering magic bytes, header prefix and a typical header
const INITIAL_REQUEST_SIZE: usize = 2024;
// Read ahead when scanning features sequentially
const SEQUENTIAL_REQUEST_SIZE: usize = 1024 * 1024;
// Request granularity for bbox filtered feature reads
const FILTERED_REQUEST_SIZE: usize = 8 * 1024;

/// FGB dataset HTTP reader
///
/// ```rust
/// use fgb::*;
/// use geozero::ToJson;
///
/// # async fn read_fgb() -> fgb::Result<()> {
/// let mut fgb = HttpFgbReader::open("https://example.com/countries.fgb")
///     .await?
///     .select_bbox(8.8, 47.2, 9.5, 55.3)
///     .await?;
/// while let Some(feature) = fgb.next().await? {
///     let props = feature.properties().unwrap();
///     println!("{}", props["name"]);
/// }
/// # Ok(())
/// # }
/// ```
pub struct HttpFgbReader<C: AsyncRangeClient = HttpRangeClient> {
    client: BufferedRangeClient<C>,
    // feature reading requires header access, therefore
    // header_buf is included in the FgbFeature struct.
    fbs: FgbFeature,
}

impl HttpFgbReader<HttpRangeClient> {
    /// Open dataset by reading the header information over HTTP
    pub async fn open(url: &str) -> Result<HttpFgbReader<HttpRangeClient>> {
        trace!("starting: opening http reader, reading header");
        let client = BufferedRangeClient::new(url);
        Self::_open(client).await
    }
}

impl<C: AsyncRangeClient> HttpFgbReader<C> {
    pub(crate) async fn _open(mut client: BufferedRangeClient<C>) -> Result<HttpFgbReader<C>> {
        let bytes = client.get_range(0, 8, INITIAL_REQUEST_SIZE).await?;
        if !check_magic_bytes(bytes) {
            return Err(Error::MissingMagicBytes);
        }
        let bytes = client.get_range(8, 4, INITIAL_REQUEST_SIZE).await?;
        let header_size = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if header_size > HEADER_MAX_BUFFER_SIZE || header_size < 8 {
            // minimum size check avoids panic in FlatBuffers header decoding
            return Err(Error::IllegalHeaderSize(header_size));
        }
        let mut header_buf = Vec::with_capacity(header_size + 4);
        header_buf.extend_from_slice(&(header_size as u32).to_le_bytes());
        let bytes = client.get_range(12, header_size, INITIAL_REQUEST_SIZE).await?;
        header_buf.extend_from_slice(bytes);

        let _header = size_prefixed_root_as_header(&header_buf)?;

        Ok(HttpFgbReader {
            client,
            fbs: FgbFeature {
                header_buf,
                feature_buf: Vec::new(),
            },
        })
    }

    /// Header information
    pub fn header(&self) -> Header {
        self.fbs.header()
    }

    fn header_len(&self) -> usize {
        MAGIC_BYTES.len() + self.fbs.header_buf.len()
    }

    fn index_size(&self) -> Result<usize> {
        let header = self.fbs.header();
        let count = header.features_count() as usize;
        if header.index_node_size() > 0 && count > 0 {
            PackedRTree::index_size(count, header.index_node_size())
        } else {
            Ok(0)
        }
    }

    /// Select all features.
    pub async fn select_all(self) -> Result<HttpFeatureIter<C>> {
        let count = self.fbs.header().features_count() as usize;
        let feature_base = self.header_len() + self.index_size()?;
        Ok(HttpFeatureIter {
            client: self.client,
            fbs: self.fbs,
            selection: FeatureSelection::SelectAll {
                features_left: count,
                pos: feature_base,
            },
        })
    }

    /// Select features within a bounding box, traversing the spatial index
    /// with HTTP range requests.
    pub async fn select_bbox(
        mut self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> Result<HttpFeatureIter<C>> {
        let header = self.fbs.header();
        if header.index_node_size() == 0 {
            return Err(Error::NoIndex);
        }
        let count = header.features_count() as usize;
        let node_size = header.index_node_size();
        let index_begin = self.header_len();
        let mut items = if count > 0 {
            PackedRTree::http_stream_search(
                &mut self.client,
                index_begin,
                count,
                node_size,
                min_x,
                min_y,
                max_x,
                max_y,
            )
            .await?
        } else {
            Vec::new()
        };
        items.sort_unstable_by(|a, b| a.offset.cmp(&b.offset));
        let feature_base = self.header_len() + self.index_size()?;
        Ok(HttpFeatureIter {
            client: self.client,
            fbs: self.fbs,
            selection: FeatureSelection::SelectBbox {
                feature_base,
                items,
                cur: 0,
            },
        })
    }
}

enum FeatureSelection {
    SelectAll {
        /// Features left to read (0 if unknown)
        features_left: usize,
        /// Absolute position of the next feature
        pos: usize,
    },
    SelectBbox {
        /// Absolute position of the feature section
        feature_base: usize,
        /// Selected features, sorted by offset
        items: Vec<SearchResultItem>,
        /// Current position in items
        cur: usize,
    },
}

/// Iterator over the selected features of a [`HttpFgbReader`]
pub struct HttpFeatureIter<C: AsyncRangeClient = HttpRangeClient> {
    client: BufferedRangeClient<C>,
    fbs: FgbFeature,
    selection: FeatureSelection,
}

impl<C: AsyncRangeClient> HttpFeatureIter<C> {
    /// Header information
    pub fn header(&self) -> Header {
        self.fbs.header()
    }

    /// Number of selected features (unknown for full scans without feature
    /// count)
    pub fn features_count(&self) -> Option<usize> {
        match &self.selection {
            FeatureSelection::SelectAll { features_left, .. } => {
                (*features_left > 0).then_some(*features_left)
            }
            FeatureSelection::SelectBbox { items, cur, .. } => Some(items.len() - cur),
        }
    }

    /// Read the next feature
    pub async fn next(&mut self) -> Result<Option<&FgbFeature>> {
        let (p, min_req_size) = match &mut self.selection {
            FeatureSelection::SelectAll { features_left, pos } => {
                if *features_left == 0 {
                    return Ok(None);
                }
                *features_left -= 1;
                (*pos, SEQUENTIAL_REQUEST_SIZE)
            }
            FeatureSelection::SelectBbox {
                feature_base,
                items,
                cur,
            } => {
                if *cur >= items.len() {
                    return Ok(None);
                }
                let item = &items[*cur];
                *cur += 1;
                (*feature_base + item.offset, FILTERED_REQUEST_SIZE)
            }
        };
        let bytes = self.client.get_range(p, 4, min_req_size).await?;
        let feature_size = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        self.fbs.feature_buf.clear();
        self.fbs
            .feature_buf
            .extend_from_slice(&(feature_size as u32).to_le_bytes());
        let bytes = self.client.get_range(p + 4, feature_size, min_req_size).await?;
        self.fbs.feature_buf.extend_from_slice(bytes);
        if let FeatureSelection::SelectAll { pos, .. } = &mut self.selection {
            *pos = p + 4 + feature_size;
        }
        let _feature = size_prefixed_root_as_feature(&self.fbs.feature_buf)?;
        Ok(Some(&self.fbs))
    }

    /// Return current feature
    pub fn cur_feature(&self) -> &FgbFeature {
        &self.fbs
    }

    /// Read and process all selected features
    pub async fn process_features<W: FeatureProcessor>(
        &mut self,
        out: &mut W,
    ) -> geozero::error::Result<()> {
        out.dataset_begin(self.fbs.header().name())?;
        let mut cnt = 0;
        while let Some(feature) = self
            .next()
            .await
            .map_err(|e| GeozeroError::Feature(e.to_string()))?
        {
            feature.process(out, cnt)?;
            cnt += 1;
        }
        out.dataset_end()
    }
}
