use crate::error::{Error, Result};
use crate::http_client::{AsyncRangeClient, BufferedRangeClient};
use crate::http_reader::HttpFgbReader;
use bytes::Bytes;
use log::trace;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

impl HttpFgbReader<MockHttpRangeClient> {
    /// NOTE: For debugging expediency, this test class often prefers panics over returning a result.
    pub async fn mock_from_file(
        path: &str,
    ) -> Result<(
        HttpFgbReader<MockHttpRangeClient>,
        Arc<RwLock<RequestStats>>,
    )> {
        trace!("starting: opening mock http reader, reading header");

        let stats = Arc::new(RwLock::new(RequestStats::new()));
        let http_client = MockHttpRangeClient::new(path, stats.clone());
        let client = BufferedRangeClient::with(http_client);
        Ok((Self::_open(client).await?, stats))
    }
}

/// File-backed range client for tests, counting requests.
///
/// NOTE: For debugging expediency, this test class often prefers panics over returning a result.
pub struct MockHttpRangeClient {
    path: PathBuf,
    stats: Arc<RwLock<RequestStats>>,
}

pub struct RequestStats {
    pub request_count: u64,
    pub bytes_requested: u64,
}

impl RequestStats {
    fn new() -> Self {
        Self {
            request_count: 0,
            bytes_requested: 0,
        }
    }
}

#[async_trait::async_trait]
impl AsyncRangeClient for MockHttpRangeClient {
    async fn get_range(&mut self, begin: usize, length: usize) -> Result<Bytes> {
        let mut stats = self
            .stats
            .write()
            .expect("test code does not handle actual concurrency");
        stats.request_count += 1;
        stats.bytes_requested += length as u64;

        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len() as usize;
        if begin >= file_len {
            return Err(Error::HttpStatus(416));
        }
        // like an HTTP server, clamp the range to the end of the file
        let length = length.min(file_len - begin);
        let mut file_reader = BufReader::new(file);
        file_reader
            .seek(SeekFrom::Start(begin as u64))
            .expect("unable to seek test reader");
        let mut output = vec![0; length];
        file_reader
            .read_exact(&mut output)
            .expect("failed to read from test reader");
        Ok(Bytes::from(output))
    }
}

impl MockHttpRangeClient {
    fn new(path: &str, stats: Arc<RwLock<RequestStats>>) -> Self {
        Self {
            path: path.into(),
            stats,
        }
    }
}
