// ==============================================================================
// parsers/vcf.rs - Streaming VCF line source
// ==============================================================================
// Description: Decompresses a gzip VCF byte stream and classifies its lines
// Author: Matt Barham
// Created: 2025-11-20
// Modified: 2025-12-04
// Version: 2.0.0
// ==============================================================================
// Format: gzip (single or multi-member / bgzip), newline-delimited text
//   ##fileformat=VCFv4.2                      <- meta-header (kept verbatim)
//   #CHROM POS ID REF ALT QUAL FILTER INFO FORMAT s1 s2 ...   <- column header
//   chr1   100 .  A   G   .    .      .    DP:GT  30:0/1 ...    <- data
// ==============================================================================
// References:
// - VCF 4.2 Spec: https://samtools.github.io/hts-specs/VCFv4.2.pdf
// ==============================================================================

use async_compression::tokio::bufread::GzipDecoder;
use futures::TryStreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::config::FIXED_COLUMNS;
use crate::models::{DataLine, StreamHeader};

/// Gzip magic number (RFC 1952)
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Boxed byte stream handed to the line source
pub type InputReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Stream errors (fatal: the run aborts, persisted state is kept for resume)
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to fetch {location}: {details}")]
    Fetch { location: String, details: String },

    #[error("Input is not gzip-compressed (leading bytes {0:02x?})")]
    NotGzip(Vec<u8>),

    #[error("Failed to decode input at line {ordinal}: {source}")]
    Decode {
        ordinal: u64,
        source: std::io::Error,
    },

    #[error("Line {ordinal} is not valid UTF-8")]
    InvalidUtf8 { ordinal: u64 },

    #[error("Malformed header at line {ordinal}: {details}")]
    MalformedHeader { ordinal: u64, details: String },

    #[error("Input ended before the column header line")]
    MissingColumnHeader,
}

/// Open the input location as a byte stream
///
/// `http://` and `https://` locations are streamed through `client`; anything
/// else is treated as a local path (an optional `file://` prefix is stripped).
pub async fn open_input(
    location: &str,
    client: &reqwest::Client,
) -> Result<InputReader, StreamError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        info!("Streaming input from {}", location);

        let response = client
            .get(location)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StreamError::Fetch {
                location: location.to_string(),
                details: e.to_string(),
            })?;

        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(Box::pin(body))))
    } else {
        let path = location.strip_prefix("file://").unwrap_or(location);
        info!("Reading input from local file {}", path);

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| StreamError::Fetch {
                location: location.to_string(),
                details: e.to_string(),
            })?;

        Ok(Box::new(BufReader::new(file)))
    }
}

/// Lazy, single-pass sequence of data lines over a gzip byte stream
///
/// Meta-header lines are accumulated and exactly one column header is
/// captured before the first data line is yielded. The source cannot seek:
/// resuming means replaying from the beginning and skipping by ordinal.
pub struct LineSource<R: AsyncBufRead + Unpin> {
    reader: BufReader<GzipDecoder<R>>,
    buf: Vec<u8>,
    next_ordinal: u64,
    meta_lines: Vec<String>,
    header: Option<Arc<StreamHeader>>,
}

impl<R: AsyncBufRead + Unpin> LineSource<R> {
    /// Wrap a compressed byte stream, checking the gzip magic number first
    pub async fn new(mut input: R) -> Result<Self, StreamError> {
        let head = input
            .fill_buf()
            .await
            .map_err(|source| StreamError::Decode { ordinal: 0, source })?;

        let checked = head.len().min(GZIP_MAGIC.len());
        if head[..checked] != GZIP_MAGIC[..checked] {
            return Err(StreamError::NotGzip(head[..checked].to_vec()));
        }

        let mut decoder = GzipDecoder::new(input);
        decoder.multiple_members(true);

        Ok(Self {
            reader: BufReader::new(decoder),
            buf: Vec::new(),
            next_ordinal: 0,
            meta_lines: Vec::new(),
            header: None,
        })
    }

    /// Number of lines decoded so far (header and blank lines included)
    pub fn lines_read(&self) -> u64 {
        self.next_ordinal
    }

    /// Header captured so far, available once the column header was read
    pub fn header(&self) -> Option<Arc<StreamHeader>> {
        self.header.clone()
    }

    /// Next data line, or `None` once the stream is exhausted
    pub async fn next_data_line(&mut self) -> Result<Option<DataLine>, StreamError> {
        loop {
            let ordinal = self.next_ordinal;
            self.buf.clear();

            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .await
                .map_err(|source| StreamError::Decode { ordinal, source })?;

            if read == 0 {
                debug!("Input exhausted after {} lines", self.next_ordinal);
                return match self.header {
                    Some(_) => Ok(None),
                    None => Err(StreamError::MissingColumnHeader),
                };
            }
            self.next_ordinal += 1;

            let mut end = self.buf.len();
            while end > 0 && matches!(self.buf[end - 1], b'\n' | b'\r') {
                end -= 1;
            }

            let text = std::str::from_utf8(&self.buf[..end])
                .map_err(|_| StreamError::InvalidUtf8 { ordinal })?;

            if text.is_empty() {
                continue;
            }

            if text.starts_with("##") {
                if self.header.is_some() {
                    return Err(StreamError::MalformedHeader {
                        ordinal,
                        details: "meta-header line after the column header".to_string(),
                    });
                }
                self.meta_lines.push(text.to_string());
                continue;
            }

            if text.starts_with('#') {
                if self.header.is_some() {
                    return Err(StreamError::MalformedHeader {
                        ordinal,
                        details: "second column header line".to_string(),
                    });
                }
                let columns = parse_column_header(text, ordinal)?;
                let header = StreamHeader {
                    meta_lines: std::mem::take(&mut self.meta_lines),
                    columns,
                };
                info!(
                    "Column header at line {}: {} meta-header lines, {} samples",
                    ordinal,
                    header.meta_lines.len(),
                    header.sample_ids().len()
                );
                self.header = Some(Arc::new(header));
                continue;
            }

            let header = self
                .header
                .clone()
                .ok_or_else(|| StreamError::MalformedHeader {
                    ordinal,
                    details: "data line before the column header".to_string(),
                })?;

            return Ok(Some(DataLine {
                ordinal,
                text: text.to_string(),
                header,
            }));
        }
    }
}

/// Split the column header and check that sample identifiers are unique
fn parse_column_header(text: &str, ordinal: u64) -> Result<Vec<String>, StreamError> {
    let columns: Vec<String> = text.split('\t').map(String::from).collect();

    if columns.len() < FIXED_COLUMNS {
        return Err(StreamError::MalformedHeader {
            ordinal,
            details: format!(
                "expected at least {} columns, found {}",
                FIXED_COLUMNS,
                columns.len()
            ),
        });
    }

    let mut seen = HashSet::new();
    for sample in &columns[FIXED_COLUMNS..] {
        if !seen.insert(sample.as_str()) {
            return Err(StreamError::MalformedHeader {
                ordinal,
                details: format!("duplicate sample identifier '{}'", sample),
            });
        }
    }

    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const VCF: &str = "\
##fileformat=VCFv4.2
##source=test
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tfather\tmother
chr1\t100\t.\tA\tG\t.\t.\t.\tDP:GT\t30:0/1\t5:0/0
chr1\t200\t.\tC\tT\t.\t.\t.\tDP:GT\t.:0/1\t40:1/1
";

    fn gzip(contents: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(contents).unwrap();
        encoder.finish().unwrap()
    }

    async fn collect(input: &[u8]) -> Result<Vec<DataLine>, StreamError> {
        let mut source = LineSource::new(input).await?;
        let mut lines = Vec::new();
        while let Some(line) = source.next_data_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    #[tokio::test]
    async fn test_classifies_lines() {
        let gz = gzip(VCF.as_bytes());
        let lines = collect(&gz).await.unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].ordinal, 3);
        assert_eq!(lines[1].ordinal, 4);
        assert!(lines[0].text.starts_with("chr1\t100\t"));
        assert!(!lines[0].text.ends_with('\n'));

        let header = &lines[0].header;
        assert_eq!(
            header.meta_lines,
            vec!["##fileformat=VCFv4.2", "##source=test"]
        );
        assert_eq!(header.sample_ids(), &["father", "mother"]);
        assert!(Arc::ptr_eq(&lines[0].header, &lines[1].header));
    }

    #[tokio::test]
    async fn test_crlf_and_blank_lines() {
        let contents = VCF.replace('\n', "\r\n").replace("##source=test\r\n", "##source=test\r\n\r\n");
        let gz = gzip(contents.as_bytes());
        let lines = collect(&gz).await.unwrap();

        assert_eq!(lines.len(), 2);
        // blank line still consumes an ordinal
        assert_eq!(lines[0].ordinal, 4);
        assert!(!lines[0].text.ends_with('\r'));
        assert_eq!(lines[0].header.meta_lines[1], "##source=test");
    }

    #[tokio::test]
    async fn test_multi_member_stream() {
        let (head, tail) = VCF.split_at(VCF.find("chr1\t200").unwrap());
        let mut gz = gzip(head.as_bytes());
        gz.extend(gzip(tail.as_bytes()));

        let lines = collect(&gz).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].ordinal, 4);
    }

    #[tokio::test]
    async fn test_rejects_plain_text() {
        let result = LineSource::new(VCF.as_bytes()).await;
        assert!(matches!(result, Err(StreamError::NotGzip(_))));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_fatal() {
        let mut contents = VCF.as_bytes().to_vec();
        contents.extend_from_slice(b"chr1\t300\t.\t\xff\xfe\n");
        let gz = gzip(&contents);

        match collect(&gz).await {
            Err(StreamError::InvalidUtf8 { ordinal }) => assert_eq!(ordinal, 5),
            other => panic!("Expected InvalidUtf8, got {:?}", other.map(|l| l.len())),
        }
    }

    #[tokio::test]
    async fn test_truncated_stream_is_fatal() {
        let gz = gzip(VCF.as_bytes());
        let truncated = &gz[..gz.len() / 2];

        assert!(matches!(
            collect(truncated).await,
            Err(StreamError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_column_header() {
        let gz = gzip(b"##fileformat=VCFv4.2\n");
        assert!(matches!(
            collect(&gz).await,
            Err(StreamError::MissingColumnHeader)
        ));
    }

    #[tokio::test]
    async fn test_data_before_column_header() {
        let gz = gzip(b"##fileformat=VCFv4.2\nchr1\t100\n");
        match collect(&gz).await {
            Err(StreamError::MalformedHeader { ordinal, .. }) => assert_eq!(ordinal, 1),
            other => panic!("Expected MalformedHeader, got {:?}", other.map(|l| l.len())),
        }
    }

    #[tokio::test]
    async fn test_meta_header_after_column_header() {
        let contents = format!("{}##late=1\n", VCF);
        let gz = gzip(contents.as_bytes());
        assert!(matches!(
            collect(&gz).await,
            Err(StreamError::MalformedHeader { ordinal: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_sample_ids() {
        let contents = VCF.replace("father\tmother", "father\tfather");
        let gz = gzip(contents.as_bytes());
        assert!(matches!(
            collect(&gz).await,
            Err(StreamError::MalformedHeader { ordinal: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_open_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.vcf.gz");
        std::fs::write(&path, gzip(VCF.as_bytes())).unwrap();

        let client = reqwest::Client::new();
        for location in [
            path.to_string_lossy().to_string(),
            format!("file://{}", path.display()),
        ] {
            let input = open_input(&location, &client).await.unwrap();
            let mut source = LineSource::new(input).await.unwrap();
            let first = source.next_data_line().await.unwrap().unwrap();
            assert_eq!(first.ordinal, 3);
            assert_eq!(source.lines_read(), 4);
        }
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let client = reqwest::Client::new();
        let result = open_input("/nonexistent/input.vcf.gz", &client).await;
        assert!(matches!(result, Err(StreamError::Fetch { .. })));
    }
}
