//! Byte sources and sinks.
//!
//! Container backends read from a [`SourceReader`] and write to any
//! `std::io::Write`; both are used from blocking tasks only.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use mediaflow_core::{Error, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Where a demuxer reads from.
pub enum MediaSource {
    /// File path, optionally prefixed with `file:`.
    Url(String),
    /// Complete container held in memory.
    Memory(Vec<u8>),
    /// Chunks written through a [`DemuxerStreamWriter`].
    Push(PushSource),
}

impl MediaSource {
    pub fn url(url: impl Into<String>) -> Self {
        MediaSource::Url(url.into())
    }

    pub fn memory(data: Vec<u8>) -> Self {
        MediaSource::Memory(data)
    }

    /// The URL, if this is a URL source.
    pub fn as_url(&self) -> Option<&str> {
        match self {
            MediaSource::Url(url) => Some(url),
            _ => None,
        }
    }
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
            MediaSource::Memory(data) => write!(f, "Memory({} bytes)", data.len()),
            MediaSource::Push(_) => write!(f, "Push"),
        }
    }
}

impl From<&str> for MediaSource {
    fn from(url: &str) -> Self {
        MediaSource::Url(url.to_string())
    }
}

impl From<String> for MediaSource {
    fn from(url: String) -> Self {
        MediaSource::Url(url)
    }
}

impl From<Vec<u8>> for MediaSource {
    fn from(data: Vec<u8>) -> Self {
        MediaSource::Memory(data)
    }
}

/// Strip an optional `file:` scheme.
pub fn url_to_path(url: &str) -> &str {
    url.strip_prefix("file://")
        .or_else(|| url.strip_prefix("file:"))
        .unwrap_or(url)
}

/// Lowercased extension of a URL's path component.
pub fn url_extension(url: &str) -> Option<String> {
    let path = url_to_path(url);
    let name = path.rsplit(['/', '\\']).next()?;
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Create a push source.
///
/// The writer half queues chunks; once `high_water_mark` chunks are waiting
/// `write` suspends until the demuxer has consumed one. Open a demuxer on the
/// returned [`MediaSource`].
pub fn demuxer_stream(high_water_mark: usize) -> (DemuxerStreamWriter, MediaSource) {
    let (tx, rx) = mpsc::channel(high_water_mark.max(1));
    (
        DemuxerStreamWriter { tx: Some(tx) },
        MediaSource::Push(PushSource { rx }),
    )
}

/// Writer half of a push source.
pub struct DemuxerStreamWriter {
    tx: Option<mpsc::Sender<Vec<u8>>>,
}

impl DemuxerStreamWriter {
    /// Queue a chunk, waiting while the queue is full.
    pub async fn write(&mut self, chunk: impl Into<Vec<u8>>) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::sequence("demuxer stream: write called after end"))?;
        tx.send(chunk.into()).await.map_err(|_| {
            Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "demuxer stream reader was dropped",
            ))
        })
    }

    /// Signal end of data. The demuxer sees end of stream once the queue
    /// drains.
    pub fn end(&mut self) {
        self.tx = None;
    }
}

/// Reader half of a push source.
pub struct PushSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

/// Blocking reader over a push source.
///
/// Keeps unconsumed bytes in `buf` so that probing can look ahead without
/// losing data.
struct PushReader {
    rx: mpsc::Receiver<Vec<u8>>,
    buf: Vec<u8>,
    cursor: usize,
    ended: bool,
}

impl PushReader {
    fn fill(&mut self) -> bool {
        if self.ended {
            return false;
        }
        match self.rx.blocking_recv() {
            Some(chunk) => {
                if self.cursor == self.buf.len() {
                    self.buf.clear();
                    self.cursor = 0;
                }
                self.buf.extend_from_slice(&chunk);
                true
            }
            None => {
                self.ended = true;
                false
            }
        }
    }

    fn peek(&mut self, n: usize) -> &[u8] {
        while self.buf.len() - self.cursor < n && self.fill() {}
        let end = (self.cursor + n).min(self.buf.len());
        &self.buf[self.cursor..end]
    }
}

impl Read for PushReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.cursor == self.buf.len() {
            if !self.fill() {
                return Ok(0);
            }
        }
        let n = out.len().min(self.buf.len() - self.cursor);
        out[..n].copy_from_slice(&self.buf[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }
}

enum Inner {
    File(BufReader<File>),
    Memory(Cursor<Vec<u8>>),
    Push(PushReader),
}

/// Blocking reader handed to demux backends.
///
/// Tracks its own byte position so unseekable sources can still report
/// packet offsets.
pub struct SourceReader {
    inner: Inner,
    pos: u64,
    len: Option<u64>,
}

impl SourceReader {
    pub(crate) fn from_file(file: File) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            inner: Inner::File(BufReader::new(file)),
            pos: 0,
            len: Some(len),
        })
    }

    pub(crate) fn from_memory(data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Self {
            inner: Inner::Memory(Cursor::new(data)),
            pos: 0,
            len: Some(len),
        }
    }

    pub(crate) fn from_push(source: PushSource) -> Self {
        Self {
            inner: Inner::Push(PushReader {
                rx: source.rx,
                buf: Vec::new(),
                cursor: 0,
                ended: false,
            }),
            pos: 0,
            len: None,
        }
    }

    /// True unless the source is a push stream.
    pub fn is_seekable(&self) -> bool {
        !matches!(self.inner, Inner::Push(_))
    }

    /// Current byte offset.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Total size, if known.
    pub fn len(&self) -> Option<u64> {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == Some(0)
    }

    /// Look at up to `n` upcoming bytes without consuming them.
    pub fn peek(&mut self, n: usize) -> Result<Vec<u8>> {
        if let Inner::Push(reader) = &mut self.inner {
            return Ok(reader.peek(n).to_vec());
        }
        let start = self.pos;
        let mut buf = Vec::with_capacity(n);
        self.by_ref().take(n as u64).read_to_end(&mut buf)?;
        self.seek(SeekFrom::Start(start))?;
        Ok(buf)
    }
}

impl Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.inner {
            Inner::File(r) => r.read(buf)?,
            Inner::Memory(r) => r.read(buf)?,
            Inner::Push(r) => r.read(buf)?,
        };
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SourceReader {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let pos = match &mut self.inner {
            Inner::File(r) => r.seek(target)?,
            Inner::Memory(r) => r.seek(target)?,
            Inner::Push(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "push sources cannot seek",
                ))
            }
        };
        self.pos = pos;
        Ok(pos)
    }
}

/// Shared in-memory output buffer.
///
/// Clones share the same storage, so a caller can keep one handle and read
/// the finished container after `write_trailer`.
#[derive(Clone, Default)]
pub struct MemoryBuffer(Arc<Mutex<Vec<u8>>>);

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the bytes written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

impl fmt::Debug for MemoryBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryBuffer({} bytes)", self.len())
    }
}

impl Write for MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Where a muxer writes to.
#[derive(Debug, Clone)]
pub enum MediaSink {
    /// File path, optionally prefixed with `file:`. Created or truncated.
    Url(String),
    Memory(MemoryBuffer),
}

impl MediaSink {
    pub(crate) fn open(&self) -> Result<Box<dyn Write + Send>> {
        match self {
            MediaSink::Url(url) => {
                let file = File::create(url_to_path(url))?;
                Ok(Box::new(BufWriter::new(file)))
            }
            MediaSink::Memory(buf) => Ok(Box::new(buf.clone())),
        }
    }
}

impl From<&str> for MediaSink {
    fn from(url: &str) -> Self {
        MediaSink::Url(url.to_string())
    }
}

impl From<MemoryBuffer> for MediaSink {
    fn from(buf: MemoryBuffer) -> Self {
        MediaSink::Memory(buf)
    }
}

/// Open a source for blocking reads.
pub(crate) fn open_source(source: MediaSource) -> Result<SourceReader> {
    match source {
        MediaSource::Url(url) => SourceReader::from_file(File::open(url_to_path(&url))?),
        MediaSource::Memory(data) => Ok(SourceReader::from_memory(data)),
        MediaSource::Push(push) => Ok(SourceReader::from_push(push)),
    }
}
