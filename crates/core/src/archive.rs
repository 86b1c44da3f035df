//! Random-access reader over zip-packed release bundles.

use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use flate2::read::DeflateDecoder;
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::{CompressionMethod, ZipArchive};

/// An opened release archive.
///
/// The central directory is parsed once by [`BundleArchive::open`]. Clones
/// share the parsed directory and the underlying bytes, so handing a clone to
/// a blocking worker costs a few reference count bumps.
#[derive(Clone)]
pub struct BundleArchive {
    inner: ZipArchive<Cursor<Bytes>>,
    bytes: Bytes,
}

impl std::fmt::Debug for BundleArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleArchive")
            .field("entries", &self.inner.len())
            .finish()
    }
}

fn map_zip_error(name: &str, err: ZipError) -> Error {
    match err {
        ZipError::FileNotFound => Error::EntryNotFound(name.to_string()),
        ZipError::Io(e) => Error::Io(e),
        other => Error::InvalidArchive(other.to_string()),
    }
}

impl BundleArchive {
    /// Parse the central directory of `bytes`.
    pub fn open(bytes: Bytes) -> Result<Self> {
        let inner = ZipArchive::new(Cursor::new(bytes.clone()))
            .map_err(|e| Error::InvalidArchive(e.to_string()))?;
        Ok(Self { inner, bytes })
    }

    /// Number of entries in the archive.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Whether `name` is present in the central directory.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.index_for_name(name).is_some()
    }

    /// Entry names in central directory order.
    pub fn entry_names(&self) -> Vec<String> {
        self.inner.file_names().map(str::to_string).collect()
    }

    /// Uncompressed size of an entry as recorded in the central directory.
    pub fn entry_size(&self, name: &str) -> Result<u64> {
        let mut archive = self.inner.clone();
        let file = archive.by_name(name).map_err(|e| map_zip_error(name, e))?;
        Ok(file.size())
    }

    /// Decompress a whole entry into memory.
    pub fn read_entry(&self, name: &str) -> Result<Bytes> {
        let mut archive = self.inner.clone();
        let mut file = archive.by_name(name).map_err(|e| map_zip_error(name, e))?;

        // The recorded size is only a hint; cap the preallocation.
        let hint = usize::try_from(file.size()).unwrap_or(usize::MAX).min(64 * 1024 * 1024);
        let mut buf = Vec::with_capacity(hint);
        file.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Open a standalone decompressor over one entry.
    ///
    /// The reader owns a slice of the archive bytes covering the entry's
    /// compressed data, so it can move between blocking tasks and be driven
    /// one chunk at a time.
    pub fn entry_reader(&self, name: &str) -> Result<EntryReader> {
        let mut archive = self.inner.clone();
        let file = archive.by_name(name).map_err(|e| map_zip_error(name, e))?;

        let start = usize::try_from(file.data_start())
            .map_err(|_| Error::InvalidArchive(format!("{name}: data offset out of range")))?;
        let end = usize::try_from(file.compressed_size())
            .ok()
            .and_then(|len| start.checked_add(len))
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| Error::InvalidArchive(format!("{name}: truncated entry data")))?;
        let compressed = Cursor::new(self.bytes.slice(start..end));
        let size = file.size();

        let decoder: Box<dyn Read + Send> = match file.compression() {
            CompressionMethod::Stored => Box::new(compressed.take(size)),
            CompressionMethod::Deflated => Box::new(DeflateDecoder::new(compressed).take(size)),
            other => {
                return Err(Error::InvalidArchive(format!(
                    "{name}: unsupported compression method {other:?}"
                )));
            }
        };

        Ok(EntryReader { decoder })
    }
}

/// Incremental decompressor returned by [`BundleArchive::entry_reader`].
pub struct EntryReader {
    decoder: Box<dyn Read + Send>,
}

impl std::fmt::Debug for EntryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryReader").finish_non_exhaustive()
    }
}

impl EntryReader {
    /// Decompress the next chunk of at most `chunk_size` bytes.
    ///
    /// Returns `None` once the entry is exhausted. Blocking; run it off the
    /// async runtime.
    pub fn next_chunk(&mut self, chunk_size: usize) -> Result<Option<Bytes>> {
        let chunk_size = chunk_size.max(1);
        let mut buf = BytesMut::zeroed(chunk_size);
        let mut filled = 0;
        while filled < chunk_size {
            let n = self.decoder.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf.freeze()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Bytes {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        Bytes::from(writer.finish().unwrap().into_inner())
    }

    #[test]
    fn reads_named_entries() {
        let archive = BundleArchive::open(build_zip(&[
            ("metadata.json", b"{}"),
            ("bundles/ios.js", b"console.log('ios')"),
        ]))
        .unwrap();

        assert_eq!(archive.len(), 2);
        assert!(archive.contains("bundles/ios.js"));
        assert!(!archive.contains("bundles/android.js"));
        assert_eq!(
            archive.read_entry("bundles/ios.js").unwrap(),
            Bytes::from_static(b"console.log('ios')")
        );
        assert_eq!(archive.entry_size("metadata.json").unwrap(), 2);
        assert_eq!(
            archive.entry_names(),
            vec!["metadata.json".to_string(), "bundles/ios.js".to_string()]
        );
    }

    #[test]
    fn missing_entry_is_entry_not_found() {
        let archive = BundleArchive::open(build_zip(&[("metadata.json", b"{}")])).unwrap();
        assert!(matches!(
            archive.read_entry("assets/missing.png"),
            Err(Error::EntryNotFound(name)) if name == "assets/missing.png"
        ));
        assert!(matches!(
            archive.entry_size("assets/missing.png"),
            Err(Error::EntryNotFound(_))
        ));
    }

    #[test]
    fn garbage_is_invalid_archive() {
        assert!(matches!(
            BundleArchive::open(Bytes::from_static(b"definitely not a zip file")),
            Err(Error::InvalidArchive(_))
        ));
    }

    fn drain(mut reader: EntryReader, chunk_size: usize) -> Vec<Bytes> {
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk(chunk_size).unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn chunked_read_matches_full_read() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let archive = BundleArchive::open(build_zip(&[("big.bin", &payload)])).unwrap();

        let chunks = drain(archive.entry_reader("big.bin").unwrap(), 4096);
        assert_eq!(
            chunks.iter().map(Bytes::len).collect::<Vec<_>>(),
            vec![4096, 4096, 1808]
        );
        assert_eq!(chunks.concat(), payload);
    }

    #[test]
    fn chunked_read_handles_stored_entries() {
        let payload = vec![7u8; 9000];
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("raw.bin", options).unwrap();
        writer.write_all(&payload).unwrap();
        writer.start_file("after.txt", options).unwrap();
        writer.write_all(b"trailing entry").unwrap();
        let bytes = Bytes::from(writer.finish().unwrap().into_inner());

        let archive = BundleArchive::open(bytes).unwrap();
        let chunks = drain(archive.entry_reader("raw.bin").unwrap(), 1000);
        assert_eq!(chunks.len(), 9);
        assert_eq!(chunks.concat(), payload);
    }

    #[test]
    fn entry_reader_outlives_its_archive() {
        let archive = BundleArchive::open(build_zip(&[("a.txt", b"aaa")])).unwrap();
        let mut reader = archive.entry_reader("a.txt").unwrap();
        drop(archive);

        let handle = std::thread::spawn(move || reader.next_chunk(64).unwrap());
        assert_eq!(handle.join().unwrap(), Some(Bytes::from_static(b"aaa")));
    }

    #[test]
    fn entry_reader_missing_entry() {
        let archive = BundleArchive::open(build_zip(&[("metadata.json", b"{}")])).unwrap();
        assert!(matches!(
            archive.entry_reader("nope"),
            Err(Error::EntryNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn clones_read_independently() {
        let archive =
            BundleArchive::open(build_zip(&[("a.txt", b"aaa"), ("b.txt", b"bbb")])).unwrap();
        let clone = archive.clone();
        assert_eq!(clone.read_entry("b.txt").unwrap(), Bytes::from_static(b"bbb"));
        assert_eq!(archive.read_entry("a.txt").unwrap(), Bytes::from_static(b"aaa"));
    }
}
