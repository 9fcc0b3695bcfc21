//! Streaming ZIP writer for non-seekable outputs.
//!
//! The archive is written front to back and never seeks, so it can go
//! straight into an HTTP response body:
//!
//! ```text
//! [local header][data][data descriptor]   ← one per entry, as it completes
//! [local header][data][data descriptor]
//! ...
//! [central directory][end of central directory]   ← written by finish()
//! ```
//!
//! Entries are *stored* (no compression): linearized PDFs are already
//! compressed internally and deflating them again costs CPU for almost no
//! gain. Sizes and CRC-32 are unknown when an entry starts, so every entry
//! sets general-purpose bit 3 and carries a trailing data descriptor. Names
//! are flagged as UTF-8 (bit 11).
//!
//! ZIP64 is not implemented; an archive is limited to 65 535 entries and
//! 4 GiB per entry and offset. Exceeding either is an `InvalidInput` error.

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4b50;

const VERSION_NEEDED: u16 = 20;
/// Made by: Unix (3), APPNOTE version 2.0.
const VERSION_MADE_BY: u16 = (3 << 8) | 20;
/// Bit 3: sizes in data descriptor. Bit 11: UTF-8 names.
const FLAGS: u16 = 0x0008 | 0x0800;
const METHOD_STORED: u16 = 0;
/// Regular file, rw-r--r--.
const EXTERNAL_ATTRS: u32 = 0o100644 << 16;

const COPY_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug)]
struct CentralEntry {
    name: String,
    crc32: u32,
    size: u32,
    offset: u32,
}

/// Writes a ZIP archive sequentially into `W`.
#[derive(Debug)]
pub struct ZipStreamWriter<W> {
    inner: W,
    offset: u64,
    entries: Vec<CentralEntry>,
    dos_time: u16,
    dos_date: u16,
}

impl<W: AsyncWrite + Unpin> ZipStreamWriter<W> {
    pub fn new(inner: W) -> Self {
        let (dos_time, dos_date) = dos_datetime(Utc::now());
        Self {
            inner,
            offset: 0,
            entries: Vec::new(),
            dos_time,
            dos_date,
        }
    }

    /// Number of entries written so far.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Bytes written to the underlying stream so far.
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    /// Append one entry named `name`, copying `reader` to EOF.
    ///
    /// Returns the number of content bytes written. On error the archive is
    /// left mid-entry and must not be finished.
    pub async fn append<R>(&mut self, name: &str, reader: &mut R) -> io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if self.entries.len() >= u16::MAX as usize {
            return Err(too_large("more than 65535 entries"));
        }
        let name_len = u16::try_from(name.len()).map_err(|_| too_large("entry name too long"))?;
        let offset = u32::try_from(self.offset).map_err(|_| too_large("archive exceeds 4 GiB"))?;

        let mut header = Vec::with_capacity(30 + name.len());
        put_u32(&mut header, LOCAL_HEADER_SIG);
        put_u16(&mut header, VERSION_NEEDED);
        put_u16(&mut header, FLAGS);
        put_u16(&mut header, METHOD_STORED);
        put_u16(&mut header, self.dos_time);
        put_u16(&mut header, self.dos_date);
        put_u32(&mut header, 0); // crc32, in descriptor
        put_u32(&mut header, 0); // compressed size, in descriptor
        put_u32(&mut header, 0); // uncompressed size, in descriptor
        put_u16(&mut header, name_len);
        put_u16(&mut header, 0); // extra field length
        header.extend_from_slice(name.as_bytes());
        self.write_raw(&header).await?;

        let mut hasher = crc32fast::Hasher::new();
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut size: u64 = 0;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            self.write_raw(&buf[..n]).await?;
            size += n as u64;
        }
        let crc32 = hasher.finalize();
        let size32 = u32::try_from(size).map_err(|_| too_large("entry exceeds 4 GiB"))?;

        let mut descriptor = Vec::with_capacity(16);
        put_u32(&mut descriptor, DATA_DESCRIPTOR_SIG);
        put_u32(&mut descriptor, crc32);
        put_u32(&mut descriptor, size32);
        put_u32(&mut descriptor, size32);
        self.write_raw(&descriptor).await?;

        self.entries.push(CentralEntry {
            name: name.to_string(),
            crc32,
            size: size32,
            offset,
        });
        Ok(size)
    }

    /// Flush the underlying stream so a remote reader sees everything so far.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }

    /// Write the central directory, flush, and hand back the underlying stream.
    pub async fn finish(mut self) -> io::Result<W> {
        let cd_offset =
            u32::try_from(self.offset).map_err(|_| too_large("archive exceeds 4 GiB"))?;

        let mut cd = Vec::new();
        for e in &self.entries {
            put_u32(&mut cd, CENTRAL_HEADER_SIG);
            put_u16(&mut cd, VERSION_MADE_BY);
            put_u16(&mut cd, VERSION_NEEDED);
            put_u16(&mut cd, FLAGS);
            put_u16(&mut cd, METHOD_STORED);
            put_u16(&mut cd, self.dos_time);
            put_u16(&mut cd, self.dos_date);
            put_u32(&mut cd, e.crc32);
            put_u32(&mut cd, e.size);
            put_u32(&mut cd, e.size);
            put_u16(&mut cd, e.name.len() as u16);
            put_u16(&mut cd, 0); // extra field length
            put_u16(&mut cd, 0); // comment length
            put_u16(&mut cd, 0); // disk number start
            put_u16(&mut cd, 0); // internal attributes
            put_u32(&mut cd, EXTERNAL_ATTRS);
            put_u32(&mut cd, e.offset);
            cd.extend_from_slice(e.name.as_bytes());
        }
        let cd_size = u32::try_from(cd.len()).map_err(|_| too_large("central directory"))?;
        let count = self.entries.len() as u16;

        put_u32(&mut cd, END_OF_CENTRAL_DIR_SIG);
        put_u16(&mut cd, 0); // this disk
        put_u16(&mut cd, 0); // disk with central directory
        put_u16(&mut cd, count);
        put_u16(&mut cd, count);
        put_u32(&mut cd, cd_size);
        put_u32(&mut cd, cd_offset);
        put_u16(&mut cd, 0); // comment length

        self.write_raw(&cd).await?;
        self.inner.flush().await?;
        Ok(self.inner)
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes).await?;
        self.offset += bytes.len() as u64;
        Ok(())
    }
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn too_large(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("ZIP64 not supported: {what}"),
    )
}

// ── MS-DOS timestamps ────────────────────────────────────────────────────────

/// Convert to the `(time, date)` pair stored in ZIP headers (UTC).
///
/// DOS dates span 1980..=2107; anything outside clamps to the nearest end.
fn dos_datetime(t: DateTime<Utc>) -> (u16, u16) {
    match t.year() {
        ..=1979 => return (0, (1 << 5) | 1),
        2108.. => return ((23 << 11) | (59 << 5) | 29, (127 << 9) | (12 << 5) | 31),
        _ => {}
    }
    let time = (t.hour() << 11) | (t.minute() << 5) | (t.second() / 2);
    let date = (((t.year() - 1980) as u32) << 9) | (t.month() << 5) | t.day();
    (time as u16, date as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use chrono::TimeZone;

    fn read_back(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
        (0..archive.len())
            .map(|i| {
                let mut f = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                f.read_to_end(&mut data).unwrap();
                (f.name().to_string(), data)
            })
            .collect()
    }

    #[tokio::test]
    async fn entries_round_trip_in_write_order() {
        let big: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut zw = ZipStreamWriter::new(Vec::new());
        zw.append("b.pdf", &mut &b"second-first"[..]).await.unwrap();
        zw.append("große.pdf", &mut &big[..]).await.unwrap();
        zw.flush().await.unwrap();
        assert_eq!(zw.entry_count(), 2);

        let out = zw.finish().await.unwrap();
        let entries = read_back(out);
        assert_eq!(entries[0], ("b.pdf".to_string(), b"second-first".to_vec()));
        assert_eq!(entries[1].0, "große.pdf");
        assert_eq!(entries[1].1, big);
    }

    #[tokio::test]
    async fn empty_archive_is_valid() {
        let out = ZipStreamWriter::new(Vec::new()).finish().await.unwrap();
        assert_eq!(out.len(), 22, "EOCD only");
        assert!(read_back(out).is_empty());
    }

    #[tokio::test]
    async fn local_header_starts_the_stream() {
        let mut zw = ZipStreamWriter::new(Vec::new());
        zw.append("x", &mut &b"1"[..]).await.unwrap();
        let out = zw.finish().await.unwrap();
        assert_eq!(&out[..4], &LOCAL_HEADER_SIG.to_le_bytes());
    }

    /// Accepts `limit` bytes, then fails like a closed socket.
    struct BrokenPipe {
        limit: usize,
        written: usize,
    }

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.written >= self.limit {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            let n = buf.len().min(self.limit - self.written);
            self.written += n;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn write_failure_surfaces() {
        let mut zw = ZipStreamWriter::new(BrokenPipe {
            limit: 40,
            written: 0,
        });
        let err = zw
            .append("doc.pdf", &mut &[7u8; 1000][..])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn dos_datetime_encoding() {
        let t = Utc.with_ymd_and_hms(2024, 2, 29, 13, 45, 30).unwrap();
        let (time, date) = dos_datetime(t);
        assert_eq!(time, (13 << 11) | (45 << 5) | 15);
        assert_eq!(date, (44 << 9) | (2 << 5) | 29);
    }

    #[test]
    fn dos_datetime_clamps_out_of_range_years() {
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(dos_datetime(epoch), (0, (1 << 5) | 1));

        let far = Utc.with_ymd_and_hms(2200, 6, 1, 0, 0, 0).unwrap();
        let (_, date) = dos_datetime(far);
        assert_eq!(date >> 9, 127);
    }
}
