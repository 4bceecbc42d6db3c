//! Tar archives with optional compression.
//!
//! Cache bundles are plain tar streams wrapped in gzip, bzip2 or xz. The
//! compression of an archive being read is detected from its magic bytes, so
//! a bundle can be unpacked regardless of its file name.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use tar::{Archive, Builder};

use crate::util::fs::ensure_dir;

/// Compression applied to a tar archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    #[default]
    Xz,
}

impl Compression {
    pub const ALL: [Compression; 4] = [
        Compression::Xz,
        Compression::Gzip,
        Compression::Bzip2,
        Compression::None,
    ];

    /// Name used on the command line and in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gz",
            Compression::Bzip2 => "bz2",
            Compression::Xz => "xz",
        }
    }

    /// Archive file extension, e.g. `tar.xz`.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "tar",
            Compression::Gzip => "tar.gz",
            Compression::Bzip2 => "tar.bz2",
            Compression::Xz => "tar.xz",
        }
    }

    /// Archive file name for a cache id, e.g. `abc.tar.xz`.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension())
    }

    /// Detect the compression of a stream from its first bytes.
    pub fn detect(header: &[u8]) -> Compression {
        if header.starts_with(&[0x1f, 0x8b]) {
            Compression::Gzip
        } else if header.starts_with(b"BZh") {
            Compression::Bzip2
        } else if header.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Compression::Xz
        } else {
            Compression::None
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "tar" => Ok(Compression::None),
            "gz" | "gzip" => Ok(Compression::Gzip),
            "bz2" | "bzip2" => Ok(Compression::Bzip2),
            "xz" => Ok(Compression::Xz),
            other => Err(format!(
                "unknown compression `{}` (expected xz, gz, bz2 or none)",
                other
            )),
        }
    }
}

/// Strip a known archive extension from a file name.
pub fn archive_stem(file_name: &str) -> &str {
    for compression in Compression::ALL {
        if let Some(stem) = file_name.strip_suffix(&format!(".{}", compression.extension())) {
            return stem;
        }
    }
    file_name
}

/// One tree or file to put into an archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path on disk.
    pub source: PathBuf,
    /// Name inside the archive.
    pub name: String,
}

impl ArchiveEntry {
    pub fn new(source: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        ArchiveEntry {
            source: source.into(),
            name: name.into(),
        }
    }
}

enum Encoder {
    Plain(BufWriter<File>),
    Gzip(flate2::write::GzEncoder<BufWriter<File>>),
    Bzip2(bzip2::write::BzEncoder<BufWriter<File>>),
    Xz(xz2::write::XzEncoder<BufWriter<File>>),
}

impl Encoder {
    fn new(file: File, compression: Compression) -> Self {
        let writer = BufWriter::new(file);
        match compression {
            Compression::None => Encoder::Plain(writer),
            Compression::Gzip => Encoder::Gzip(flate2::write::GzEncoder::new(
                writer,
                flate2::Compression::default(),
            )),
            Compression::Bzip2 => {
                Encoder::Bzip2(bzip2::write::BzEncoder::new(writer, bzip2::Compression::best()))
            }
            Compression::Xz => Encoder::Xz(xz2::write::XzEncoder::new(writer, 6)),
        }
    }

    /// Write the compression trailer and flush to disk.
    fn finish(self) -> io::Result<()> {
        let mut writer = match self {
            Encoder::Plain(w) => w,
            Encoder::Gzip(e) => e.finish()?,
            Encoder::Bzip2(e) => e.finish()?,
            Encoder::Xz(e) => e.finish()?,
        };
        writer.flush()
    }
}

impl Write for Encoder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Plain(w) => w.write(buf),
            Encoder::Gzip(e) => e.write(buf),
            Encoder::Bzip2(e) => e.write(buf),
            Encoder::Xz(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Plain(w) => w.flush(),
            Encoder::Gzip(e) => e.flush(),
            Encoder::Bzip2(e) => e.flush(),
            Encoder::Xz(e) => e.flush(),
        }
    }
}

/// Write `entries` into a new archive at `archive_path`.
///
/// Directories are added recursively. Symlinks are stored as links, which
/// keeps library symlink chains in a Conan cache intact.
pub fn pack(archive_path: &Path, compression: Compression, entries: &[ArchiveEntry]) -> Result<()> {
    if let Some(parent) = archive_path.parent() {
        ensure_dir(parent)?;
    }

    let file = File::create(archive_path)
        .with_context(|| format!("failed to create archive: {}", archive_path.display()))?;

    let mut builder = Builder::new(Encoder::new(file, compression));
    builder.follow_symlinks(false);

    for entry in entries {
        tracing::debug!("adding {} as `{}`", entry.source.display(), entry.name);
        if entry.source.is_dir() {
            builder
                .append_dir_all(&entry.name, &entry.source)
                .with_context(|| format!("failed to archive {}", entry.source.display()))?;
        } else {
            builder
                .append_path_with_name(&entry.source, &entry.name)
                .with_context(|| format!("failed to archive {}", entry.source.display()))?;
        }
    }

    builder
        .into_inner()
        .and_then(Encoder::finish)
        .with_context(|| format!("failed to finish archive: {}", archive_path.display()))
}

fn decoder(mut file: File) -> Result<Box<dyn Read>> {
    let mut header = [0u8; 6];
    let read = file.read(&mut header)?;
    file.seek(SeekFrom::Start(0))?;

    let reader = BufReader::new(file);
    Ok(match Compression::detect(&header[..read]) {
        Compression::None => Box::new(reader),
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
        Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(reader)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
    })
}

/// Extract an archive into `dest`, detecting its compression.
///
/// Entries whose paths would escape `dest` are skipped.
pub fn unpack(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open archive: {}", archive_path.display()))?;

    ensure_dir(dest)?;

    let mut archive = Archive::new(decoder(file)?);
    archive.set_preserve_permissions(true);

    for entry in archive
        .entries()
        .with_context(|| format!("failed to read archive: {}", archive_path.display()))?
    {
        let mut entry = entry.context("failed to read archive entry")?;
        let unpacked = entry
            .unpack_in(dest)
            .with_context(|| format!("failed to extract into {}", dest.display()))?;
        if !unpacked {
            let path = entry.path().map(|p| p.display().to_string()).unwrap_or_default();
            tracing::warn!("skipping archive entry outside destination: {}", path);
        }
    }

    Ok(())
}

/// Copy a reader to a file, returning the number of bytes written.
pub fn copy_to_file(reader: &mut dyn Read, path: &Path) -> Result<u64> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut file =
        File::create(path).with_context(|| format!("failed to create file: {}", path.display()))?;
    let written = io::copy(reader, &mut file)
        .with_context(|| format!("failed to write file: {}", path.display()))?;
    Ok(written)
}
