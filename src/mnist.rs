//! MNIST dataset loader.
//!
//! Reads the four standard IDX files from a directory:
//!
//! - `train-images-idx3-ubyte`, `train-labels-idx1-ubyte` (60000 samples)
//! - `t10k-images-idx3-ubyte`, `t10k-labels-idx1-ubyte` (10000 samples)
//!
//! Each file may instead be stored gzip-compressed with a `.gz` suffix, as distributed.
//! Nothing is downloaded.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::{Error, Result};

pub const IMAGE_ROWS: usize = 28;
pub const IMAGE_COLS: usize = 28;
pub const NUM_CLASSES: usize = 10;
pub const TRAIN_LEN: usize = 60_000;
pub const TEST_LEN: usize = 10_000;

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

/// A stack of grayscale images, `count x rows x cols` bytes in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSet {
    count: usize,
    rows: usize,
    cols: usize,
    pixels: Vec<u8>,
}

impl ImageSet {
    pub fn new(count: usize, rows: usize, cols: usize, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != pixel_count(count, rows, cols)? {
            return Err(Error::InvalidShape(format!(
                "pixels len {} does not match {count} x {rows} x {cols}",
                pixels.len()
            )));
        }
        Ok(Self {
            count,
            rows,
            cols,
            pixels,
        })
    }

    /// `(count, rows, cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.count, self.rows, self.cols)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub fn image(&self, idx: usize) -> &[u8] {
        let size = self.rows * self.cols;
        &self.pixels[idx * size..(idx + 1) * size]
    }
}

/// The train and test splits, with labels as raw class indices.
#[derive(Debug, Clone)]
pub struct Mnist {
    pub train_images: ImageSet,
    pub train_labels: Vec<u8>,
    pub test_images: ImageSet,
    pub test_labels: Vec<u8>,
}

impl Mnist {
    /// Load both splits from `dir`, checking the canonical sizes (60000 / 10000, 28x28).
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let train_images = read_images(&locate(dir, TRAIN_IMAGES)?)?;
        let train_labels = read_labels(&locate(dir, TRAIN_LABELS)?)?;
        let test_images = read_images(&locate(dir, TEST_IMAGES)?)?;
        let test_labels = read_labels(&locate(dir, TEST_LABELS)?)?;

        let mnist = Self {
            train_images,
            train_labels,
            test_images,
            test_labels,
        };
        check_split("train", &mnist.train_images, &mnist.train_labels, TRAIN_LEN)?;
        check_split("test", &mnist.test_images, &mnist.test_labels, TEST_LEN)?;

        info!(
            dir = %dir.display(),
            train = mnist.train_images.len(),
            test = mnist.test_images.len(),
            "mnist loaded"
        );
        Ok(mnist)
    }
}

fn check_split(split: &str, images: &ImageSet, labels: &[u8], expected: usize) -> Result<()> {
    if images.len() != expected || labels.len() != expected {
        return Err(Error::InvalidData(format!(
            "{split} split has {} images and {} labels, expected {expected}",
            images.len(),
            labels.len()
        )));
    }
    if (images.rows, images.cols) != (IMAGE_ROWS, IMAGE_COLS) {
        return Err(Error::InvalidData(format!(
            "{split} images are {}x{}, expected {IMAGE_ROWS}x{IMAGE_COLS}",
            images.rows, images.cols
        )));
    }
    Ok(())
}

/// Path of `name` in `dir`, falling back to `name.gz`.
fn locate(dir: &Path, name: &str) -> Result<PathBuf> {
    let plain = dir.join(name);
    if plain.is_file() {
        return Ok(plain);
    }
    let gz = dir.join(format!("{name}.gz"));
    if gz.is_file() {
        return Ok(gz);
    }
    Err(Error::Io {
        path: plain,
        source: std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "neither the file nor a .gz copy exists",
        ),
    })
}

/// File contents, gunzipped when the path ends in `.gz`.
fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    let raw = fs::read(path).map_err(io_err)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        let mut bytes = Vec::new();
        GzDecoder::new(&raw[..])
            .read_to_end(&mut bytes)
            .map_err(io_err)?;
        debug!(
            path = %path.display(),
            compressed = raw.len(),
            bytes = bytes.len(),
            "gunzipped"
        );
        Ok(bytes)
    } else {
        Ok(raw)
    }
}

/// Parse an IDX3 image file.
pub fn read_images(path: &Path) -> Result<ImageSet> {
    let bytes = read_bytes(path)?;
    parse_images(&bytes).map_err(|e| with_path(e, path))
}

/// Parse an IDX1 label file.
pub fn read_labels(path: &Path) -> Result<Vec<u8>> {
    let bytes = read_bytes(path)?;
    parse_labels(&bytes).map_err(|e| with_path(e, path))
}

fn with_path(err: Error, path: &Path) -> Error {
    match err {
        Error::InvalidData(msg) => Error::InvalidData(format!("{}: {msg}", path.display())),
        other => other,
    }
}

pub(crate) fn parse_images(bytes: &[u8]) -> Result<ImageSet> {
    let mut header = Header::new(bytes);
    header.expect_magic(IMAGES_MAGIC)?;
    let count = header.next_u32()? as usize;
    let rows = header.next_u32()? as usize;
    let cols = header.next_u32()? as usize;

    let body = header.body(pixel_count(count, rows, cols)?)?;
    ImageSet::new(count, rows, cols, body.to_vec())
}

fn pixel_count(count: usize, rows: usize, cols: usize) -> Result<usize> {
    count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .ok_or_else(|| Error::InvalidData("IDX dimensions overflow".to_owned()))
}

pub(crate) fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut header = Header::new(bytes);
    header.expect_magic(LABELS_MAGIC)?;
    let count = header.next_u32()? as usize;

    let labels = header.body(count)?;
    if let Some(pos) = labels.iter().position(|&l| usize::from(l) >= NUM_CLASSES) {
        return Err(Error::InvalidData(format!(
            "label {} at index {pos} is out of range 0..{NUM_CLASSES}",
            labels[pos]
        )));
    }
    Ok(labels.to_vec())
}

/// Cursor over the big-endian IDX header.
struct Header<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Header<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn next_u32(&mut self) -> Result<u32> {
        let end = self.offset + 4;
        let word = self
            .bytes
            .get(self.offset..end)
            .ok_or_else(|| Error::InvalidData("truncated IDX header".to_owned()))?;
        self.offset = end;
        Ok(u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
    }

    fn expect_magic(&mut self, expected: u32) -> Result<()> {
        let magic = self.next_u32()?;
        if magic != expected {
            return Err(Error::InvalidData(format!(
                "bad IDX magic number {magic}, expected {expected}"
            )));
        }
        Ok(())
    }

    /// The remaining bytes, which must be exactly `len` long.
    fn body(&self, len: usize) -> Result<&'a [u8]> {
        let body = &self.bytes[self.offset..];
        if body.len() != len {
            return Err(Error::InvalidData(format!(
                "IDX body is {} bytes, header declares {len}",
                body.len()
            )));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    fn idx_images(count: u32, rows: u32, cols: u32, pixels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for word in [IMAGES_MAGIC, count, rows, cols] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes.extend_from_slice(pixels);
        bytes
    }

    fn idx_labels(labels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        bytes.extend_from_slice(labels);
        bytes
    }

    #[test]
    fn parses_images_and_labels() {
        let images = parse_images(&idx_images(2, 2, 3, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]))
            .unwrap();
        assert_eq!(images.shape(), (2, 2, 3));
        assert_eq!(images.image(1), &[6, 7, 8, 9, 10, 11]);

        let labels = parse_labels(&idx_labels(&[3, 0, 9])).unwrap();
        assert_eq!(labels, vec![3, 0, 9]);
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let mut bytes = idx_labels(&[1, 2]);
        bytes[3] = 0;
        assert!(matches!(parse_labels(&bytes), Err(Error::InvalidData(_))));

        assert!(parse_labels(&LABELS_MAGIC.to_be_bytes()).is_err());

        let short = idx_images(2, 2, 2, &[0; 7]);
        assert!(parse_images(&short).is_err());

        // Images file handed to the label parser.
        assert!(parse_labels(&idx_images(1, 1, 1, &[0])).is_err());
    }

    #[test]
    fn rejects_overflowing_image_dimensions() {
        let header = idx_images(u32::MAX, u32::MAX, u32::MAX, &[]);
        match parse_images(&header) {
            Err(Error::InvalidData(msg)) => assert!(msg.contains("overflow"), "{msg}"),
            other => panic!("expected InvalidData, got {other:?}"),
        }

        assert!(matches!(
            ImageSet::new(usize::MAX, 2, 2, Vec::new()),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_labels() {
        let err = parse_labels(&idx_labels(&[1, 10])).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn reads_plain_and_gzipped_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("plain-labels"), idx_labels(&[4, 5])).unwrap();

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&idx_images(1, 2, 2, &[9, 8, 7, 6])).unwrap();
        fs::write(dir.path().join("imgs.gz"), enc.finish().unwrap()).unwrap();

        let labels = read_labels(&locate(dir.path(), "plain-labels").unwrap()).unwrap();
        assert_eq!(labels, vec![4, 5]);

        let images = read_images(&locate(dir.path(), "imgs").unwrap()).unwrap();
        assert_eq!(images.pixels(), &[9, 8, 7, 6]);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Mnist::load(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn load_rejects_non_canonical_split_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let image = [0_u8; IMAGE_ROWS * IMAGE_COLS];
        for (images, labels) in [(TRAIN_IMAGES, TRAIN_LABELS), (TEST_IMAGES, TEST_LABELS)] {
            fs::write(dir.path().join(images), idx_images(1, 28, 28, &image)).unwrap();
            fs::write(dir.path().join(labels), idx_labels(&[7])).unwrap();
        }
        let err = Mnist::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("expected 60000"), "{err}");
    }
}
