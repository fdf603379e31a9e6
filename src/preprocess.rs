//! Raw MNIST arrays to model-ready tensors.

use crate::mnist::ImageSet;
use crate::{Dataset, Error, Inputs, Result};

/// Flatten `(N, rows, cols)` images into `(N, rows * cols)` rows scaled to `[0, 1]`.
///
/// Applying this to already-scaled data is not detected.
pub fn flatten_normalize(images: &ImageSet) -> Result<Inputs> {
    let (_, rows, cols) = images.shape();
    let values = images
        .pixels()
        .iter()
        .map(|&p| f32::from(p) / 255.0)
        .collect();
    Inputs::from_flat(values, rows * cols)
}

/// One-hot encode class indices into rows of width `classes`.
pub fn to_categorical(labels: &[u8], classes: usize) -> Result<Vec<f32>> {
    if classes == 0 {
        return Err(Error::InvalidConfig("classes must be > 0".to_owned()));
    }

    let mut out = vec![0.0; labels.len() * classes];
    for (row, &label) in out.chunks_exact_mut(classes).zip(labels) {
        let class = usize::from(label);
        if class >= classes {
            return Err(Error::InvalidData(format!(
                "label {label} is out of range 0..{classes}"
            )));
        }
        row[class] = 1.0;
    }
    Ok(out)
}

/// Flattened, scaled images paired with one-hot labels.
pub fn to_dataset(images: &ImageSet, labels: &[u8], classes: usize) -> Result<Dataset> {
    if images.len() != labels.len() {
        return Err(Error::InvalidShape(format!(
            "{} images but {} labels",
            images.len(),
            labels.len()
        )));
    }
    Dataset::new(flatten_normalize(images)?, to_categorical(labels, classes)?, classes)
}
