// ============================================================
// Layer 4 — Spectrum Datasets
// ============================================================
// Dataset adapters over the pre-processed SDSS bundles.
// All variants load one split fully into memory and are
// read-only afterwards, so Burn's loader workers can call
// get() on the same instance concurrently.
//
//   kind                      file(s)
//   ───────────────────────── ────────────────────────────────────────
//   SdssDr16                  SDSS_DR16_preprocessed_<split>.npz
//   EncodedSpectra            the above + <name>_recons_<split>.npz,
//                             whose `recons` replace the features
//   SdssDr16Simple            DR16_denoised_inpainted_<train|test>.npy,
//                             normalised by its global mean / std
//   SdssDr16SmallLabeled      DR16_<train|test>.npz with labels and z
//
// On disk spectra are (N, length, channels); they are transposed
// to channel-first (N, channels, length) for the 1-D convolutions.
// `mean`, `std` and `SN` are not loaded.

use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use ndarray::{Array1, Array2, Array3, Axis, Ix1, Ix3, IxDyn};

use crate::data::{
    npz::{read_npy, NpzBundle},
    transforms::SampleTransform,
};
use crate::domain::{
    config::{DatasetKind, DatasetParams},
    error::{Error, Result},
    sample::{DatasetItem, SpectrumSample, Split},
};

enum Records {
    Full {
        features: Array3<f32>,
        mask:     Array3<f32>,
        noise:    Array3<f32>,
        labels:   Option<Array2<f32>>,
        z:        Option<Array1<f32>>,
    },
    /// Bare, already-normalised spectra without mask or noise
    Bare { features: Array2<f32> },
}

pub struct SpectrumDataset {
    records:   Records,
    transform: Option<SampleTransform>,
    source:    PathBuf,
}

impl SpectrumDataset {
    /// Open the split of the dataset named in `params`.
    /// `name` is the model whose reconstructions EncodedSpectra reads.
    pub fn open(
        params:    &DatasetParams,
        split:     Split,
        name:      &str,
        transform: Option<SampleTransform>,
    ) -> Result<Self> {
        let root = params.loc.as_path();
        let dataset = match params.dataset {
            DatasetKind::SdssDr16             => Self::sdss_dr16(root, split, transform)?,
            DatasetKind::EncodedSpectra       => Self::encoded_spectra(root, split, name, transform)?,
            DatasetKind::SdssDr16Simple       => Self::sdss_dr16_simple(root, split, transform)?,
            DatasetKind::SdssDr16SmallLabeled => Self::sdss_dr16_small_labeled(root, split, transform)?,
        };
        tracing::info!(
            "Loaded {} {} spectra from '{}'",
            dataset.len(),
            split,
            dataset.source.display()
        );
        Ok(dataset)
    }

    /// De-redshifted and downsampled SDSS-BOSS DR16 spectra.
    pub fn sdss_dr16(root: &Path, split: Split, transform: Option<SampleTransform>) -> Result<Self> {
        let path = root.join(format!("SDSS_DR16_preprocessed_{split}.npz"));
        let mut bundle = NpzBundle::open(&path)?;

        let features = channel_first(bundle.read::<Ix3>("spec")?);
        let mask     = channel_first(bundle.read::<Ix3>("mask")?);
        let noise    = channel_first(bundle.read::<Ix3>("noise")?);
        let z        = bundle.read_optional::<Ix1>("z")?;

        let records = Records::Full { features, mask, noise, labels: None, z };
        check_rows(&records, &path)?;
        Ok(Self { records, transform, source: path })
    }

    /// DR16 masks and noise with features taken from a previous model's
    /// reconstructions, for training a second-stage model.
    pub fn encoded_spectra(
        root:      &Path,
        split:     Split,
        name:      &str,
        transform: Option<SampleTransform>,
    ) -> Result<Self> {
        let path = root.join(format!("SDSS_DR16_preprocessed_{split}.npz"));
        let mut bundle = NpzBundle::open(&path)?;
        let mask  = channel_first(bundle.read::<Ix3>("mask")?);
        let noise = channel_first(bundle.read::<Ix3>("noise")?);
        let z     = bundle.read_optional::<Ix1>("z")?;

        let recons_path = root.join(format!("{name}_recons_{split}.npz"));
        // Reconstructions are written channel-first already.
        let features = NpzBundle::open(&recons_path)?.read::<Ix3>("recons")?;

        if features.dim() != mask.dim() {
            return Err(Error::invalid(format!(
                "reconstructions {:?} in '{}' do not match mask shape {:?}",
                features.dim(),
                recons_path.display(),
                mask.dim()
            )));
        }

        let records = Records::Full { features, mask, noise, labels: None, z };
        check_rows(&records, &path)?;
        Ok(Self { records, transform, source: recons_path })
    }

    /// Denoised, inpainted spectra without mask or noise. The whole
    /// array is normalised with its own mean and standard deviation.
    /// Only train and test files exist; `valid` reads the test file.
    pub fn sdss_dr16_simple(root: &Path, split: Split, transform: Option<SampleTransform>) -> Result<Self> {
        let file = match split {
            Split::Train => "DR16_denoised_inpainted_train.npy",
            _            => "DR16_denoised_inpainted_test.npy",
        };
        let path = root.join(file);
        let raw  = read_npy(&path)?;

        let rows = raw.shape().first().copied().unwrap_or(0);
        let cols = if rows == 0 { 0 } else { raw.len() / rows };
        let flat: Array2<f32> = raw
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((rows, cols))
            .map_err(|e| Error::Decode { path: path.clone(), message: e.to_string() })?;

        let (mean, std) = mean_std(&flat);
        tracing::debug!("'{}': mean={mean:.4e} std={std:.4e}", path.display());
        let features = if std > 0.0 { flat.mapv(|x| (x - mean) / std) } else { flat.mapv(|x| x - mean) };

        Ok(Self { records: Records::Bare { features }, transform, source: path })
    }

    /// Small DR16 sample with noise, masks, inferred labels and redshifts.
    /// Only train and test files exist; `valid` reads the test file.
    pub fn sdss_dr16_small_labeled(root: &Path, split: Split, transform: Option<SampleTransform>) -> Result<Self> {
        let file = match split {
            Split::Train => "DR16_train.npz",
            _            => "DR16_test.npz",
        };
        let path = root.join(file);
        let mut bundle = NpzBundle::open(&path)?;

        let features = channel_first(bundle.read::<Ix3>("spec")?);
        let mask     = channel_first(bundle.read::<Ix3>("mask")?);
        let noise    = channel_first(bundle.read::<Ix3>("noise")?);
        let z        = bundle.read::<Ix1>("z")?;
        let labels   = rows_of(bundle.read::<IxDyn>("new_inf_labels")?, &path)?;

        let records = Records::Full { features, mask, noise, labels: Some(labels), z: Some(z) };
        check_rows(&records, &path)?;
        Ok(Self { records, transform, source: path })
    }

    /// (channels, length) of one item's features
    pub fn item_shape(&self) -> (usize, usize) {
        match &self.records {
            Records::Full { features, .. } => (features.dim().1, features.dim().2),
            Records::Bare { features }     => (1, features.dim().1),
        }
    }

    fn features_row(&self, index: usize) -> Vec<f32> {
        match &self.records {
            Records::Full { features, .. } => features.index_axis(Axis(0), index).iter().copied().collect(),
            Records::Bare { features }     => features.row(index).to_vec(),
        }
    }
}

impl Dataset<DatasetItem> for SpectrumDataset {
    fn get(&self, index: usize) -> Option<DatasetItem> {
        if index >= self.len() {
            return None;
        }
        // The transform only sees the features, and its output replaces
        // the whole item.
        if let Some(t) = &self.transform {
            return Some(DatasetItem::Views(t.apply(&self.features_row(index))));
        }

        let item = match &self.records {
            Records::Full { features, mask, noise, labels, z } => {
                let (_, channels, length) = features.dim();
                let row = |a: &Array3<f32>| -> Vec<f32> {
                    a.index_axis(Axis(0), index).iter().copied().collect()
                };
                DatasetItem::Record(SpectrumSample {
                    features: row(features),
                    mask:     row(mask),
                    noise:    row(noise),
                    labels:   labels.as_ref().map(|l| l.row(index).to_vec()),
                    z:        z.as_ref().map(|z| z[index]),
                    channels,
                    length,
                })
            }
            Records::Bare { features } => DatasetItem::Views(vec![features.row(index).to_vec()]),
        };
        Some(item)
    }

    fn len(&self) -> usize {
        match &self.records {
            Records::Full { features, .. } => features.dim().0,
            Records::Bare { features }     => features.dim().0,
        }
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// (N, length, channels) → (N, channels, length), contiguous.
fn channel_first(a: Array3<f32>) -> Array3<f32> {
    a.permuted_axes([0, 2, 1]).as_standard_layout().into_owned()
}

/// Flatten everything after the first axis.
fn rows_of(a: ndarray::ArrayD<f32>, path: &Path) -> Result<Array2<f32>> {
    let rows = a.shape().first().copied().unwrap_or(0);
    let cols = if rows == 0 { 0 } else { a.len() / rows };
    a.as_standard_layout()
        .into_owned()
        .into_shape_with_order((rows, cols))
        .map_err(|e| Error::Decode { path: path.to_path_buf(), message: e.to_string() })
}

/// Global mean and unbiased standard deviation.
fn mean_std(a: &Array2<f32>) -> (f32, f32) {
    let n = a.len();
    if n == 0 {
        return (0.0, 1.0);
    }
    let mean = a.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
    let var  = if n > 1 {
        a.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    (mean as f32, var.sqrt() as f32)
}

fn check_rows(records: &Records, path: &Path) -> Result<()> {
    let Records::Full { features, mask, noise, labels, z } = records else {
        return Ok(());
    };
    let expected = features.dim().0;
    let mut counts = vec![("mask", mask.dim().0), ("noise", noise.dim().0)];
    if let Some(l) = labels {
        counts.push(("labels", l.dim().0));
    }
    if let Some(z) = z {
        counts.push(("z", z.len()));
    }
    for (name, found) in counts {
        if found != expected {
            return Err(Error::RowCount {
                name: name.to_string(),
                path: path.to_path_buf(),
                expected,
                found,
            });
        }
    }
    if mask.dim() != features.dim() || noise.dim() != features.dim() {
        return Err(Error::invalid(format!(
            "features {:?}, mask {:?} and noise {:?} in '{}' differ in shape",
            features.dim(),
            mask.dim(),
            noise.dim(),
            path.display()
        )));
    }
    Ok(())
}


// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use super::fixtures::write_sdss_split;
    use crate::data::transforms::{SampleTransform, Standardize};
    use ndarray_npy::{NpzWriter, WriteNpyExt};
    use std::{fs::File, sync::Arc};

    fn views(item: Option<DatasetItem>) -> Vec<Vec<f32>> {
        match item {
            Some(DatasetItem::Views(v)) => v,
            other => panic!("expected views, got {other:?}"),
        }
    }

    #[test]
    fn test_sdss_dr16_transposes_to_channel_first() {
        let dir = tempfile::tempdir().unwrap();
        write_sdss_split(dir.path(), "train", 3, 8, 2);

        let ds = SpectrumDataset::sdss_dr16(dir.path(), Split::Train, None).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.item_shape(), (2, 8));

        let Some(DatasetItem::Record(s)) = ds.get(1) else { panic!("expected a record") };
        assert_eq!((s.channels, s.length), (2, 8));
        assert_eq!(s.features.len(), 16);
        assert_eq!(s.mask, vec![1.0; 16]);
        // channel 1, bin 3 of spectrum 1 = sin(2*0.3 + 3*0.2 + 1)
        let expected = (2.0f32 * 0.3 + 3.0 * 0.2 + 1.0).sin();
        assert!((s.features[8 + 3] - expected).abs() < 1e-6);
        assert_eq!(s.z, Some(0.01));
        assert!(s.labels.is_none());
    }

    #[test]
    fn test_every_item_has_the_same_shape() {
        let dir = tempfile::tempdir().unwrap();
        write_sdss_split(dir.path(), "valid", 5, 6, 1);
        let ds = SpectrumDataset::sdss_dr16(dir.path(), Split::Valid, None).unwrap();
        for i in 0..ds.len() {
            let Some(DatasetItem::Record(s)) = ds.get(i) else { panic!() };
            assert_eq!(s.features.len(), s.channels * s.length);
            assert_eq!(s.noise.len(), 6);
        }
        assert!(ds.get(5).is_none());
    }

    #[test]
    fn test_transform_replaces_whole_sample() {
        let dir = tempfile::tempdir().unwrap();
        write_sdss_split(dir.path(), "train", 2, 8, 1);
        let ds = SpectrumDataset::sdss_dr16(
            dir.path(),
            Split::Train,
            Some(SampleTransform::single(Standardize)),
        )
        .unwrap();

        let Some(DatasetItem::Views(views)) = ds.get(0) else { panic!("expected views") };
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].len(), 8);
        let mean: f32 = views[0].iter().sum::<f32>() / 8.0;
        assert!(mean.abs() < 1e-5);
    }

    #[test]
    fn test_contrastive_transform_yields_two_views() {
        let dir = tempfile::tempdir().unwrap();
        write_sdss_split(dir.path(), "train", 2, 8, 1);
        let t  = SampleTransform::contrastive(Arc::new(Standardize), 2);
        let ds = SpectrumDataset::sdss_dr16(dir.path(), Split::Train, Some(t)).unwrap();
        assert_eq!(views(ds.get(1)).len(), 2);
    }

    #[test]
    fn test_missing_split_file_propagates_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SpectrumDataset::sdss_dr16(dir.path(), Split::Test, None).err().unwrap();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[test]
    fn test_encoded_spectra_substitutes_reconstructions() {
        let dir = tempfile::tempdir().unwrap();
        write_sdss_split(dir.path(), "train", 2, 4, 1);
        let recons  = Array3::<f32>::from_elem((2, 1, 4), 7.0);
        let mut npz = NpzWriter::new(File::create(dir.path().join("AE1_recons_train.npz")).unwrap());
        npz.add_array("recons.npy", &recons).unwrap();
        npz.finish().unwrap();

        let ds = SpectrumDataset::encoded_spectra(dir.path(), Split::Train, "AE1", None).unwrap();
        let Some(DatasetItem::Record(s)) = ds.get(0) else { panic!() };
        assert_eq!(s.features, vec![7.0; 4]);
        assert_eq!(s.noise, vec![0.5; 4]);
    }

    #[test]
    fn test_simple_variant_is_normalised() {
        let dir = tempfile::tempdir().unwrap();
        let raw = Array2::<f64>::from_shape_fn((4, 3), |(i, j)| (i * 3 + j) as f64);
        raw.write_npy(File::create(dir.path().join("DR16_denoised_inpainted_test.npy")).unwrap())
            .unwrap();

        // valid falls back to the test file
        let ds = SpectrumDataset::sdss_dr16_simple(dir.path(), Split::Valid, None).unwrap();
        assert_eq!(ds.len(), 4);
        let all: Vec<f32> = (0..4).flat_map(|i| views(ds.get(i))[0].clone()).collect();
        let mean = all.iter().sum::<f32>() / all.len() as f32;
        assert!(mean.abs() < 1e-5);
    }

    #[test]
    fn test_small_labeled_reads_labels_and_z() {
        let dir = tempfile::tempdir().unwrap();
        let spec    = Array3::<f32>::ones((3, 5, 1));
        let labels  = Array2::<f32>::from_elem((3, 2), 4.0);
        let z       = ndarray::Array1::<f32>::from(vec![0.1, 0.2, 0.3]);
        let mut npz = NpzWriter::new(File::create(dir.path().join("DR16_train.npz")).unwrap());
        npz.add_array("spec.npy", &spec).unwrap();
        npz.add_array("mask.npy", &spec).unwrap();
        npz.add_array("noise.npy", &spec).unwrap();
        npz.add_array("new_inf_labels.npy", &labels).unwrap();
        npz.add_array("z.npy", &z).unwrap();
        npz.finish().unwrap();

        let ds = SpectrumDataset::sdss_dr16_small_labeled(dir.path(), Split::Train, None).unwrap();
        let Some(DatasetItem::Record(s)) = ds.get(2) else { panic!() };
        assert_eq!(s.labels, Some(vec![4.0, 4.0]));
        assert_eq!(s.z, Some(0.3));
    }
}
