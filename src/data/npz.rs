// ============================================================
// Layer 4 — NumPy Bundle Reader
// ============================================================
// Reads the pre-processed spectral bundles written by NumPy.
//
//   .npz  a ZIP archive of named .npy arrays (np.savez):
//           spec  (N, length, channels)
//           mask  (N, length, channels)
//           noise (N, length, channels)
//           z, new_inf_labels, mean, std, SN ... (optional)
//   .npy  a single array (bare spectra)
//
// Arrays may be stored as float32 or float64; everything is
// returned as f32. A missing file surfaces as the std::io error
// from File::open, unchanged.
//
// write_npz produces the single-array archives the bulk
// reconstruction step hands to the next model.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use ndarray::{ArrayD, Dimension, Array};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpyExt};

use crate::domain::error::{Error, Result};

/// An open .npz archive.
pub struct NpzBundle {
    path:   PathBuf,
    reader: NpzReader<BufReader<File>>,
    names:  Vec<String>,
}

impl NpzBundle {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        let mut reader = NpzReader::new(BufReader::new(file))
            .map_err(|e| decode_error(&path, e))?;
        let names = reader.names().map_err(|e| decode_error(&path, e))?;

        tracing::debug!("Opened '{}' with arrays {:?}", path.display(), names);
        Ok(Self { path, reader, names })
    }

    /// True if the archive holds `name` (with or without `.npy`).
    pub fn contains(&self, name: &str) -> bool {
        self.entry_name(name).is_some()
    }

    /// Read `name` as an f32 array of dimension `D`.
    pub fn read<D: Dimension>(&mut self, name: &str) -> Result<Array<f32, D>> {
        let entry = self.entry_name(name).ok_or_else(|| Error::MissingArray {
            name: name.to_string(),
            path: self.path.clone(),
        })?;

        match self.reader.by_name::<ndarray::OwnedRepr<f32>, D>(&entry) {
            Ok(array) => Ok(array),
            Err(first) => self
                .reader
                .by_name::<ndarray::OwnedRepr<f64>, D>(&entry)
                .map(|a| a.mapv(|v| v as f32))
                .map_err(|_| decode_error(&self.path, first)),
        }
    }

    pub fn read_optional<D: Dimension>(&mut self, name: &str) -> Result<Option<Array<f32, D>>> {
        if self.contains(name) {
            self.read(name).map(Some)
        } else {
            Ok(None)
        }
    }

    fn entry_name(&self, name: &str) -> Option<String> {
        let with_ext = format!("{name}.npy");
        self.names
            .iter()
            .find(|n| **n == with_ext || **n == name)
            .cloned()
    }
}

/// Read a standalone .npy file as an f32 array of any dimension.
pub fn read_npy(path: impl AsRef<Path>) -> Result<ArrayD<f32>> {
    let path = path.as_ref();

    let first = match ArrayD::<f32>::read_npy(File::open(path)?) {
        Ok(array) => return Ok(array),
        Err(e)    => e,
    };
    ArrayD::<f64>::read_npy(File::open(path)?)
        .map(|a| a.mapv(|v| v as f32))
        .map_err(|_| decode_error(path, first))
}

/// Write `array` as the single entry `name` of a new .npz archive.
pub fn write_npz<D: Dimension>(path: impl AsRef<Path>, name: &str, array: &Array<f32, D>) -> Result<()> {
    let path    = path.as_ref();
    let encode  = |e: ndarray_npy::WriteNpzError| Error::Encode {
        path:    path.to_path_buf(),
        message: e.to_string(),
    };
    let mut npz = NpzWriter::new(File::create(path)?);
    npz.add_array(format!("{name}.npy"), array).map_err(encode)?;
    npz.finish().map_err(encode)?;
    Ok(())
}

fn decode_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Decode { path: path.to_path_buf(), message: err.to_string() }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array3, Ix1, Ix3};
    use ndarray_npy::WriteNpyExt;

    #[test]
    fn test_reads_f32_and_f64_arrays() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.npz");

        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("spec.npy", &Array3::<f64>::from_elem((2, 3, 1), 1.5)).unwrap();
        npz.add_array("z.npy", &Array1::<f32>::from(vec![0.1, 0.2])).unwrap();
        npz.finish().unwrap();

        let mut bundle = NpzBundle::open(&path).unwrap();
        let spec: Array3<f32> = bundle.read::<Ix3>("spec").unwrap();
        assert_eq!(spec.dim(), (2, 3, 1));
        assert_eq!(spec[[1, 2, 0]], 1.5);

        let z = bundle.read_optional::<Ix1>("z").unwrap().unwrap();
        assert_eq!(z.len(), 2);
        assert!(bundle.read_optional::<Ix1>("labels").unwrap().is_none());
    }

    #[test]
    fn test_missing_array_is_reported() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.npz");
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("mask.npy", &Array1::<f32>::zeros(3)).unwrap();
        npz.finish().unwrap();

        let mut bundle = NpzBundle::open(&path).unwrap();
        let err = bundle.read::<Ix3>("spec").unwrap_err();
        assert!(matches!(err, Error::MissingArray { .. }));
    }

    #[test]
    fn test_missing_file_is_io_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = NpzBundle::open(dir.path().join("nope.npz")).err().unwrap();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[test]
    fn test_written_archive_reads_back() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("AE_recons_test.npz");
        write_npz(&path, "recons", &Array3::<f32>::from_elem((3, 1, 4), 0.25)).unwrap();

        let mut bundle = NpzBundle::open(&path).unwrap();
        let recons = bundle.read::<Ix3>("recons").unwrap();
        assert_eq!(recons.dim(), (3, 1, 4));
        assert_eq!(recons[[2, 0, 3]], 0.25);
    }

    #[test]
    fn test_reads_bare_npy() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.npy");
        let arr  = ndarray::Array2::<f64>::from_elem((4, 5), 2.0);
        arr.write_npy(File::create(&path).unwrap()).unwrap();

        let read = read_npy(&path).unwrap();
        assert_eq!(read.shape(), &[4, 5]);
    }
}
