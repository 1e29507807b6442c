// ============================================================
// Layer 4 — Spectrum Batcher
// ============================================================
// Implements Burn's Batcher trait to stack dataset items into
// tensors on the target device.
//
//   Record items  → SpectrumBatch::Record
//                     features, mask, noise  [batch, channels, length]
//                     labels                 [batch, n_labels]  (optional)
//                     z                      [batch]            (optional)
//
//   View items    → SpectrumBatch::Views
//                     one [batch, length] tensor per view; view k of
//                     every item lands in the k-th tensor
//
// A dataset never mixes the two item kinds.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::domain::sample::{DatasetItem, SpectrumSample};

// ─── SpectrumBatch ────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub enum SpectrumBatch<B: Backend> {
    Record {
        features: Tensor<B, 3>,
        mask:     Tensor<B, 3>,
        noise:    Tensor<B, 3>,
        labels:   Option<Tensor<B, 2>>,
        z:        Option<Tensor<B, 1>>,
    },
    Views(Vec<Tensor<B, 2>>),
}

// ─── SpectrumBatcher ──────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct SpectrumBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> SpectrumBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn records(&self, items: Vec<SpectrumSample>) -> SpectrumBatch<B> {
        let batch_size = items.len();
        let channels   = items[0].channels;
        let length     = items[0].length;
        let shape      = [batch_size, channels, length];

        let stack = |pick: fn(&SpectrumSample) -> &Vec<f32>| -> Tensor<B, 3> {
            let flat: Vec<f32> = items.iter().flat_map(|s| pick(s).iter().copied()).collect();
            Tensor::from_data(TensorData::new(flat, shape), &self.device)
        };
        let features = stack(|s| &s.features);
        let mask     = stack(|s| &s.mask);
        let noise    = stack(|s| &s.noise);

        // Optional keys are present for all items of a dataset or none.
        let labels = items
            .iter()
            .map(|s| s.labels.as_ref())
            .collect::<Option<Vec<_>>>()
            .map(|rows| {
                let width = rows[0].len();
                let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
                Tensor::from_data(TensorData::new(flat, [batch_size, width]), &self.device)
            });
        let z = items
            .iter()
            .map(|s| s.z)
            .collect::<Option<Vec<f32>>>()
            .map(|z| Tensor::from_data(TensorData::new(z, [batch_size]), &self.device));

        SpectrumBatch::Record { features, mask, noise, labels, z }
    }

    fn views(&self, items: Vec<Vec<Vec<f32>>>) -> SpectrumBatch<B> {
        let batch_size = items.len();
        let n_views    = items[0].len();
        let length     = items[0][0].len();

        let views = (0..n_views)
            .map(|k| {
                let flat: Vec<f32> = items.iter().flat_map(|v| v[k].iter().copied()).collect();
                Tensor::from_data(TensorData::new(flat, [batch_size, length]), &self.device)
            })
            .collect();
        SpectrumBatch::Views(views)
    }
}

impl<B: Backend> Batcher<DatasetItem, SpectrumBatch<B>> for SpectrumBatcher<B> {
    fn batch(&self, items: Vec<DatasetItem>) -> SpectrumBatch<B> {
        match items.first() {
            Some(DatasetItem::Record(_)) => self.records(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        DatasetItem::Record(s) => Some(s),
                        DatasetItem::Views(_)  => None,
                    })
                    .collect(),
            ),
            _ => self.views(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        DatasetItem::Views(v)  => Some(v),
                        DatasetItem::Record(_) => None,
                    })
                    .collect(),
            ),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn sample(v: f32, z: Option<f32>) -> DatasetItem {
        DatasetItem::Record(SpectrumSample {
            features: vec![v; 6],
            mask:     vec![1.0; 6],
            noise:    vec![0.1; 6],
            labels:   None,
            z,
            channels: 2,
            length:   3,
        })
    }

    #[test]
    fn test_records_stack_channel_first() {
        let batcher = SpectrumBatcher::<TestBackend>::new(Default::default());
        let batch   = batcher.batch(vec![sample(1.0, Some(0.5)), sample(2.0, Some(0.7))]);

        let SpectrumBatch::Record { features, labels, z, .. } = batch else { panic!() };
        assert_eq!(features.dims(), [2, 2, 3]);
        assert!(labels.is_none());
        let z = z.unwrap().into_data().to_vec::<f32>().unwrap();
        assert_eq!(z, vec![0.5, 0.7]);
        let f = features.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&f[6..], &[2.0; 6]);
    }

    #[test]
    fn test_missing_optional_key_drops_it() {
        let batcher = SpectrumBatcher::<TestBackend>::new(Default::default());
        let batch   = batcher.batch(vec![sample(1.0, Some(0.5)), sample(2.0, None)]);
        let SpectrumBatch::Record { z, .. } = batch else { panic!() };
        assert!(z.is_none());
    }

    #[test]
    fn test_views_are_grouped_by_view_index() {
        let batcher = SpectrumBatcher::<TestBackend>::new(Default::default());
        let items = vec![
            DatasetItem::Views(vec![vec![1.0; 4], vec![2.0; 4]]),
            DatasetItem::Views(vec![vec![3.0; 4], vec![4.0; 4]]),
            DatasetItem::Views(vec![vec![5.0; 4], vec![6.0; 4]]),
        ];
        let batch = batcher.batch(items);
        let SpectrumBatch::Views(views) = batch else { panic!() };
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].dims()[0], 3);
        assert_eq!(views[1].dims(), [3, 4]);
        let second = views[1].clone().into_data().to_vec::<f32>().unwrap();
        assert_eq!(second[0], 2.0);
        assert_eq!(second[8], 6.0);
    }
}
