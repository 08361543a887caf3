//! Latent tensors handed over by the sampler

use crate::{PreviewError, Result};

/// One batch item's latent, channel-major (C, H, W)
#[derive(Debug, Clone, PartialEq)]
pub struct Latent {
    channels: usize,
    height: u32,
    width: u32,
    data: Vec<f32>,
}

impl Latent {
    /// Wrap raw latent values
    pub fn new(channels: usize, height: u32, width: u32, data: Vec<f32>) -> Result<Self> {
        let expected = element_count(channels, height, width)?;
        if channels == 0 || height == 0 || width == 0 {
            return Err(PreviewError::Decode(format!(
                "empty latent shape {channels}x{height}x{width}"
            )));
        }
        if data.len() != expected {
            return Err(PreviewError::Decode(format!(
                "latent {channels}x{height}x{width} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self {
            channels,
            height,
            width,
            data,
        })
    }

    /// Latent filled with a constant; zero dimensions are raised to one
    pub fn filled(channels: usize, height: u32, width: u32, value: f32) -> Self {
        let (channels, height, width) = (channels.max(1), height.max(1), width.max(1));
        Self {
            channels,
            height,
            width,
            data: vec![value; channels * height as usize * width as usize],
        }
    }

    /// Channel count
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Spatial size as (width, height)
    pub fn dims(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw values
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Value of channel `c` at (x, y)
    pub fn at(&self, c: usize, x: u32, y: u32) -> f32 {
        let plane = self.height as usize * self.width as usize;
        self.data[c * plane + y as usize * self.width as usize + x as usize]
    }
}

/// Latents for a whole generation batch, all of one shape
#[derive(Debug, Clone, Default)]
pub struct LatentBatch {
    items: Vec<Latent>,
}

impl LatentBatch {
    /// Build from per-item latents
    pub fn from_items(items: Vec<Latent>) -> Result<Self> {
        if let Some(first) = items.first() {
            let shape = (first.channels, first.dims());
            if let Some(bad) = items.iter().position(|l| (l.channels, l.dims()) != shape) {
                return Err(PreviewError::Decode(format!(
                    "batch item {bad} shape differs from item 0"
                )));
            }
        }
        Ok(Self { items })
    }

    /// Split a flat (N, C, H, W) buffer into items
    pub fn from_flat(
        batch: usize,
        channels: usize,
        height: u32,
        width: u32,
        data: Vec<f32>,
    ) -> Result<Self> {
        let per_item = element_count(channels, height, width)?;
        if batch > 0 && per_item == 0 {
            return Err(PreviewError::Decode(format!(
                "empty latent shape {channels}x{height}x{width}"
            )));
        }
        let expected = per_item.checked_mul(batch).ok_or_else(|| {
            PreviewError::Decode(format!(
                "batch of {batch} latents of {channels}x{height}x{width} is too large"
            ))
        })?;
        if data.len() != expected {
            return Err(PreviewError::Decode(format!(
                "batch of {batch} latents needs {expected} values, got {}",
                data.len()
            )));
        }
        let items = data
            .chunks(per_item.max(1))
            .take(batch)
            .map(|chunk| Latent::new(channels, height, width, chunk.to_vec()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }

    /// Batch size
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item at `index`
    pub fn get(&self, index: usize) -> Option<&Latent> {
        self.items.get(index)
    }

    /// Spatial size shared by all items
    pub fn dims(&self) -> Option<(u32, u32)> {
        self.items.first().map(Latent::dims)
    }
}

/// Number of values in a (C, H, W) latent
fn element_count(channels: usize, height: u32, width: u32) -> Result<usize> {
    channels
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(width as usize))
        .ok_or_else(|| {
            PreviewError::Decode(format!("latent shape {channels}x{height}x{width} is too large"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latent_shape_checked() {
        assert!(Latent::new(4, 8, 8, vec![0.0; 256]).is_ok());
        assert!(Latent::new(4, 8, 8, vec![0.0; 255]).is_err());
        assert!(Latent::new(0, 8, 8, vec![]).is_err());
    }

    #[test]
    fn test_oversized_shape_rejected() {
        let err = Latent::new(usize::MAX, u32::MAX, u32::MAX, vec![]).unwrap_err();
        assert!(matches!(err, PreviewError::Decode(_)));

        assert!(LatentBatch::from_flat(1, usize::MAX, 2, 2, vec![]).is_err());
        assert!(LatentBatch::from_flat(usize::MAX, 4, 64, 64, vec![0.0; 16]).is_err());
    }

    #[test]
    fn test_latent_indexing() {
        let data: Vec<f32> = (0..2 * 2 * 3).map(|i| i as f32).collect();
        let latent = Latent::new(2, 2, 3, data).unwrap();
        assert_eq!(latent.dims(), (3, 2));
        assert_eq!(latent.at(0, 0, 0), 0.0);
        assert_eq!(latent.at(0, 2, 1), 5.0);
        assert_eq!(latent.at(1, 1, 0), 7.0);
    }

    #[test]
    fn test_from_flat() {
        let batch = LatentBatch::from_flat(3, 4, 2, 2, vec![0.5; 3 * 16]).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.dims(), Some((2, 2)));
        assert!(batch.get(2).is_some());
        assert!(batch.get(3).is_none());

        assert!(LatentBatch::from_flat(3, 4, 2, 2, vec![0.5; 40]).is_err());
    }

    #[test]
    fn test_mixed_shapes_rejected() {
        let items = vec![Latent::filled(4, 8, 8, 0.0), Latent::filled(4, 8, 16, 0.0)];
        assert!(LatentBatch::from_items(items).is_err());
    }

    #[test]
    fn test_empty_batch() {
        let batch = LatentBatch::from_items(vec![]).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.dims(), None);
    }
}
