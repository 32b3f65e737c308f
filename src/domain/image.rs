// ============================================================
// Layer 3 — ImageArray Domain Type
// ============================================================
// A single image held as raw f32 values, channels-last:
//
//   index(y, x, c) = (y * width + x) * channels + c
//
// Values stay in the 0..255 range straight out of the loader;
// rescaling and normalisation are pipeline decisions, not
// properties of the image itself.

use serde::{Deserialize, Serialize};

/// One image in height x width x channels order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageArray {
    pub height:   usize,
    pub width:    usize,
    pub channels: usize,
    pub data:     Vec<f32>,
}

impl ImageArray {
    /// Wrap an existing buffer. The buffer length must match the dimensions.
    pub fn new(height: usize, width: usize, channels: usize, data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            height * width * channels,
            "buffer of {} values does not fit {}x{}x{}",
            data.len(), height, width, channels
        );
        Self { height, width, channels, data }
    }

    /// An all-zero image.
    pub fn zeros(height: usize, width: usize, channels: usize) -> Self {
        Self::new(height, width, channels, vec![0.0; height * width * channels])
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    #[inline]
    pub fn index(&self, y: usize, x: usize, c: usize) -> usize {
        (y * self.width + x) * self.channels + c
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize, c: usize) -> f32 {
        self.data[self.index(y, x, c)]
    }

    #[inline]
    pub fn set(&mut self, y: usize, x: usize, c: usize, v: f32) {
        let i = self.index(y, x, c);
        self.data[i] = v;
    }

    /// Smallest and largest value in the buffer.
    /// An empty image reports (0, 0).
    pub fn value_range(&self) -> (f32, f32) {
        if self.data.is_empty() {
            return (0.0, 0.0);
        }
        self.data.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
    }

    /// Convert to channels-first order (C x H x W), the layout Burn's
    /// convolutions expect.
    pub fn to_channels_first(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.data.len());
        for c in 0..self.channels {
            for y in 0..self.height {
                for x in 0..self.width {
                    out.push(self.get(y, x, c));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_first_layout() {
        // 1x2 image, 2 channels: pixel0 = (1, 10), pixel1 = (2, 20)
        let img = ImageArray::new(1, 2, 2, vec![1.0, 10.0, 2.0, 20.0]);
        assert_eq!(img.to_channels_first(), vec![1.0, 2.0, 10.0, 20.0]);
    }

    #[test]
    fn test_value_range() {
        let img = ImageArray::new(1, 3, 1, vec![4.0, -1.0, 7.5]);
        assert_eq!(img.value_range(), (-1.0, 7.5));
    }

    #[test]
    #[should_panic]
    fn test_mismatched_buffer_panics() {
        let _ = ImageArray::new(2, 2, 3, vec![0.0; 5]);
    }
}
