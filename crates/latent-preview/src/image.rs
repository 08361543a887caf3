//! Preview images and resampling

/// RGBA8 image, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
    /// RGBA pixel data
    pub pixels: Vec<u8>,
}

impl PreviewImage {
    /// Create from raw RGBA pixels
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Zeroed (transparent black) image
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(vec![0u8; (width as usize) * (height as usize) * 4], width, height)
    }

    /// Single-color image
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = (width as usize) * (height as usize);
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&rgba);
        }
        Self::new(pixels, width, height)
    }

    /// Size as (width, height)
    pub fn dims(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + x as usize) * 4
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = self.offset(x, y);
        self.pixels
            .get(idx..idx + 4)
            .map(|p| [p[0], p[1], p[2], p[3]])
    }

    /// Set pixel at (x, y); out-of-bounds writes are ignored
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = self.offset(x, y);
        if let Some(dst) = self.pixels.get_mut(idx..idx + 4) {
            dst.copy_from_slice(&rgba);
        }
    }

    /// Copy `src` into this image with its top-left corner at (x, y), clipping at the edges
    pub fn blit(&mut self, src: &PreviewImage, x: u32, y: u32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let copy_w = src.width.min(self.width - x) as usize;
        let copy_h = src.height.min(self.height - y);
        for row in 0..copy_h {
            let s = src.offset(0, row);
            let d = self.offset(x, y + row);
            let len = copy_w * 4;
            if s + len <= src.pixels.len() && d + len <= self.pixels.len() {
                self.pixels[d..d + len].copy_from_slice(&src.pixels[s..s + len]);
            }
        }
    }

    /// Bilinear resize to the target size
    pub fn resize(&self, target_width: u32, target_height: u32) -> PreviewImage {
        if self.dims() == (target_width, target_height) {
            return self.clone();
        }
        let stride = self.width as usize * 4;
        // Empty or truncated sources have nothing to sample
        if stride == 0 || self.height == 0 || self.pixels.len() < stride * self.height as usize {
            return PreviewImage::blank(target_width, target_height);
        }

        let columns = resample_axis(self.width, target_width);
        let rows = resample_axis(self.height, target_height);

        let mut pixels = Vec::with_capacity(columns.len() * rows.len() * 4);
        for row in &rows {
            let upper = &self.pixels[row.near * stride..(row.near + 1) * stride];
            let lower = &self.pixels[row.far * stride..(row.far + 1) * stride];
            for col in &columns {
                let (a, b) = (col.near * 4, col.far * 4);
                for c in 0..4 {
                    let top = lerp(upper[a + c], upper[b + c], col.weight);
                    let bottom = lerp(lower[a + c], lower[b + c], col.weight);
                    let value = top + (bottom - top) * row.weight;
                    pixels.push(value.round().clamp(0.0, 255.0) as u8);
                }
            }
        }

        PreviewImage::new(pixels, target_width, target_height)
    }
}

/// Source neighbours and blend weight for one output index
struct Tap {
    near: usize,
    far: usize,
    weight: f32,
}

/// Center-aligned sampling taps mapping `dst` outputs onto `src` inputs
fn resample_axis(src: u32, dst: u32) -> Vec<Tap> {
    let scale = src as f32 / dst as f32;
    let last = src as usize - 1;
    (0..dst)
        .map(|i| {
            let pos = ((i as f32 + 0.5) * scale - 0.5).max(0.0);
            let near = (pos as usize).min(last);
            Tap {
                near,
                far: (near + 1).min(last),
                weight: pos - pos.floor(),
            }
        })
        .collect()
}

fn lerp(a: u8, b: u8, t: f32) -> f32 {
    a as f32 + (b as f32 - a as f32) * t
}

/// Largest size with the aspect ratio of `src` that fits inside `bound`.
///
/// Never upscales; both sides are at least one pixel.
pub fn fit_within(src: (u32, u32), bound: (u32, u32)) -> (u32, u32) {
    let (w, h) = (src.0.max(1), src.1.max(1));
    let scale = (bound.0 as f64 / w as f64)
        .min(bound.1 as f64 / h as f64)
        .min(1.0);
    let fw = ((w as f64 * scale).round() as u32).clamp(1, bound.0.max(1));
    let fh = ((h as f64 * scale).round() as u32).clamp(1, bound.1.max(1));
    (fw, fh)
}
