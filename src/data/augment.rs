// ============================================================
// Layer 4 — Training-time Augmentation
// ============================================================
// The standard CIFAR recipe, applied to raw CHW bytes before
// normalisation:
//
//   1. Random crop: pad the image with `padding` black pixels
//      on every side, then cut a window of the original size
//      at a random offset.
//   2. Random horizontal flip with probability 0.5.
//
// Only the training split is augmented; validation images are
// used as-is.
//
// Reference: He et al. (2016) Deep Residual Learning, §4.2

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Augmenter {
    padding: usize,
    flip:    bool,
}

impl Augmenter {
    pub fn new(padding: usize, flip: bool) -> Self {
        Self { padding, flip }
    }

    /// Pad-4 random crop plus horizontal flip.
    pub fn standard() -> Self {
        Self::new(4, true)
    }

    /// Return an augmented copy of a square CHW image.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        pixels:   &[u8],
        channels: usize,
        size:     usize,
        rng:      &mut R,
    ) -> Vec<u8> {
        let pad = self.padding as isize;
        let dy  = rng.gen_range(-pad..=pad);
        let dx  = rng.gen_range(-pad..=pad);
        let flip = self.flip && rng.gen_bool(0.5);

        let side  = size as isize;
        let plane = size * size;
        let mut out = vec![0u8; pixels.len()];

        for c in 0..channels {
            for y in 0..size {
                let src_y = y as isize + dy;
                if src_y < 0 || src_y >= side {
                    continue;
                }
                for x in 0..size {
                    let col   = if flip { size - 1 - x } else { x };
                    let src_x = col as isize + dx;
                    if src_x < 0 || src_x >= side {
                        continue;
                    }
                    let src = c * plane + src_y as usize * size + src_x as usize;
                    out[c * plane + y * size + x] = pixels[src];
                }
            }
        }

        out
    }
}
