//! Canvas geometry and layer blending.
//!
//! Layers are blended with straight-alpha source-over ([`over`]) at the
//! origin, strictly in the order they are added. An opaque destination stays
//! opaque whatever is blended over it. Multi-frame layers are first laid out as one horizontal strip
//! ([`concat_frames`]).
//!
//! The canvas follows a [`CanvasStrategy`]:
//!
//! | Strategy | Initial canvas | Layer of a different size |
//! |---|---|---|
//! | `Fixed` | transparent `width`×`height` | clipped / left uncovered |
//! | `Adaptive` | empty 0×0 | canvas reallocated to the layer's size |
//!
//! Adaptive reallocation throws away whatever was composited before, so a
//! sheet only comes out right when every layer agrees on one size. The
//! [`Placement`] returned for each layer tells the caller when that happened.

use super::backend::Dimensions;
use super::calculations::{STANDARD_SHEET, frame_offsets, strip_dimensions};
use image::{Rgba, RgbaImage, imageops};
use serde::{Deserialize, Serialize};

/// How the output canvas is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CanvasStrategy {
    /// Constant canvas known up front.
    Fixed { width: u32, height: u32 },
    /// Canvas takes the size of the layers as they arrive.
    Adaptive,
}

impl CanvasStrategy {
    /// Fixed canvas of the standard 13×21 grid of 64px cells.
    pub const fn standard() -> Self {
        CanvasStrategy::Fixed {
            width: STANDARD_SHEET.width,
            height: STANDARD_SHEET.height,
        }
    }

    fn blank_canvas(self) -> RgbaImage {
        match self {
            CanvasStrategy::Fixed { width, height } => RgbaImage::new(width, height),
            CanvasStrategy::Adaptive => RgbaImage::new(0, 0),
        }
    }
}

impl Default for CanvasStrategy {
    fn default() -> Self {
        Self::standard()
    }
}

/// What happened to the canvas when a layer was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Layer matched the canvas.
    Exact,
    /// Fixed canvas and a layer of another size: blended with clipping.
    Clipped { canvas: Dimensions, layer: Dimensions },
    /// Adaptive canvas resized to the layer; `discarded` earlier layers were lost.
    Reallocated {
        from: Dimensions,
        to: Dimensions,
        discarded: usize,
    },
}

/// Lay frames out left to right at cumulative x offsets, top-aligned.
///
/// Returns `None` for an empty list. A single frame is returned as is.
pub fn concat_frames(mut frames: Vec<RgbaImage>) -> Option<RgbaImage> {
    if frames.len() <= 1 {
        return frames.pop();
    }

    let sizes: Vec<Dimensions> = frames.iter().map(Dimensions::of).collect();
    let strip_size = strip_dimensions(&sizes);
    let mut strip = RgbaImage::new(strip_size.width, strip_size.height);
    for (frame, x) in frames.iter().zip(frame_offsets(&sizes)) {
        imageops::replace(&mut strip, frame, i64::from(x), 0);
    }
    Some(strip)
}

/// Straight-alpha source-over of one pixel, rounded to the nearest channel value.
///
/// `out_a = sa + da·(1 − sa)`, and each colour channel is the alpha-weighted
/// mean of source and destination. A fully transparent result is `[0, 0, 0, 0]`.
pub fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3];
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }

    // destination alpha left showing through the source
    let da = mul_div255(u16::from(dst[3]), 255 - u16::from(sa));
    let out_a = u32::from(sa) + u32::from(da);
    if out_a == 0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let weighted = u32::from(src[i]) * u32::from(sa) + u32::from(dst[i]) * u32::from(da);
        out[i] = ((weighted + out_a / 2) / out_a).min(255) as u8;
    }
    out[3] = out_a.min(255) as u8;
    Rgba(out)
}

fn mul_div255(x: u16, y: u16) -> u8 {
    ((u32::from(x) * u32::from(y) + 127) / 255) as u8
}

/// Source-over `src` onto `dst` at the origin, clipped to their overlap.
pub fn composite_over(dst: &mut RgbaImage, src: &RgbaImage) {
    let width = dst.width().min(src.width());
    let height = dst.height().min(src.height());
    for y in 0..height {
        for x in 0..width {
            let blended = over(*dst.get_pixel(x, y), *src.get_pixel(x, y));
            dst.put_pixel(x, y, blended);
        }
    }
}

/// Running composite for one output image.
pub struct Compositor {
    strategy: CanvasStrategy,
    canvas: RgbaImage,
    applied: usize,
}

impl Compositor {
    pub fn new(strategy: CanvasStrategy) -> Self {
        Self {
            strategy,
            canvas: strategy.blank_canvas(),
            applied: 0,
        }
    }

    /// Blend `layer` over the canvas.
    pub fn add_layer(&mut self, layer: &RgbaImage) -> Placement {
        let canvas_size = Dimensions::of(&self.canvas);
        let layer_size = Dimensions::of(layer);

        let placement = if canvas_size == layer_size {
            Placement::Exact
        } else {
            match self.strategy {
                CanvasStrategy::Fixed { .. } => Placement::Clipped {
                    canvas: canvas_size,
                    layer: layer_size,
                },
                CanvasStrategy::Adaptive => {
                    self.canvas = RgbaImage::new(layer_size.width, layer_size.height);
                    Placement::Reallocated {
                        from: canvas_size,
                        to: layer_size,
                        discarded: self.applied,
                    }
                }
            }
        };

        composite_over(&mut self.canvas, layer);
        self.applied += 1;
        placement
    }

    pub fn layers_applied(&self) -> usize {
        self.applied
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.canvas)
    }

    pub fn finish(self) -> RgbaImage {
        self.canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    fn solid(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
        RgbaImage::from_pixel(width, height, color)
    }

    #[test]
    fn concat_places_frames_at_cumulative_offsets() {
        let strip = concat_frames(vec![solid(2, 2, RED), solid(3, 1, BLUE)]).unwrap();

        assert_eq!(strip.dimensions(), (5, 2));
        assert_eq!(*strip.get_pixel(1, 1), RED);
        assert_eq!(*strip.get_pixel(2, 0), BLUE);
        assert_eq!(*strip.get_pixel(4, 0), BLUE);
        // shorter frame leaves the rest of its column transparent
        assert_eq!(*strip.get_pixel(4, 1), CLEAR);
    }

    #[test]
    fn concat_of_nothing_is_none() {
        assert!(concat_frames(Vec::new()).is_none());
    }

    #[test]
    fn concat_of_one_frame_is_identity() {
        let frame = solid(3, 3, RED);
        assert_eq!(concat_frames(vec![frame.clone()]).unwrap(), frame);
    }

    #[test]
    fn fixed_canvas_starts_transparent_at_standard_size() {
        let compositor = Compositor::new(CanvasStrategy::default());
        assert_eq!(compositor.dimensions(), Dimensions::new(832, 1344));
        let canvas = compositor.finish();
        assert!(canvas.pixels().all(|p| *p == CLEAR));
    }

    #[test]
    fn fixed_canvas_clips_mismatched_layers() {
        let mut compositor = Compositor::new(CanvasStrategy::Fixed {
            width: 4,
            height: 4,
        });
        let placement = compositor.add_layer(&solid(2, 6, RED));
        assert_eq!(
            placement,
            Placement::Clipped {
                canvas: Dimensions::new(4, 4),
                layer: Dimensions::new(2, 6),
            }
        );

        let canvas = compositor.finish();
        assert_eq!(canvas.dimensions(), (4, 4));
        assert_eq!(*canvas.get_pixel(1, 3), RED);
        assert_eq!(*canvas.get_pixel(3, 0), CLEAR);
    }

    #[test]
    fn adaptive_canvas_adopts_first_layer_size() {
        let mut compositor = Compositor::new(CanvasStrategy::Adaptive);
        assert_eq!(compositor.dimensions(), Dimensions::new(0, 0));

        let placement = compositor.add_layer(&solid(6, 2, RED));
        assert_eq!(
            placement,
            Placement::Reallocated {
                from: Dimensions::new(0, 0),
                to: Dimensions::new(6, 2),
                discarded: 0,
            }
        );
        assert_eq!(compositor.add_layer(&solid(6, 2, BLUE)), Placement::Exact);
        assert_eq!(compositor.layers_applied(), 2);
        assert_eq!(compositor.dimensions(), Dimensions::new(6, 2));
    }

    #[test]
    fn adaptive_reallocation_discards_earlier_layers() {
        let mut compositor = Compositor::new(CanvasStrategy::Adaptive);
        compositor.add_layer(&solid(2, 2, RED));
        let mut half = RgbaImage::new(3, 3);
        half.put_pixel(0, 0, BLUE);

        let placement = compositor.add_layer(&half);
        assert!(matches!(placement, Placement::Reallocated { discarded: 1, .. }));

        let canvas = compositor.finish();
        assert_eq!(canvas.dimensions(), (3, 3));
        assert_eq!(*canvas.get_pixel(0, 0), BLUE);
        assert_eq!(*canvas.get_pixel(1, 1), CLEAR);
    }

    #[test]
    fn opaque_layer_replaces_and_clear_layer_is_noop() {
        let mut compositor = Compositor::new(CanvasStrategy::Fixed {
            width: 2,
            height: 2,
        });
        compositor.add_layer(&solid(2, 2, RED));
        compositor.add_layer(&solid(2, 2, CLEAR));
        assert!(compositor.finish().pixels().all(|p| *p == RED));

        let mut compositor = Compositor::new(CanvasStrategy::Fixed {
            width: 2,
            height: 2,
        });
        compositor.add_layer(&solid(2, 2, RED));
        compositor.add_layer(&solid(2, 2, BLUE));
        assert!(compositor.finish().pixels().all(|p| *p == BLUE));
    }

    #[test]
    fn compositor_matches_sequential_composite_over() {
        let a = solid(3, 3, Rgba([255, 0, 0, 128]));
        let mut b = RgbaImage::new(3, 3);
        b.put_pixel(1, 1, Rgba([0, 255, 0, 200]));
        let c = solid(3, 3, Rgba([0, 0, 255, 60]));

        let mut compositor = Compositor::new(CanvasStrategy::Fixed {
            width: 3,
            height: 3,
        });
        for layer in [&a, &b, &c] {
            compositor.add_layer(layer);
        }

        let mut expected = RgbaImage::new(3, 3);
        composite_over(&mut expected, &a);
        composite_over(&mut expected, &b);
        composite_over(&mut expected, &c);

        assert_eq!(compositor.finish(), expected);
    }

    #[test]
    fn half_transparent_over_opaque_keeps_full_alpha() {
        let mut compositor = Compositor::new(CanvasStrategy::Fixed {
            width: 1,
            height: 1,
        });
        compositor.add_layer(&solid(1, 1, RED));
        compositor.add_layer(&solid(1, 1, Rgba([0, 0, 255, 128])));

        assert_eq!(*compositor.finish().get_pixel(0, 0), Rgba([127, 0, 128, 255]));
    }

    #[test]
    fn over_exact_channel_values() {
        // opaque destination never loses alpha
        for alpha in [1, 60, 127, 128, 200, 254] {
            let out = over(Rgba([10, 20, 30, 255]), Rgba([200, 100, 0, alpha]));
            assert_eq!(out[3], 255, "src alpha {alpha}");
        }
        // transparent destination passes the source through unchanged
        assert_eq!(
            over(CLEAR, Rgba([100, 110, 120, 200])),
            Rgba([100, 110, 120, 200])
        );
        // two half-covered layers: 128 + 128·127/255 = 192
        assert_eq!(
            over(Rgba([255, 0, 0, 128]), Rgba([0, 0, 255, 128])),
            Rgba([85, 0, 170, 192])
        );
        assert_eq!(over(RED, CLEAR), RED);
        assert_eq!(over(CLEAR, CLEAR), CLEAR);
    }

    #[test]
    fn strategy_serde_shape() {
        let fixed: CanvasStrategy =
            serde_json::from_str(r#"{"mode": "fixed", "width": 64, "height": 128}"#).unwrap();
        assert_eq!(
            fixed,
            CanvasStrategy::Fixed {
                width: 64,
                height: 128
            }
        );
        let adaptive: CanvasStrategy = serde_json::from_str(r#"{"mode": "adaptive"}"#).unwrap();
        assert_eq!(adaptive, CanvasStrategy::Adaptive);
    }
}
