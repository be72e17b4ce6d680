use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;

use super::detection::{map_box, map_point, DetectionRecord};

/// Semi-transparent polygon fill, composited over the base at the end
const POLYGON_FILL: Rgba<u8> = Rgba([255, 255, 0, 100]);
/// Solid polygon outline (gold), drawn directly on the base
const POLYGON_OUTLINE: Rgba<u8> = Rgba([255, 215, 0, 255]);
/// Solid bounding box outline, drawn directly on the base
const BOX_OUTLINE: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BOX_STROKE: i32 = 3;

/// Render a detection record onto a copy of the source image.
///
/// Returns `None` when the record holds no anomalies; the caller must not
/// create an output file in that case.
///
/// Outlines are drawn on the base layer and fills on a transparent overlay,
/// which is alpha-composited once at the end. A later entry's semi-transparent
/// fill therefore blends over an earlier entry's outline. That ordering is
/// intentional and load-bearing for how overlapping detections read visually.
pub fn render(img: &DynamicImage, record: &DetectionRecord) -> Option<RgbImage> {
    if record.anomalies.is_empty() {
        return None;
    }

    let mut base = img.to_rgba8();
    let (width, height) = base.dimensions();
    let mut overlay = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 0]));

    for entry in &record.anomalies {
        if let Some(points) = entry.drawable_polygon() {
            let pixel_points: Vec<(f32, f32)> = points
                .iter()
                .map(|&p| map_point(p, width, height))
                .collect();
            fill_polygon(&mut overlay, &pixel_points);
            outline_polygon(&mut base, &pixel_points);
        }

        if let Some(b) = entry.box_2d {
            let (x0, y0, x1, y1) = map_box(b, width, height);
            outline_box(&mut base, x0, y0, x1, y1);
        }
    }

    composite_over(&mut base, &overlay);
    Some(flatten(&base))
}

/// Scanline-fill the polygon on the overlay layer.
///
/// `draw_polygon_mut` rejects a point list whose last vertex repeats the
/// first, and some detectors emit exactly that closing vertex, so it is
/// dropped here. Fill clips itself to the canvas.
fn fill_polygon(overlay: &mut RgbaImage, points: &[(f32, f32)]) {
    let mut poly: Vec<Point<i32>> = points
        .iter()
        .map(|&(x, y)| Point::new(x.round() as i32, y.round() as i32))
        .collect();
    while poly.len() > 1 && poly.last() == poly.first() {
        poly.pop();
    }
    if poly.len() > 2 {
        draw_polygon_mut(overlay, &poly, POLYGON_FILL);
    }
}

/// Trace the polygon edges on the base layer, closing back to the first vertex
fn outline_polygon(base: &mut RgbaImage, points: &[(f32, f32)]) {
    for window in points.windows(2) {
        draw_line_segment_mut(base, window[0], window[1], POLYGON_OUTLINE);
    }
    if let (Some(&first), Some(&last)) = (points.first(), points.last()) {
        if first != last {
            draw_line_segment_mut(base, last, first, POLYGON_OUTLINE);
        }
    }
}

/// Draw a rectangle outline with a centered stroke.
///
/// Edges are drawn as plain line segments between the mapped corners, which
/// keeps inverted and degenerate boxes renderable as given and lets
/// out-of-canvas coordinates clip silently.
fn outline_box(base: &mut RgbaImage, x0: f32, y0: f32, x1: f32, y1: f32) {
    for i in 0..BOX_STROKE {
        let o = (i - BOX_STROKE / 2) as f32;
        draw_line_segment_mut(base, (x0, y0 + o), (x1, y0 + o), BOX_OUTLINE);
        draw_line_segment_mut(base, (x0, y1 + o), (x1, y1 + o), BOX_OUTLINE);
        draw_line_segment_mut(base, (x0 + o, y0), (x0 + o, y1), BOX_OUTLINE);
        draw_line_segment_mut(base, (x1 + o, y0), (x1 + o, y1), BOX_OUTLINE);
    }
}

/// Alpha-over composite the overlay onto the base in place
fn composite_over(base: &mut RgbaImage, overlay: &RgbaImage) {
    for (base_px, overlay_px) in base.pixels_mut().zip(overlay.pixels()) {
        let alpha = overlay_px[3] as f32 / 255.0;
        if alpha == 0.0 {
            continue;
        }
        let inv_alpha = 1.0 - alpha;
        for c in 0..3 {
            base_px[c] =
                (overlay_px[c] as f32 * alpha + base_px[c] as f32 * inv_alpha) as u8;
        }
        base_px[3] = 255;
    }
}

/// Flatten to an opaque RGB raster for output
fn flatten(img: &RgbaImage) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut out = RgbImage::new(width, height);
    for (out_px, px) in out.pixels_mut().zip(img.pixels()) {
        *out_px = Rgb([px[0], px[1], px[2]]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::detection::AnomalyEntry;

    fn black_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([0, 0, 0])))
    }

    fn white_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
    }

    #[test]
    fn test_empty_record_renders_nothing() {
        let record = DetectionRecord { anomalies: vec![] };
        assert!(render(&black_image(10, 10), &record).is_none());
    }

    #[test]
    fn test_box_outline_at_expected_pixels() {
        // 100x50 image, box (ymin, xmin, ymax, xmax) = (0.2, 0.1, 0.8, 0.9)
        // maps to the pixel box (10, 10, 90, 40)
        let record: DetectionRecord =
            serde_json::from_str(r#"{"anomalies":[{"box_2d":[0.2,0.1,0.8,0.9]}]}"#).unwrap();
        let out = render(&black_image(100, 50), &record).unwrap();

        assert_eq!(out.dimensions(), (100, 50));
        // Top, bottom, left, right edges
        assert_eq!(*out.get_pixel(50, 10), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(50, 40), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(10, 25), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(90, 25), Rgb([255, 0, 0]));
        // Interior stays untouched
        assert_eq!(*out.get_pixel(50, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_inverted_box_still_draws() {
        let record = DetectionRecord {
            anomalies: vec![AnomalyEntry {
                polygon_points: None,
                box_2d: Some([0.8, 0.9, 0.2, 0.1]),
            }],
        };
        let out = render(&black_image(100, 50), &record).unwrap();
        // Same corners as the upright box, traversed backwards
        assert_eq!(*out.get_pixel(50, 10), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(10, 25), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_out_of_range_box_is_clipped_not_rejected() {
        let record = DetectionRecord {
            anomalies: vec![AnomalyEntry {
                polygon_points: None,
                box_2d: Some([-0.5, -0.5, 1.5, 1.5]),
            }],
        };
        // Must not panic; everything clips off-canvas
        let out = render(&black_image(20, 20), &record).unwrap();
        assert_eq!(out.dimensions(), (20, 20));
    }

    #[test]
    fn test_two_point_polygon_draws_nothing_but_box_still_renders() {
        let record = DetectionRecord {
            anomalies: vec![AnomalyEntry {
                polygon_points: Some(vec![[0.3, 0.3], [0.7, 0.7]]),
                box_2d: Some([0.2, 0.1, 0.8, 0.9]),
            }],
        };
        let out = render(&black_image(100, 50), &record).unwrap();

        // The box edge is there
        assert_eq!(*out.get_pixel(50, 10), Rgb([255, 0, 0]));
        // No fill or gold outline anywhere: every pixel is black or pure red
        for px in out.pixels() {
            assert!(
                *px == Rgb([0, 0, 0]) || *px == Rgb([255, 0, 0]),
                "unexpected pixel {:?}",
                px
            );
        }
    }

    #[test]
    fn test_polygon_fill_blends_over_white_base() {
        // Square polygon covering the middle of a 40x40 white image
        let record = DetectionRecord {
            anomalies: vec![AnomalyEntry {
                polygon_points: Some(vec![[0.25, 0.25], [0.75, 0.25], [0.75, 0.75], [0.25, 0.75]]),
                box_2d: None,
            }],
        };
        let out = render(&white_image(40, 40), &record).unwrap();

        // Interior pixel: yellow at alpha 100/255 over white
        // r = g = ~255, b = 0*a + 255*(1-a) = ~155
        let px = out.get_pixel(20, 20);
        assert!(px[0] >= 254 && px[1] >= 254);
        assert!((154..=156).contains(&px[2]), "blue channel {}", px[2]);
        // Far corner untouched
        assert_eq!(*out.get_pixel(2, 2), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_closing_vertex_is_tolerated() {
        let record = DetectionRecord {
            anomalies: vec![AnomalyEntry {
                polygon_points: Some(vec![
                    [0.25, 0.25],
                    [0.75, 0.25],
                    [0.5, 0.75],
                    [0.25, 0.25],
                ]),
                box_2d: None,
            }],
        };
        let out = render(&white_image(40, 40), &record).unwrap();
        // Triangle interior got the fill
        let px = out.get_pixel(20, 15);
        assert!(px[0] >= 254 && (154..=156).contains(&px[2]));
    }

    #[test]
    fn test_later_fill_blends_over_earlier_outline() {
        // Entry 1: triangle whose top edge runs along y=10 from x=10 to x=30.
        // Entry 2: larger square filled over it.
        let record = DetectionRecord {
            anomalies: vec![
                AnomalyEntry {
                    polygon_points: Some(vec![[0.25, 0.25], [0.75, 0.25], [0.5, 0.75]]),
                    box_2d: None,
                },
                AnomalyEntry {
                    polygon_points: Some(vec![
                        [0.1, 0.1],
                        [0.9, 0.1],
                        [0.9, 0.9],
                        [0.1, 0.9],
                    ]),
                    box_2d: None,
                },
            ],
        };
        let out = render(&white_image(40, 40), &record).unwrap();

        // A pixel on entry 1's gold outline, inside entry 2's fill region:
        // fill (255,255,0)@100 over gold (255,215,0) -> green channel rises
        // above the outline's 215 but stays below an unblended 255.
        let px = out.get_pixel(20, 10);
        assert!(px[0] >= 254);
        assert!(px[1] > 215 && px[1] < 255, "green channel {}", px[1]);
        assert_eq!(px[2], 0);
    }

    #[test]
    fn test_render_does_not_mutate_inputs() {
        let img = white_image(20, 20);
        let record = DetectionRecord {
            anomalies: vec![AnomalyEntry {
                polygon_points: Some(vec![[0.1, 0.1], [0.9, 0.1], [0.5, 0.9]]),
                box_2d: None,
            }],
        };
        let _ = render(&img, &record).unwrap();
        assert_eq!(*img.to_rgb8().get_pixel(10, 10), Rgb([255, 255, 255]));
        assert_eq!(record.anomalies.len(), 1);
    }
}
