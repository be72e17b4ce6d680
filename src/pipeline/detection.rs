use serde::{Deserialize, Serialize};

/// Full detection payload for one image, as returned by the external detector.
///
/// A payload without an `anomalies` key deserializes to an empty list, and
/// unknown fields are ignored, so partial or over-verbose detector output
/// still parses. The list order is rendering order: later entries draw over
/// earlier ones.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(default)]
    pub anomalies: Vec<AnomalyEntry>,
}

/// One detected region. Both geometries are optional and independent.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AnomalyEntry {
    /// Polygon vertices as normalized `(x, y)` pairs in `[0,1]`.
    #[serde(default)]
    pub polygon_points: Option<Vec<[f64; 2]>>,
    /// Bounding box as normalized `(ymin, xmin, ymax, xmax)`.
    #[serde(default)]
    pub box_2d: Option<[f64; 4]>,
}

impl AnomalyEntry {
    /// Polygon vertices, if there are enough to form an area.
    ///
    /// A 1- or 2-point sequence carries no drawable region and is treated as
    /// absent rather than as an error.
    pub fn drawable_polygon(&self) -> Option<&[[f64; 2]]> {
        match self.polygon_points.as_deref() {
            Some(points) if points.len() > 2 => Some(points),
            _ => None,
        }
    }
}

/// Map a normalized point to pixel space.
///
/// No clamping: coordinates outside `[0,1]` map to out-of-canvas pixels and
/// are left for the rasterizer to clip.
pub fn map_point(point: [f64; 2], width: u32, height: u32) -> (f32, f32) {
    (
        (point[0] * width as f64) as f32,
        (point[1] * height as f64) as f32,
    )
}

/// Map a normalized `(ymin, xmin, ymax, xmax)` box to a pixel-space
/// `(x0, y0, x1, y1)` box.
///
/// Note the axis reorder from (row, col) normalized form to (x, y) pixel
/// form. No clamping and no min/max normalization: an inverted or degenerate
/// box maps to an inverted or degenerate pixel box.
pub fn map_box(b: [f64; 4], width: u32, height: u32) -> (f32, f32, f32, f32) {
    let [ymin, xmin, ymax, xmax] = b;
    (
        (xmin * width as f64) as f32,
        (ymin * height as f64) as f32,
        (xmax * width as f64) as f32,
        (ymax * height as f64) as f32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_point() {
        assert_eq!(map_point([0.5, 0.5], 100, 50), (50.0, 25.0));
        assert_eq!(map_point([0.0, 1.0], 640, 480), (0.0, 480.0));
        // Out-of-range values pass through unclamped
        assert_eq!(map_point([1.5, -0.5], 100, 100), (150.0, -50.0));
    }

    #[test]
    fn test_map_box_axis_reorder() {
        // (ymin, xmin, ymax, xmax) -> (xmin*W, ymin*H, xmax*W, ymax*H)
        assert_eq!(
            map_box([0.2, 0.1, 0.8, 0.9], 100, 50),
            (10.0, 10.0, 90.0, 40.0)
        );
    }

    #[test]
    fn test_map_box_inverted_passes_through() {
        let (x0, y0, x1, y1) = map_box([0.8, 0.9, 0.2, 0.1], 100, 50);
        assert!(x0 > x1);
        assert!(y0 > y1);
    }

    #[test]
    fn test_deserialize_full_record() {
        let json = r#"{
            "anomalies": [
                {"polygon_points": [[0.1, 0.1], [0.5, 0.1], [0.3, 0.6]]},
                {"box_2d": [0.2, 0.1, 0.8, 0.9]}
            ]
        }"#;
        let record: DetectionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.anomalies.len(), 2);
        assert!(record.anomalies[0].drawable_polygon().is_some());
        assert!(record.anomalies[0].box_2d.is_none());
        assert_eq!(record.anomalies[1].box_2d, Some([0.2, 0.1, 0.8, 0.9]));
    }

    #[test]
    fn test_deserialize_missing_anomalies_key() {
        let record: DetectionRecord = serde_json::from_str("{}").unwrap();
        assert!(record.anomalies.is_empty());
    }

    #[test]
    fn test_deserialize_ignores_unknown_fields() {
        let json = r#"{"anomalies": [{"box_2d": [0, 0, 1, 1], "label": "crack", "score": 0.93}]}"#;
        let record: DetectionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.anomalies.len(), 1);
    }

    #[test]
    fn test_short_polygon_is_not_drawable() {
        let entry = AnomalyEntry {
            polygon_points: Some(vec![[0.1, 0.1], [0.9, 0.9]]),
            box_2d: None,
        };
        assert!(entry.drawable_polygon().is_none());

        let entry = AnomalyEntry {
            polygon_points: Some(vec![[0.1, 0.1], [0.9, 0.1], [0.5, 0.9]]),
            box_2d: None,
        };
        assert_eq!(entry.drawable_polygon().unwrap().len(), 3);
    }
}
