//! Decoding of raw YOLOv8 output into class detections.
//!
//! YOLOv8 exports produce `[1, 4 + classes, anchors]`: per anchor a box in
//! center form followed by one score per class. Boxes below the confidence
//! threshold are dropped, then same-class boxes are suppressed greedily by IoU.

use crate::config::DetectionConfig;

/// One kept detection in letterbox coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    /// x1, y1, x2, y2
    pub bbox: [f32; 4],
}

/// Thresholds applied while decoding.
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl From<&DetectionConfig> for DecodeParams {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        }
    }
}

/// Decode a raw output tensor.
///
/// `shape` is the tensor shape; both `[1, 4 + nc, n]` and the transposed
/// `[1, n, 4 + nc]` layouts are accepted (the smaller axis is the channel axis).
/// Returns detections ordered by descending confidence.
pub fn decode(shape: &[usize], data: &[f32], params: DecodeParams) -> Result<Vec<Detection>, String> {
    let (channels, anchors, channels_first) = match shape {
        [1, a, b] | [a, b] if a <= b => (*a, *b, true),
        [1, a, b] | [a, b] => (*b, *a, false),
        _ => return Err(format!("Unexpected detector output shape: {:?}", shape)),
    };
    if channels <= 4 {
        return Err(format!("Detector output has no class scores: {:?}", shape));
    }
    if data.len() < channels * anchors {
        return Err(format!(
            "Detector output too short: {} values for shape {:?}",
            data.len(),
            shape
        ));
    }

    let at = |c: usize, j: usize| {
        if channels_first {
            data[c * anchors + j]
        } else {
            data[j * channels + c]
        }
    };

    let mut candidates = Vec::new();
    for j in 0..anchors {
        let (class_id, confidence) = (4..channels)
            .map(|c| (c - 4, at(c, j)))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
        if confidence.is_nan() || confidence < params.confidence_threshold {
            continue;
        }
        let (cx, cy, w, h) = (at(0, j), at(1, j), at(2, j), at(3, j));
        candidates.push(Detection {
            class_id,
            confidence,
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        });
    }

    Ok(non_max_suppression(candidates, params))
}

/// Greedy per-class non-maximum suppression.
pub fn non_max_suppression(mut candidates: Vec<Detection>, params: DecodeParams) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= params.max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > params.iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Intersection over union of two x1y1x2y2 boxes.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DecodeParams {
        DecodeParams {
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }

    /// Build a channels-first `[1, 4 + nc, n]` buffer from per-anchor rows.
    ///
    /// Pads with empty anchors so the anchor axis stays the longer one.
    fn channels_first(rows: &[[f32; 6]]) -> (Vec<usize>, Vec<f32>) {
        let n = rows.len().max(8);
        let mut data = vec![0.0; 6 * n];
        for (j, row) in rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                data[c * n + j] = *v;
            }
        }
        (vec![1, 6, n], data)
    }

    #[test]
    fn test_iou() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
        let half = iou(&a, &[5.0, 0.0, 15.0, 10.0]);
        assert!((half - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_filters_and_suppresses() {
        // cx, cy, w, h, class0, class1
        let (shape, data) = channels_first(&[
            [50.0, 50.0, 20.0, 20.0, 0.9, 0.1],
            [51.0, 50.0, 20.0, 20.0, 0.8, 0.1], // overlaps the first, same class
            [51.0, 50.0, 20.0, 20.0, 0.1, 0.6], // same place, other class
            [200.0, 200.0, 20.0, 20.0, 0.1, 0.2], // below threshold
        ]);
        let detections = decode(&shape, &data, params()).unwrap();
        let classes: Vec<usize> = detections.iter().map(|d| d.class_id).collect();
        assert_eq!(classes, vec![0, 1]);
        assert!(detections[0].confidence > detections[1].confidence);
    }

    #[test]
    fn test_decode_keeps_duplicate_instances() {
        let (shape, data) = channels_first(&[
            [50.0, 50.0, 20.0, 20.0, 0.9, 0.0],
            [300.0, 300.0, 20.0, 20.0, 0.8, 0.0],
        ]);
        let detections = decode(&shape, &data, params()).unwrap();
        assert_eq!(detections.len(), 2);
        assert!(detections.iter().all(|d| d.class_id == 0));
    }

    #[test]
    fn test_decode_transposed_layout() {
        // [1, n, 6] with n = 8 anchors, only the first one confident
        let mut data = vec![0.0; 8 * 6];
        data[..6].copy_from_slice(&[10.0, 10.0, 4.0, 4.0, 0.0, 0.95]);
        let detections = decode(&[1, 8, 6], &data, params()).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 1);
        assert_eq!(detections[0].bbox, [8.0, 8.0, 12.0, 12.0]);
    }

    #[test]
    fn test_decode_respects_max_detections() {
        let rows: Vec<[f32; 6]> = (0..10)
            .map(|i| [i as f32 * 100.0, 0.0, 10.0, 10.0, 0.9, 0.0])
            .collect();
        let (shape, data) = channels_first(&rows);
        let detections = decode(
            &shape,
            &data,
            DecodeParams {
                max_detections: 3,
                ..params()
            },
        )
        .unwrap();
        assert_eq!(detections.len(), 3);
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        assert!(decode(&[1, 2, 3, 4], &[], params()).is_err());
        assert!(decode(&[1, 4, 10], &[0.0; 40], params()).is_err());
    }
}
