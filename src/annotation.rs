//! gliff SDK - Annotation Model
//!
//! Shapes drawn on an image by one user. All annotations of one
//! (image, user) pair live in a single annotation item as a JSON array.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{GliffError, GliffResult};

/// Input modality that produced an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Toolbox {
    Paintbrush,
    Spline,
    BoundingBox,
}

/// Slice (`z`) and frame (`t`) an annotation was drawn on
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpaceTimeInfo {
    pub z: i64,
    pub t: i64,
}

/// Point on the image. Coordinates are kept as the JSON numbers they were
/// written as, so `1` stays `1` and `1.5` stays `1.5`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XYPoint {
    pub x: Number,
    pub y: Number,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl XYPoint {
    /// `None` if either coordinate is not finite
    pub fn new(x: f64, y: f64) -> Option<Self> {
        Some(Self {
            x: Number::from_f64(x)?,
            y: Number::from_f64(y)?,
            extra: Map::new(),
        })
    }

    pub fn xy(&self) -> (f64, f64) {
        (
            self.x.as_f64().unwrap_or_default(),
            self.y.as_f64().unwrap_or_default(),
        )
    }
}

impl From<(i64, i64)> for XYPoint {
    fn from((x, y): (i64, i64)) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
            extra: Map::new(),
        }
    }
}

/// Bounding box corner; both coordinates are `null` until drawn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub x: Option<Number>,
    pub y: Option<Number>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxCorners {
    pub top_left: Corner,
    pub bottom_right: Corner,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub coordinates: BoxCorners,
    pub space_time_info: SpaceTimeInfo,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spline {
    pub coordinates: Vec<XYPoint>,
    pub is_closed: bool,
    pub space_time_info: SpaceTimeInfo,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brush {
    pub radius: Number,
    /// "paint" or "erase"
    #[serde(rename = "type")]
    pub kind: String,
    pub color: String,
    #[serde(rename = "is3D")]
    pub is_3d: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrushStroke {
    pub coordinates: Vec<XYPoint>,
    pub space_time_info: SpaceTimeInfo,
    pub brush: Brush,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One annotation shape with its labels.
///
/// Fields this crate does not know are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub toolbox: Toolbox,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub spline: Spline,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub brush_strokes: Vec<BrushStroke>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Annotation {
    /// Blank annotation, as an editor creates before anything is drawn
    pub fn new(toolbox: Toolbox) -> Self {
        Self {
            toolbox,
            labels: Vec::new(),
            spline: Spline::default(),
            bounding_box: BoundingBox::default(),
            brush_strokes: Vec::new(),
            parameters: Map::new(),
            extra: Map::new(),
        }
    }

    /// No spline points, no brush strokes and no bounding box drawn
    pub fn is_empty(&self) -> bool {
        self.spline.coordinates.is_empty()
            && self.brush_strokes.is_empty()
            && self.bounding_box.coordinates.top_left.x.is_none()
    }
}

/// Append `new` to `existing`, dropping a trailing empty annotation first.
///
/// Editors leave one blank placeholder at the end of the list while a user
/// is drawing; only the last element is ever removed.
pub fn compact_and_append(existing: &mut Vec<Annotation>, new: Vec<Annotation>) {
    if existing.last().map_or(false, Annotation::is_empty) {
        existing.pop();
    }
    existing.extend(new);
}

/// Decode annotation item content
pub fn decode_annotations(content: &[u8]) -> GliffResult<Vec<Annotation>> {
    serde_json::from_slice(content).map_err(|e| GliffError::Decode(format!("annotations: {}", e)))
}

/// Encode annotations as annotation item content
pub fn encode_annotations(annotations: &[Annotation]) -> GliffResult<Vec<u8>> {
    Ok(serde_json::to_vec(annotations)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn spline_annotation(label: &str, points: &[(f64, f64)]) -> Annotation {
        let mut annotation = Annotation::new(Toolbox::Spline);
        annotation.labels.push(label.to_string());
        annotation.spline.coordinates = points
            .iter()
            .map(|&(x, y)| XYPoint::new(x, y).unwrap())
            .collect();
        annotation
    }

    fn stroke() -> BrushStroke {
        BrushStroke {
            coordinates: vec![XYPoint::from((1, 2))],
            space_time_info: SpaceTimeInfo { z: 0, t: 0 },
            brush: Brush {
                radius: 5.into(),
                kind: "paint".into(),
                color: "rgba(255,0,0,0.5)".into(),
                is_3d: false,
                extra: Map::new(),
            },
            extra: Map::new(),
        }
    }

    #[test]
    fn test_emptiness_predicate() {
        assert!(Annotation::new(Toolbox::Paintbrush).is_empty());

        let mut brush = Annotation::new(Toolbox::Paintbrush);
        brush.brush_strokes.push(stroke());
        assert!(!brush.is_empty());

        assert!(!spline_annotation("cell", &[(0.0, 0.0)]).is_empty());

        let mut boxed = Annotation::new(Toolbox::BoundingBox);
        boxed.bounding_box.coordinates.top_left = Corner {
            x: Some(3.into()),
            y: Some(4.into()),
        };
        assert!(!boxed.is_empty());

        // Labels alone do not make an annotation non-empty
        let mut labelled = Annotation::new(Toolbox::Spline);
        labelled.labels.push("nucleus".into());
        assert!(labelled.is_empty());
    }

    #[test]
    fn test_trailing_empty_annotation_is_dropped() {
        let ann1 = spline_annotation("a", &[(1.0, 1.0)]);
        let ann2 = spline_annotation("b", &[(2.0, 2.0)]);

        let mut stored = vec![ann1.clone(), Annotation::new(Toolbox::Spline)];
        compact_and_append(&mut stored, vec![ann2.clone()]);
        assert_eq!(stored, vec![ann1, ann2]);
    }

    #[test]
    fn test_non_empty_tail_is_kept() {
        let ann1 = spline_annotation("a", &[(1.0, 1.0)]);
        let ann2 = spline_annotation("b", &[(2.0, 2.0)]);
        let ann3 = spline_annotation("c", &[(3.0, 3.0)]);

        let mut stored = vec![ann1.clone(), ann2.clone()];
        compact_and_append(&mut stored, vec![ann3.clone()]);
        assert_eq!(stored, vec![ann1, ann2, ann3]);
    }

    #[test]
    fn test_only_last_empty_is_dropped() {
        let blank = Annotation::new(Toolbox::Spline);
        let real = spline_annotation("a", &[(1.0, 1.0)]);

        let mut stored = vec![blank.clone(), real.clone()];
        compact_and_append(&mut stored, vec![blank.clone()]);
        assert_eq!(stored, vec![blank.clone(), real, blank]);

        let mut nothing = Vec::new();
        compact_and_append(&mut nothing, Vec::new());
        assert!(nothing.is_empty());
    }

    #[test]
    fn test_wire_format() {
        let mut annotation = Annotation::new(Toolbox::BoundingBox);
        annotation.brush_strokes.push(stroke());

        let value = serde_json::to_value(&annotation).unwrap();
        assert_eq!(value["toolbox"], "boundingBox");
        assert!(value["boundingBox"]["coordinates"]["topLeft"]["x"].is_null());
        assert_eq!(value["spline"]["isClosed"], false);
        assert_eq!(value["brushStrokes"][0]["brush"]["is3D"], false);
        assert_eq!(value["brushStrokes"][0]["brush"]["type"], "paint");
        assert_eq!(value["brushStrokes"][0]["spaceTimeInfo"]["z"], 0);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_annotations(b"{not json"),
            Err(GliffError::Decode(_))
        ));
    }

    const EDITOR_CONTENT: &str = concat!(
        r#"[{"toolbox":"paintbrush","labels":["cell"],"#,
        r#""spline":{"coordinates":[{"x":1,"y":2},{"x":3.5,"y":4}],"isClosed":false,"spaceTimeInfo":{"z":0,"t":0}},"#,
        r#""boundingBox":{"coordinates":{"topLeft":{"x":null,"y":null},"bottomRight":{"x":null,"y":null}},"spaceTimeInfo":{"z":0,"t":0}},"#,
        r#""brushStrokes":[{"coordinates":[{"x":10,"y":11}],"spaceTimeInfo":{"z":2,"t":0},"#,
        r#""brush":{"radius":20,"type":"paint","color":"rgba(170,0,0,0.5)","is3D":false,"opacity":0.5}}],"#,
        r#""parameters":{"tool":"brush"},"id":7}]"#,
    );

    #[test]
    fn test_editor_content_round_trips_byte_for_byte() {
        let decoded = decode_annotations(EDITOR_CONTENT.as_bytes()).unwrap();

        assert_eq!(decoded[0].spline.coordinates[1].xy(), (3.5, 4.0));
        assert_eq!(decoded[0].extra["id"], 7);
        assert_eq!(decoded[0].brush_strokes[0].brush.extra["opacity"], 0.5);

        let encoded = encode_annotations(&decoded).unwrap();
        assert_eq!(String::from_utf8(encoded).unwrap(), EDITOR_CONTENT);
    }

    #[test]
    fn test_append_keeps_fields_of_stored_annotations() {
        let mut stored = decode_annotations(EDITOR_CONTENT.as_bytes()).unwrap();
        compact_and_append(&mut stored, vec![spline_annotation("b", &[(1.0, 1.0)])]);

        let value: Value = serde_json::from_slice(&encode_annotations(&stored).unwrap()).unwrap();
        assert_eq!(value[0]["id"], 7);
        assert_eq!(value[0]["spline"]["coordinates"][0]["x"].to_string(), "1");
        assert_eq!(value[1]["spline"]["coordinates"][0]["x"].to_string(), "1.0");
    }

    #[test]
    fn test_non_finite_points_are_rejected() {
        assert!(XYPoint::new(f64::NAN, 0.0).is_none());
        assert!(XYPoint::new(0.0, f64::INFINITY).is_none());
        assert_eq!(XYPoint::from((2, 3)).xy(), (2.0, 3.0));
    }
}
