use super::{
    face_mesh::FaceMesh,
    layers::{Layer, LayerPlan, MarkerRadius, MarkerStyle, paint_plan},
    skeleton::{
        Connection, FACE_LEFT_EYE, FACE_LEFT_EYEBROW, FACE_LIPS, FACE_OVAL, FACE_RIGHT_EYE,
        FACE_RIGHT_EYEBROW, HAND_CONNECTIONS, HAND_WRIST, POSE_CONNECTIONS, pose,
    },
    surface::{DrawingSurface, ImageRef, Stroke},
};
use crate::types::{Color, HolisticResult, Landmark, LandmarkSet};

const BRIDGE_STROKE: Stroke = Stroke::new(Color::WHITE, 5.0);
const SKELETON_STROKE: Stroke = Stroke::new(Color::WHITE, 4.0);
const TESSELATION_STROKE: Stroke = Stroke::new(Color::MESH_GRAY, 1.0);
const FEATURE_WIDTH: f32 = 4.0;
const OUTLINE_STROKE: Stroke = Stroke::new(Color::OUTLINE_GRAY, 5.0);

pub const POSE_MARKER_VISIBILITY_MIN: f32 = 0.65;
pub const HAND_MARKER_VISIBILITY_MIN: f32 = 0.5;

const fn pose_markers(fill: Color) -> MarkerStyle {
    MarkerStyle {
        fill,
        outline: SKELETON_STROKE,
        radius: MarkerRadius::Fixed(6.0),
        visibility_min: POSE_MARKER_VISIBILITY_MIN,
    }
}

const fn hand_markers(fill: Color) -> MarkerStyle {
    MarkerStyle {
        fill,
        outline: Stroke::new(Color::WHITE, 2.0),
        radius: MarkerRadius::Depth,
        visibility_min: HAND_MARKER_VISIBILITY_MIN,
    }
}

fn segments<'a>(
    set: &'a LandmarkSet,
    connections: &[Connection],
) -> Vec<(Option<&'a Landmark>, Option<&'a Landmark>)> {
    connections
        .iter()
        .map(|&(a, b)| (set.get(a), set.get(b)))
        .collect()
}

fn connectors<'a>(
    name: &'static str,
    set: &'a LandmarkSet,
    connections: &[Connection],
    stroke: Stroke,
) -> Layer<'a> {
    Layer::Connectors {
        name,
        segments: segments(set, connections),
        stroke,
    }
}

/// Builds the overlay for one result. The order is the occlusion order:
/// mirrored frame, elbow bridges, pose, right hand, left hand, face.
pub fn build_overlay<'a>(result: &'a HolisticResult, face_mesh: &FaceMesh) -> LayerPlan<'a> {
    let mut plan = LayerPlan {
        mirrored: true,
        layers: Vec::new(),
    };

    plan.push(Layer::Image {
        image: ImageRef {
            rgba: &result.image.rgba,
            width: result.image.width,
            height: result.image.height,
        },
    });

    if let Some(body) = &result.pose {
        let bridges = [
            (pose::RIGHT_ELBOW, &result.right_hand, "right-bridge"),
            (pose::LEFT_ELBOW, &result.left_hand, "left-bridge"),
        ];
        for (elbow, hand, name) in bridges {
            if let Some(hand) = hand {
                plan.push(Layer::Connectors {
                    name,
                    segments: vec![(body.get(elbow), hand.get(HAND_WRIST))],
                    stroke: BRIDGE_STROKE,
                });
            }
        }

        plan.push(connectors("pose", body, POSE_CONNECTIONS, SKELETON_STROKE));
        plan.push(Layer::Markers {
            name: "pose-left",
            points: pose::LEFT.iter().map(|&i| body.get(i)).collect(),
            style: pose_markers(Color::ORANGE),
        });
        plan.push(Layer::Markers {
            name: "pose-right",
            points: pose::RIGHT.iter().map(|&i| body.get(i)).collect(),
            style: pose_markers(Color::CYAN),
        });
    }

    let hands = [
        (&result.right_hand, "right-hand", "right-hand-joints", Color::CYAN),
        (&result.left_hand, "left-hand", "left-hand-joints", Color::ORANGE),
    ];
    for (hand, bones, joints, fill) in hands {
        if let Some(hand) = hand {
            plan.push(connectors(bones, hand, HAND_CONNECTIONS, SKELETON_STROKE));
            plan.push(Layer::Markers {
                name: joints,
                points: hand.iter().collect(),
                style: hand_markers(fill),
            });
        }
    }

    if let Some(face) = &result.face {
        if !face_mesh.tesselation().is_empty() {
            plan.push(connectors(
                "face-tesselation",
                face,
                face_mesh.tesselation(),
                TESSELATION_STROKE,
            ));
        }
        let features: [(&'static str, &[Connection], Stroke); 6] = [
            ("right-eye", FACE_RIGHT_EYE, Stroke::new(Color::CYAN, FEATURE_WIDTH)),
            ("right-eyebrow", FACE_RIGHT_EYEBROW, Stroke::new(Color::CYAN, FEATURE_WIDTH)),
            ("left-eye", FACE_LEFT_EYE, Stroke::new(Color::ORANGE, FEATURE_WIDTH)),
            ("left-eyebrow", FACE_LEFT_EYEBROW, Stroke::new(Color::ORANGE, FEATURE_WIDTH)),
            ("face-oval", FACE_OVAL, OUTLINE_STROKE),
            ("lips", FACE_LIPS, OUTLINE_STROKE),
        ];
        for (name, connections, stroke) in features {
            plan.push(connectors(name, face, connections, stroke));
        }
    }

    plan
}

/// Paints one holistic result. The surface must already match the frame size.
pub fn render_overlay<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    result: &HolisticResult,
    face_mesh: &FaceMesh,
) {
    let plan = build_overlay(result, face_mesh);
    log::trace!("overlay layers: {:?}", plan.names());
    surface.clear();
    paint_plan(surface, &plan);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::filter::filter_pose;
    use crate::pipeline::recording::{DrawOp, RecordingSurface};
    use crate::pipeline::skeleton::HAND_LANDMARK_COUNT;
    use crate::pipeline::surface::Rect;
    use crate::types::Frame;

    fn pose_set(visibility: f32) -> LandmarkSet {
        LandmarkSet::from_points((0..pose::COUNT).map(|i| {
            Landmark::new(0.2 + i as f32 * 0.01, 0.3 + i as f32 * 0.01, 0.0)
                .with_visibility(visibility)
        }))
    }

    fn hand_set() -> LandmarkSet {
        LandmarkSet::from_points(
            (0..HAND_LANDMARK_COUNT)
                .map(|i| Landmark::new(0.6, 0.1 + i as f32 * 0.02, -0.05)),
        )
    }

    fn face_set() -> LandmarkSet {
        LandmarkSet::from_points((0..478).map(|i| Landmark::new(0.5, i as f32 / 478.0, 0.0)))
    }

    #[test]
    fn pose_only_result_draws_pose_layers_and_nothing_else() {
        let mut result = HolisticResult::empty(Frame::filled(64, 48, [0, 0, 0, 255]));
        let mut pose = pose_set(0.9);
        pose.remove(pose::LEFT_KNEE);
        filter_pose(Some(&mut pose));
        result.pose = Some(pose);

        let mesh = FaceMesh::default();
        let plan = build_overlay(&result, &mesh);
        assert_eq!(plan.names(), vec!["image", "pose", "pose-left", "pose-right"]);

        let mut surface = RecordingSurface::with_size(64, 48);
        render_overlay(&mut surface, &result, &mesh);
        let circles = surface.circles();
        // shoulder, elbow, hip, ankle, heel, foot index on each side; knees minus the left one
        assert_eq!(circles.len(), 13);
        assert!(circles.iter().all(|(_, r, _)| *r == 6.0));
    }

    #[test]
    fn low_visibility_pose_markers_are_not_drawn() {
        let mut result = HolisticResult::empty(Frame::filled(10, 10, [0, 0, 0, 255]));
        let mut pose = pose_set(0.6);
        filter_pose(Some(&mut pose));
        result.pose = Some(pose);

        let mut surface = RecordingSurface::with_size(10, 10);
        render_overlay(&mut surface, &result, &FaceMesh::default());
        assert!(surface.circles().is_empty());
        assert!(!surface.lines().is_empty());
    }

    #[test]
    fn right_hand_bridge_is_drawn_before_pose_and_hand_detail() {
        let mut result = HolisticResult::empty(Frame::filled(100, 100, [0, 0, 0, 255]));
        let mut pose = pose_set(0.9);
        filter_pose(Some(&mut pose));
        let mut hand: Vec<Landmark> = hand_set().iter().flatten().copied().collect();
        hand[HAND_WRIST] = Landmark::new(0.7, 0.8, 0.0).with_visibility(0.9);
        result.pose = Some(pose);
        result.right_hand = Some(LandmarkSet::from_points(hand));

        let plan = build_overlay(&result, &FaceMesh::default());
        assert_eq!(
            plan.names(),
            vec![
                "image",
                "right-bridge",
                "pose",
                "pose-left",
                "pose-right",
                "right-hand",
                "right-hand-joints"
            ]
        );

        let mut surface = RecordingSurface::with_size(100, 100);
        render_overlay(&mut surface, &result, &FaceMesh::default());
        let lines = surface.lines();
        let bridges: Vec<_> = lines
            .iter()
            .filter(|(_, _, stroke)| **stroke == BRIDGE_STROKE)
            .collect();
        assert_eq!(bridges.len(), 1);

        let elbow = result.pose.as_ref().and_then(|p| p.get(pose::RIGHT_ELBOW)).unwrap();
        let (from, to, _) = lines[0];
        assert!((from.0 - elbow.x * 100.0).abs() < 1e-3);
        assert!((from.1 - elbow.y * 100.0).abs() < 1e-3);
        assert!((to.0 - 70.0).abs() < 1e-3 && (to.1 - 80.0).abs() < 1e-3);
        assert_eq!(*lines[0].2, BRIDGE_STROKE);
    }

    #[test]
    fn hand_joint_radius_follows_depth() {
        let mut result = HolisticResult::empty(Frame::filled(10, 10, [0, 0, 0, 255]));
        result.left_hand = Some(LandmarkSet::from_points([
            Landmark::new(0.1, 0.1, -0.15),
            Landmark::new(0.2, 0.2, 0.1),
        ]));

        let mut surface = RecordingSurface::with_size(10, 10);
        render_overlay(&mut surface, &result, &FaceMesh::default());
        let circles = surface.circles();
        assert_eq!(circles.len(), 2);
        assert_eq!(circles[0].1, 10.0);
        assert_eq!(circles[1].1, 1.0);
        assert!(circles.iter().all(|(_, _, fill)| **fill == Color::ORANGE));
    }

    #[test]
    fn face_layers_follow_the_tesselation() {
        let mut result = HolisticResult::empty(Frame::filled(10, 10, [0, 0, 0, 255]));
        result.face = Some(face_set());
        let mesh = FaceMesh::from_edges(vec![(0, 1), (1, 2)]);

        let plan = build_overlay(&result, &mesh);
        assert_eq!(
            plan.names(),
            vec![
                "image",
                "face-tesselation",
                "right-eye",
                "right-eyebrow",
                "left-eye",
                "left-eyebrow",
                "face-oval",
                "lips"
            ]
        );

        let without_mesh = build_overlay(&result, &FaceMesh::default());
        assert!(!without_mesh.names().contains(&"face-tesselation"));
    }

    #[test]
    fn overlay_is_painted_inside_a_mirror_transform() {
        let result = HolisticResult::empty(Frame::filled(8, 4, [0, 0, 0, 255]));
        let mut surface = RecordingSurface::with_size(8, 4);
        render_overlay(&mut surface, &result, &FaceMesh::default());
        assert_eq!(
            surface.ops(),
            &[
                DrawOp::Clear,
                DrawOp::Save,
                DrawOp::Translate(8.0, 0.0),
                DrawOp::Scale(-1.0, 1.0),
                DrawOp::Image {
                    width: 8,
                    height: 4,
                    dest: Rect::from_size(8, 4),
                },
                DrawOp::Restore,
            ]
        );
    }
}
