//! Stage 5: clip path application.
//!
//! Every element with a `clip-path` reference is sampled to a polygon,
//! intersected with the sampled clip geometry (Sutherland–Hodgman), and
//! rewritten as a path tracing the intersection. An empty intersection
//! leaves an empty `d`. The verification layer gets the containment,
//! bounds and area-conservation checks for each application.

use svgbake_algorithms::polygon::{difference_fragments, intersect_convex, sample_path};
use svgbake_algorithms::shapes::polygon_to_path;
use svgbake_decimal::Decimal;
use svgbake_path::serialize::path_to_string;
use svgbake_path::Path;

use crate::dom::{Document, NodeId};
use crate::pipeline::{
    element_geometry, is_geometry_element, rewrite_as_path, url_reference, Flattener,
};
use crate::verify;
use crate::{transform, ErrorKind, FlattenError, FlattenStats, Stage};

// Containment slack for curve-sampled vertices.
fn distance_tolerance() -> Decimal {
    Decimal::pow10(-6)
}

pub(crate) fn run(
    fl: &Flattener,
    doc: &mut Document,
    stats: &mut FlattenStats,
) -> Result<(), FlattenError> {
    let clipped: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&n| {
            doc.is_element(n)
                && doc.attribute(n, "clip-path").is_some()
                && is_geometry_element(doc.local_tag(n))
        })
        .collect();

    for node in clipped {
        fl.poll_cancel(Stage::ClipPaths)?;
        apply(fl, doc, node, stats)?;
    }
    Ok(())
}

fn apply(
    fl: &Flattener,
    doc: &mut Document,
    node: NodeId,
    stats: &mut FlattenStats,
) -> Result<(), FlattenError> {
    let cx = fl.context();
    let element_id = doc.attribute(node, "id").map(str::to_string);

    let clip_ref = match doc.attribute(node, "clip-path").and_then(url_reference) {
        Some(id) => id.to_string(),
        None => {
            stats.warn(Stage::ClipPaths, "clip-path attribute is not a url() reference");
            return Ok(());
        }
    };
    let clip_element = match doc.element_by_id(&clip_ref) {
        Some(c) if doc.local_tag(c) == "clipPath" => c,
        _ => {
            stats.warn(
                Stage::ClipPaths,
                ErrorKind::UnresolvedReference(clip_ref).to_string(),
            );
            return Ok(());
        }
    };

    let subject_path = match element_geometry(fl, doc, node) {
        Ok(Some(g)) => g.path,
        Ok(None) => return Ok(()),
        Err(kind) => {
            stats.warn(Stage::ClipPaths, kind.to_string());
            return Ok(());
        }
    };
    let clip_path = match clip_geometry(fl, doc, clip_element) {
        Ok(Some(p)) => p,
        Ok(None) => {
            stats.warn(
                Stage::ClipPaths,
                format!("clipPath {} has no usable geometry", clip_ref),
            );
            return Ok(());
        }
        Err(kind) => {
            stats.warn(Stage::ClipPaths, kind.to_string());
            return Ok(());
        }
    };

    let segments = fl.options().clip_segments;
    let (subject, clip) = match (
        sample_path(&subject_path, segments, cx),
        sample_path(&clip_path, segments, cx),
    ) {
        (Ok(s), Ok(c)) => (s, c),
        (Err(e), _) | (_, Err(e)) => {
            stats.warn(Stage::ClipPaths, e.to_string());
            return Ok(());
        }
    };

    if !clip.is_convex() {
        stats.warn(
            Stage::ClipPaths,
            format!(
                "clipPath {} samples to a non-convex polygon; intersection may be inexact",
                clip_ref
            ),
        );
    }

    let intersection = match intersect_convex(&subject, &clip, cx) {
        Ok(p) => p,
        Err(e) => {
            stats.warn(Stage::ClipPaths, e.to_string());
            return Ok(());
        }
    };

    // Verification: the intersection must sit inside both inputs, its
    // area bounded by both, and the areas must balance end to end.
    let tol = distance_tolerance();
    let v = verify::intersection_bounds(&intersection, &subject, &clip, &tol, cx);
    fl.record_verification(Stage::ClipPaths, element_id.as_deref(), v, stats)?;

    let original_area = subject.area(cx);
    let clipped_area = intersection.area(cx);
    let e2e_tol = match Decimal::from_f64(fl.options().e2e_tolerance) {
        Ok(t) => t,
        Err(_) => Decimal::pow10(-10),
    };
    let v = verify::area_conservation(&original_area, &clipped_area, &e2e_tol, cx);
    fl.record_verification(Stage::ClipPaths, element_id.as_deref(), v, stats)?;

    match difference_fragments(&subject, &clip, cx) {
        Ok(fragments) => {
            let mut outside = Decimal::zero();
            for f in &fragments {
                outside += &f.area(cx);
            }
            let expected = cx.round(&(&original_area - &clipped_area));
            let v = verify::area_conservation(
                &original_area,
                &cx.round(&(&original_area - &outside)),
                &e2e_tol,
                cx,
            );
            fl.record_verification(Stage::ClipPaths, element_id.as_deref(), v, stats)?;
            let drift = (&outside - &expected).abs();
            if drift > e2e_tol {
                stats.warn(
                    Stage::ClipPaths,
                    format!(
                        "outside-area fragments drift from the area balance by {}",
                        drift
                    ),
                );
            }
        }
        Err(e) => stats.warn(Stage::ClipPaths, e.to_string()),
    }

    if intersection.is_degenerate() {
        stats.warn(
            Stage::ClipPaths,
            format!(
                "element {} is clipped away entirely: {}",
                element_id.as_deref().unwrap_or("<anonymous>"),
                ErrorKind::DegenerateIntersection
            ),
        );
        rewrite_as_path(doc, node, "");
    } else {
        let traced = polygon_to_path(intersection.points());
        rewrite_as_path(doc, node, &path_to_string(&traced, fl.options().precision));
    }
    doc.remove_attribute(node, "clip-path");
    stats.clip_paths_applied += 1;
    Ok(())
}

// The concatenated geometry of a clipPath's children, with per-child
// transforms baked in.
fn clip_geometry(
    fl: &Flattener,
    doc: &Document,
    clip_element: NodeId,
) -> Result<Option<Path>, ErrorKind> {
    let cx = fl.context();
    let mut commands = Vec::new();
    for child in doc.children(clip_element) {
        if !doc.is_element(child) {
            continue;
        }
        let geometry = match element_geometry(fl, doc, child)? {
            Some(g) => g.path,
            None => continue,
        };
        let geometry = match doc.attribute(child, "transform") {
            Some(list) => {
                let m = transform::parse_transform_list(list, cx)?;
                transform::apply_to_path(&geometry, &m, cx)?
            }
            None => geometry,
        };
        commands.extend(geometry.into_commands());
    }
    if commands.is_empty() {
        return Ok(None);
    }
    Ok(Some(Path::from_commands(commands)))
}

#[cfg(test)]
mod tests {
    use crate::pipeline::flatten_str;
    use crate::FlattenOptions;

    fn options() -> FlattenOptions {
        FlattenOptions::DEFAULT
            .without_use_resolution()
            .without_markers()
            .without_patterns()
            .without_masks()
            .without_gradient_baking()
            .without_transform_flattening()
            .keep_unused_defs()
    }

    #[test]
    fn rect_clipped_by_rect() {
        let src = r#"<svg><defs><clipPath id="c"><rect x="5" y="5" width="10" height="10"/></clipPath></defs><rect width="10" height="10" clip-path="url(#c)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        assert_eq!(out.stats.clip_paths_applied, 1);
        assert!(!out.svg.contains("clip-path="));
        // The clipped element is now a path tracing the 5..10 square.
        let d_start = out.svg.find(r#"<path d="M "#).unwrap();
        let d = &out.svg[d_start..out.svg[d_start..].find("/>").unwrap() + d_start];
        for corner in ["5 5", "10 5", "10 10", "5 10"] {
            assert!(d.contains(corner), "{} missing corner {}", d, corner);
        }
        assert!(d.contains('Z'));
        assert_eq!(out.stats.verification_failures(), 0);
    }

    #[test]
    fn empty_intersection_clears_geometry() {
        let src = r#"<svg><defs><clipPath id="c"><rect x="50" y="50" width="10" height="10"/></clipPath></defs><rect width="10" height="10" clip-path="url(#c)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        assert_eq!(out.stats.clip_paths_applied, 1);
        assert!(out.svg.contains(r#"d="""#));
        assert!(out
            .stats
            .warnings
            .iter()
            .any(|w| w.contains("clipped away")));
    }

    #[test]
    fn dangling_clip_reference_warns() {
        let src = r#"<svg><rect width="10" height="10" clip-path="url(#ghost)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        assert_eq!(out.stats.clip_paths_applied, 0);
        assert!(out.svg.contains("clip-path="));
    }

    #[test]
    fn non_convex_clip_warns() {
        let src = r#"<svg><defs><clipPath id="c"><path d="M 0 0 L 10 0 L 2 2 L 0 10 Z"/></clipPath></defs><rect width="10" height="10" clip-path="url(#c)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        assert!(out
            .stats
            .warnings
            .iter()
            .any(|w| w.contains("non-convex")));
    }
}
