//! Stage 2: marker instantiation.
//!
//! For every element with `marker-start`/`marker-mid`/`marker-end`, the
//! vertex positions and tangents are computed from the path commands and
//! each marker is cloned into the document as a positioned group. The
//! per-marker transform is
//! `translate(vertex) · rotate(angle) · scale(stroke-width) ·
//! translate(−ref) · viewBox`, with the rotation only under
//! `orient="auto"` and the scale only under `markerUnits="strokeWidth"`.

use svgbake_algorithms::arc::SvgArc;
use svgbake_decimal::{Context, Decimal};
use svgbake_linalg::{point, Point};
use svgbake_path::absolute::path_to_absolute;
use svgbake_path::{Path, Verb};

use crate::dom::{Document, NodeId};
use crate::pipeline::{
    attr_decimal, element_geometry, matrix_attribute, url_reference, Flattener,
};
use crate::{transform, ErrorKind, FlattenError, FlattenStats, Stage};

pub(crate) fn run(
    fl: &Flattener,
    doc: &mut Document,
    stats: &mut FlattenStats,
) -> Result<(), FlattenError> {
    let candidates: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&n| {
            doc.is_element(n)
                && (doc.attribute(n, "marker-start").is_some()
                    || doc.attribute(n, "marker-mid").is_some()
                    || doc.attribute(n, "marker-end").is_some())
        })
        .collect();

    for node in candidates {
        fl.poll_cancel(Stage::Markers)?;
        instantiate_for_element(fl, doc, node, stats)?;
    }
    Ok(())
}

// A vertex with the incoming and outgoing tangent angles (radians).
struct Vertex {
    at: Point,
    incoming: Option<Decimal>,
    outgoing: Option<Decimal>,
}

#[derive(Copy, Clone, PartialEq)]
enum Position {
    Start,
    Mid,
    End,
}

fn instantiate_for_element(
    fl: &Flattener,
    doc: &mut Document,
    node: NodeId,
    stats: &mut FlattenStats,
) -> Result<(), FlattenError> {
    let cx = fl.context();
    let geometry = match element_geometry(fl, doc, node) {
        Ok(Some(g)) => g,
        Ok(None) => {
            stats.warn(Stage::Markers, "marker attributes on a non-geometry element");
            return Ok(());
        }
        Err(kind) => {
            stats.warn(Stage::Markers, kind.to_string());
            return Ok(());
        }
    };

    let vertices = match vertex_tangents(&geometry.path, cx) {
        Ok(v) => v,
        Err(kind) => {
            stats.warn(Stage::Markers, kind.to_string());
            return Ok(());
        }
    };
    if vertices.is_empty() {
        return Ok(());
    }

    let stroke_width = match attr_decimal(doc, node, "stroke-width") {
        Ok(Some(w)) => w,
        _ => Decimal::one(),
    };

    let mut placements: Vec<(Position, &Vertex)> = Vec::new();
    placements.push((Position::Start, &vertices[0]));
    if vertices.len() > 2 {
        for v in &vertices[1..vertices.len() - 1] {
            placements.push((Position::Mid, v));
        }
    }
    if vertices.len() > 1 {
        placements.push((Position::End, &vertices[vertices.len() - 1]));
    }

    let mut inserted = Vec::new();
    for (position, vertex) in placements {
        let attr = match position {
            Position::Start => "marker-start",
            Position::Mid => "marker-mid",
            Position::End => "marker-end",
        };
        let marker_id = match doc.attribute(node, attr).and_then(url_reference) {
            Some(id) => id.to_string(),
            None => continue,
        };
        let marker = match doc.element_by_id(&marker_id) {
            Some(m) if doc.local_tag(m) == "marker" => m,
            _ => {
                stats.warn(
                    Stage::Markers,
                    ErrorKind::UnresolvedReference(marker_id).to_string(),
                );
                continue;
            }
        };

        match marker_transform(fl, doc, marker, vertex, position, &stroke_width) {
            Ok(transform_value) => {
                let group = doc.create_element("g");
                doc.set_attribute(group, "transform", transform_value);
                for child in doc.children(marker) {
                    let copy = doc.clone_subtree(child);
                    doc.append_child(group, copy);
                }
                inserted.push(group);
                stats.markers_resolved += 1;
            }
            Err(kind) => stats.warn(Stage::Markers, kind.to_string()),
        }
    }

    // Insert after the element, in placement order.
    for group in inserted.into_iter().rev() {
        doc.insert_after(node, group);
    }
    for attr in ["marker-start", "marker-mid", "marker-end"] {
        doc.remove_attribute(node, attr);
    }
    Ok(())
}

// Angles and mapped points come out of atan2 with a tail of working
// precision digits; render them trimmed at a scale far beyond the output
// precision.
fn fmt(value: &Decimal) -> String {
    svgbake_path::serialize::format_number(value, 40)
}

fn marker_transform(
    fl: &Flattener,
    doc: &Document,
    marker: NodeId,
    vertex: &Vertex,
    position: Position,
    stroke_width: &Decimal,
) -> Result<String, ErrorKind> {
    let cx = fl.context();
    let mut parts = vec![format!(
        "translate({} {})",
        fmt(&vertex.at.x),
        fmt(&vertex.at.y)
    )];

    let orient = doc.attribute(marker, "orient").unwrap_or("0");
    let angle_deg = match orient {
        "auto" | "auto-start-reverse" => {
            let tangent = bisector_angle(vertex, cx);
            let mut deg = cx.to_degrees(&tangent);
            if orient == "auto-start-reverse" && position == Position::Start {
                deg = cx.round(&(&deg + &Decimal::from(180)));
            }
            deg
        }
        fixed => match svgbake_path::parser::parse_decimal(fixed) {
            Some(d) => d,
            None => {
                return Err(ErrorKind::InvalidTransform {
                    src: fixed.to_string(),
                    message: "orient is neither auto nor an angle".into(),
                })
            }
        },
    };
    let angle_text = fmt(&angle_deg);
    if angle_text != "0" {
        parts.push(format!("rotate({})", angle_text));
    }

    let units = doc.attribute(marker, "markerUnits").unwrap_or("strokeWidth");
    if units == "strokeWidth" && *stroke_width != Decimal::one() {
        parts.push(format!("scale({})", fmt(stroke_width)));
    }

    let ref_x = attr_decimal(doc, marker, "refX")?.unwrap_or_else(Decimal::zero);
    let ref_y = attr_decimal(doc, marker, "refY")?.unwrap_or_else(Decimal::zero);

    match doc.attribute(marker, "viewBox") {
        Some(vb_attr) => {
            let vb = transform::parse_view_box(vb_attr)?;
            let par = match doc.attribute(marker, "preserveAspectRatio") {
                Some(src) => transform::parse_preserve_aspect_ratio(src)?,
                None => transform::PreserveAspectRatio::DEFAULT,
            };
            let three = Decimal::from(3);
            let width = attr_decimal(doc, marker, "markerWidth")?.unwrap_or_else(|| three.clone());
            let height = attr_decimal(doc, marker, "markerHeight")?.unwrap_or(three);
            let m = transform::view_box_transform(&vb, &width, &height, &par, cx)?;
            // The reference point lives in viewBox coordinates; align its
            // mapped position with the vertex.
            let mapped = transform::transform_point(&m, &ref_x, &ref_y, cx)?;
            parts.push(format!("translate({} {})", fmt(&-&mapped.x), fmt(&-&mapped.y)));
            parts.push(matrix_attribute(&m));
        }
        None => {
            if !ref_x.is_zero() || !ref_y.is_zero() {
                parts.push(format!("translate({} {})", fmt(&-&ref_x), fmt(&-&ref_y)));
            }
        }
    }

    Ok(parts.join(" "))
}

// Orientation at a vertex: the lone tangent at the ends, the bisector of
// the incoming and outgoing directions at a joint.
fn bisector_angle(vertex: &Vertex, cx: &Context) -> Decimal {
    match (&vertex.incoming, &vertex.outgoing) {
        (Some(inc), Some(out)) => {
            let sx = &cx.cos(inc) + &cx.cos(out);
            let sy = &cx.sin(inc) + &cx.sin(out);
            if sx.is_zero() && sy.is_zero() {
                // Opposite directions; fall back to the outgoing tangent.
                out.clone()
            } else {
                cx.atan2(&sy, &sx)
            }
        }
        (Some(angle), None) | (None, Some(angle)) => angle.clone(),
        (None, None) => Decimal::zero(),
    }
}

fn direction(from: &Point, to: &Point, cx: &Context) -> Option<Decimal> {
    let dx = &to.x - &from.x;
    let dy = &to.y - &from.y;
    if dx.is_zero() && dy.is_zero() {
        return None;
    }
    Some(cx.atan2(&dy, &dx))
}

// First non-degenerate control direction out of p0.
fn curve_out_tangent(p0: &Point, controls: &[&Point], cx: &Context) -> Option<Decimal> {
    controls.iter().find_map(|c| direction(p0, c, cx))
}

fn curve_in_tangent(end: &Point, controls: &[&Point], cx: &Context) -> Option<Decimal> {
    controls.iter().find_map(|c| direction(c, end, cx))
}

// Walk the canonical path and record every vertex with its adjacent
// tangent angles.
fn vertex_tangents(path: &Path, cx: &Context) -> Result<Vec<Vertex>, ErrorKind> {
    let absolute = path_to_absolute(path);
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut current = Point::origin();
    let mut subpath_start = Point::origin();

    for cmd in absolute.iter() {
        let a = &cmd.args;
        match cmd.verb {
            Verb::MoveTo => {
                let p = point(a[0].clone(), a[1].clone());
                vertices.push(Vertex {
                    at: p.clone(),
                    incoming: None,
                    outgoing: None,
                });
                subpath_start = p.clone();
                current = p;
            }
            Verb::LineTo => {
                let p = point(a[0].clone(), a[1].clone());
                let angle = direction(&current, &p, cx);
                connect(&mut vertices, angle.clone());
                vertices.push(Vertex {
                    at: p.clone(),
                    incoming: angle,
                    outgoing: None,
                });
                current = p;
            }
            Verb::CurveTo => {
                let c1 = point(a[0].clone(), a[1].clone());
                let c2 = point(a[2].clone(), a[3].clone());
                let to = point(a[4].clone(), a[5].clone());
                let out = curve_out_tangent(&current, &[&c1, &c2, &to], cx);
                let inc = curve_in_tangent(&to, &[&c2, &c1, &current], cx);
                connect(&mut vertices, out);
                vertices.push(Vertex {
                    at: to.clone(),
                    incoming: inc,
                    outgoing: None,
                });
                current = to;
            }
            Verb::QuadraticTo => {
                let c = point(a[0].clone(), a[1].clone());
                let to = point(a[2].clone(), a[3].clone());
                let out = curve_out_tangent(&current, &[&c, &to], cx);
                let inc = curve_in_tangent(&to, &[&c, &current], cx);
                connect(&mut vertices, out);
                vertices.push(Vertex {
                    at: to.clone(),
                    incoming: inc,
                    outgoing: None,
                });
                current = to;
            }
            Verb::ArcTo => {
                let to = point(a[5].clone(), a[6].clone());
                let arc = SvgArc {
                    from: current.clone(),
                    to: to.clone(),
                    rx: a[0].clone(),
                    ry: a[1].clone(),
                    x_rotation: cx.to_radians(&a[2]),
                    large_arc: !a[3].is_zero(),
                    sweep: !a[4].is_zero(),
                };
                let (out, inc) = arc_tangents(&arc, cx)?;
                connect(&mut vertices, out);
                vertices.push(Vertex {
                    at: to.clone(),
                    incoming: inc,
                    outgoing: None,
                });
                current = to;
            }
            Verb::ClosePath => {
                let angle = direction(&current, &subpath_start, cx);
                connect(&mut vertices, angle.clone());
                if let Some(first) = vertices
                    .iter_mut()
                    .find(|v| v.at == subpath_start && v.incoming.is_none())
                {
                    first.incoming = angle;
                }
                current = subpath_start.clone();
            }
            _ => {}
        }
    }

    Ok(vertices)
}

// Record the outgoing direction on the segment's start vertex.
fn connect(vertices: &mut [Vertex], outgoing: Option<Decimal>) {
    if let Some(last) = vertices.last_mut() {
        if last.outgoing.is_none() {
            last.outgoing = outgoing;
        }
    }
}

fn arc_tangents(
    arc: &SvgArc,
    cx: &Context,
) -> Result<(Option<Decimal>, Option<Decimal>), ErrorKind> {
    if arc.is_straight_line() {
        let d = direction(&arc.from, &arc.to, cx);
        return Ok((d.clone(), d));
    }
    let center = arc.to_center(cx).map_err(ErrorKind::Geometry)?;

    // d/dθ of the ellipse point, rotated by φ, oriented by the sweep.
    let tangent_at = |theta: &Decimal| -> Decimal {
        let (sin_t, cos_t) = (cx.sin(theta), cx.cos(theta));
        let (sin_phi, cos_phi) = (cx.sin(&center.x_rotation), cx.cos(&center.x_rotation));
        let rx_sin = &center.rx * &sin_t;
        let ry_cos = &center.ry * &cos_t;
        let mut dx = cx.round(&(&-(&rx_sin * &cos_phi) - &(&ry_cos * &sin_phi)));
        let mut dy = cx.round(&(&(&ry_cos * &cos_phi) - &(&rx_sin * &sin_phi)));
        if center.sweep_angle.is_negative() {
            dx = -dx;
            dy = -dy;
        }
        cx.atan2(&dy, &dx)
    };

    let start = tangent_at(&center.start_angle);
    let end_angle = cx.round(&(&center.start_angle + &center.sweep_angle));
    let end = tangent_at(&end_angle);
    Ok((Some(start), Some(end)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::flatten_str;
    use crate::FlattenOptions;
    use svgbake_path::parser::parse_path;

    fn options() -> FlattenOptions {
        FlattenOptions::DEFAULT
            .without_use_resolution()
            .without_patterns()
            .without_masks()
            .without_clip_paths()
            .without_gradient_baking()
            .without_transform_flattening()
            .keep_unused_defs()
    }

    #[test]
    fn tangents_of_a_polyline() {
        let cx = Context::default();
        let path = parse_path("M 0 0 L 10 0 L 10 10").unwrap();
        let vertices = vertex_tangents(&path, &cx).unwrap();
        assert_eq!(vertices.len(), 3);
        // First segment points along +x.
        assert!(vertices[0].outgoing.as_ref().unwrap().is_zero());
        // Joint: in +x, out +y.
        let half_pi = &cx.pi() * &"0.5".parse().unwrap();
        assert!(vertices[1].incoming.as_ref().unwrap().is_zero());
        assert!(vertices[1]
            .outgoing
            .as_ref()
            .unwrap()
            .approx_eq(&half_pi, &cx.tolerance()));
        // End: in +y, no out.
        assert!(vertices[2]
            .incoming
            .as_ref()
            .unwrap()
            .approx_eq(&half_pi, &cx.tolerance()));
        assert!(vertices[2].outgoing.is_none());
    }

    #[test]
    fn bisector_at_right_angle() {
        let cx = Context::default();
        let quarter_pi = &cx.pi() * &"0.25".parse().unwrap();
        let v = Vertex {
            at: point(Decimal::zero(), Decimal::zero()),
            incoming: Some(Decimal::zero()),
            outgoing: Some(&cx.pi() * &"0.5".parse().unwrap()),
        };
        let angle = bisector_angle(&v, &cx);
        assert!(angle.approx_eq(&quarter_pi, &cx.tolerance()));
    }

    #[test]
    fn markers_cloned_at_vertices() {
        let src = r#"<svg><defs><marker id="dot" refX="1" refY="1"><circle cx="1" cy="1" r="1"/></marker></defs><path d="M 0 0 L 10 0 L 10 10" marker-start="url(#dot)" marker-mid="url(#dot)" marker-end="url(#dot)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        assert_eq!(out.stats.markers_resolved, 3);
        assert!(!out.svg.contains("marker-start"));
        assert!(out.svg.contains(r#"translate(10 0)"#));
        assert!(out.svg.contains(r#"translate(-1 -1)"#));
    }

    #[test]
    fn orient_auto_rotates() {
        let src = r#"<svg><defs><marker id="arrow" orient="auto"><path d="M 0 0 L 1 0"/></marker></defs><path d="M 0 0 L 0 10" marker-end="url(#arrow)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        assert_eq!(out.stats.markers_resolved, 1);
        assert!(out.svg.contains("rotate(90"));
    }

    #[test]
    fn unknown_marker_warns() {
        let src = r#"<svg><path d="M 0 0 L 1 0" marker-end="url(#ghost)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        assert_eq!(out.stats.markers_resolved, 0);
        assert!(out.stats.warnings.iter().any(|w| w.contains("ghost")));
    }
}
