//! Stage 6: gradientTransform baking.
//!
//! A gradient with a `gradientTransform` is cloned on first bake: the
//! clone gets a fresh id, transformed coordinates and no transform
//! attribute, and every referencing paint is rewritten to it. The
//! original stays behind for the defs sweep to collect once nothing
//! points at it. Radial radii scale by the average column norm of the
//! linear part.

use std::collections::HashMap;

use svgbake_decimal::{Context, Decimal};
use svgbake_linalg::{point, Matrix, Point};

use crate::dom::{Document, NodeId};
use crate::pipeline::{attr_decimal, url_reference, Flattener};
use crate::verify;
use crate::{transform, ErrorKind, FlattenError, FlattenStats, Stage};

pub(crate) fn run(
    fl: &Flattener,
    doc: &mut Document,
    stats: &mut FlattenStats,
) -> Result<(), FlattenError> {
    // gradient id → referencing (element, attribute) pairs.
    let mut references: HashMap<String, Vec<(NodeId, &'static str)>> = HashMap::new();
    for n in doc.descendants(doc.root()) {
        if !doc.is_element(n) {
            continue;
        }
        for attr in ["fill", "stroke"] {
            if let Some(id) = doc.attribute(n, attr).and_then(url_reference) {
                references.entry(id.to_string()).or_default().push((n, attr));
            }
        }
    }

    let mut ids: Vec<String> = references.keys().cloned().collect();
    ids.sort();

    for id in ids {
        fl.poll_cancel(Stage::Gradients)?;
        let gradient = match doc.element_by_id(&id) {
            Some(g) => g,
            None => continue,
        };
        let kind = match doc.local_tag(gradient) {
            "linearGradient" => GradientKind::Linear,
            "radialGradient" => GradientKind::Radial,
            _ => continue,
        };
        stats.gradients_processed += 1;

        let list = match doc.attribute(gradient, "gradientTransform") {
            Some(t) => t.to_string(),
            None => continue,
        };
        let m = match transform::parse_transform_list(&list, fl.context()) {
            Ok(m) => m,
            Err(e) => {
                stats.warn(Stage::Gradients, e.to_string());
                continue;
            }
        };

        if let Some(new_id) = bake(fl, doc, gradient, kind, &m, &id, stats)? {
            for (element, attr) in &references[&id] {
                doc.set_attribute(*element, attr, format!("url(#{})", new_id));
            }
        }
    }
    Ok(())
}

#[derive(Copy, Clone, PartialEq)]
enum GradientKind {
    Linear,
    Radial,
}

fn fmt(value: &Decimal) -> String {
    svgbake_path::serialize::format_number(value, 40)
}

// Returns the clone's id once baked. Recoverable problems warn and
// return `None`; only cancellation and strict verification failures
// propagate.
fn bake(
    fl: &Flattener,
    doc: &mut Document,
    gradient: NodeId,
    kind: GradientKind,
    m: &Matrix,
    id: &str,
    stats: &mut FlattenStats,
) -> Result<Option<String>, FlattenError> {
    let cx = fl.context();

    // Percentage coordinates cannot be baked numerically.
    let coords = match kind {
        GradientKind::Linear => &["x1", "y1", "x2", "y2"][..],
        GradientKind::Radial => &["cx", "cy", "r", "fx", "fy"][..],
    };
    for name in coords {
        if let Some(value) = doc.attribute(gradient, name) {
            if value.trim().ends_with('%') {
                stats.warn(
                    Stage::Gradients,
                    format!("gradient {} uses percentage {}; left unbaked", id, name),
                );
                return Ok(None);
            }
        }
    }

    let prepared = prepare_attributes(fl, doc, gradient, kind, m);
    let baked = match prepared {
        Ok(b) => b,
        Err(kind) => {
            stats.warn(Stage::Gradients, kind.to_string());
            return Ok(None);
        }
    };

    let clone = doc.clone_subtree(gradient);
    let new_id = unique_baked_id(doc, id);
    doc.set_attribute(clone, "id", new_id.clone());
    doc.remove_attribute(clone, "gradientTransform");
    for (name, value) in &baked.attributes {
        doc.set_attribute(clone, name, value.clone());
    }
    doc.insert_after(gradient, clone);

    let v = verify::gradient_endpoints(m, &baked.original_points, &baked.mapped_points, cx);
    fl.record_verification(Stage::Gradients, Some(id), v, stats)?;

    Ok(Some(new_id))
}

struct BakedAttributes {
    attributes: Vec<(&'static str, String)>,
    original_points: Vec<Point>,
    mapped_points: Vec<Point>,
}

fn prepare_attributes(
    fl: &Flattener,
    doc: &Document,
    gradient: NodeId,
    kind: GradientKind,
    m: &Matrix,
) -> Result<BakedAttributes, ErrorKind> {
    let cx = fl.context();
    match kind {
        GradientKind::Linear => {
            // Defaults are the objectBoundingBox 0..1 span.
            let x1 = attr_decimal(doc, gradient, "x1")?.unwrap_or_else(Decimal::zero);
            let y1 = attr_decimal(doc, gradient, "y1")?.unwrap_or_else(Decimal::zero);
            let x2 = attr_decimal(doc, gradient, "x2")?.unwrap_or_else(Decimal::one);
            let y2 = attr_decimal(doc, gradient, "y2")?.unwrap_or_else(Decimal::zero);

            let p1 = transform::transform_point(m, &x1, &y1, cx)?;
            let p2 = transform::transform_point(m, &x2, &y2, cx)?;
            Ok(BakedAttributes {
                attributes: vec![
                    ("x1", fmt(&p1.x)),
                    ("y1", fmt(&p1.y)),
                    ("x2", fmt(&p2.x)),
                    ("y2", fmt(&p2.y)),
                ],
                original_points: vec![point(x1, y1), point(x2, y2)],
                mapped_points: vec![p1, p2],
            })
        }
        GradientKind::Radial => {
            let half = Decimal::pow10(-1) * Decimal::from(5);
            let ccx = attr_decimal(doc, gradient, "cx")?.unwrap_or_else(|| half.clone());
            let ccy = attr_decimal(doc, gradient, "cy")?.unwrap_or_else(|| half.clone());
            let r = attr_decimal(doc, gradient, "r")?.unwrap_or(half);
            let fx = attr_decimal(doc, gradient, "fx")?.unwrap_or_else(|| ccx.clone());
            let fy = attr_decimal(doc, gradient, "fy")?.unwrap_or_else(|| ccy.clone());

            let c = transform::transform_point(m, &ccx, &ccy, cx)?;
            let f = transform::transform_point(m, &fx, &fy, cx)?;
            let scale = average_column_norm(m, cx)?;
            let new_r = cx.round(&(&r * &scale));

            Ok(BakedAttributes {
                attributes: vec![
                    ("cx", fmt(&c.x)),
                    ("cy", fmt(&c.y)),
                    ("fx", fmt(&f.x)),
                    ("fy", fmt(&f.y)),
                    ("r", fmt(&new_r)),
                ],
                original_points: vec![point(ccx, ccy), point(fx, fy)],
                mapped_points: vec![c, f],
            })
        }
    }
}

// (|column 0| + |column 1|) / 2 of the linear part.
fn average_column_norm(m: &Matrix, cx: &Context) -> Result<Decimal, ErrorKind> {
    let col0 = cx
        .sqrt(&(&(m.get(0, 0) * m.get(0, 0)) + &(m.get(1, 0) * m.get(1, 0))))
        .map_err(ErrorKind::Numeric)?;
    let col1 = cx
        .sqrt(&(&(m.get(0, 1) * m.get(0, 1)) + &(m.get(1, 1) * m.get(1, 1))))
        .map_err(ErrorKind::Numeric)?;
    let half = Decimal::pow10(-1) * Decimal::from(5);
    Ok(cx.round(&(&(&col0 + &col1) * &half)))
}

fn unique_baked_id(doc: &Document, id: &str) -> String {
    let base = format!("{}-baked", id);
    if doc.element_by_id(&base).is_none() {
        return base;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}-baked-{}", id, n);
        if doc.element_by_id(&candidate).is_none() {
            return candidate;
        }
        n += 1;
    }
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
            .without_clip_paths()
            .without_transform_flattening()
            .keep_unused_defs()
    }

    #[test]
    fn linear_gradient_baked_and_rewired() {
        let src = r#"<svg><defs><linearGradient id="g" x1="0" y1="0" x2="10" y2="0" gradientUnits="userSpaceOnUse" gradientTransform="translate(5,5)"/></defs><rect width="10" height="10" fill="url(#g)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        assert_eq!(out.stats.gradients_processed, 1);
        assert!(out.svg.contains(r#"fill="url(#g-baked)""#));
        assert!(out.svg.contains(r#"<linearGradient id="g-baked" x1="5" y1="5" x2="15" y2="5""#));
        assert!(!out.svg.contains(r#"id="g-baked" x1="5" y1="5" x2="15" y2="5" gradientTransform"#));
        assert_eq!(out.stats.verification_failures(), 0);
    }

    #[test]
    fn radial_radius_scales_by_column_norm() {
        let src = r#"<svg><defs><radialGradient id="g" cx="0" cy="0" r="10" gradientUnits="userSpaceOnUse" gradientTransform="scale(2,4)"/></defs><rect width="10" height="10" fill="url(#g)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        // (2 + 4) / 2 = 3 → r = 30.
        assert!(out.svg.contains(r#"r="30""#));
        assert!(out.svg.contains(r#"cx="0""#));
    }

    #[test]
    fn untransformed_gradient_counted_but_untouched() {
        let src = r#"<svg><defs><linearGradient id="g" x1="0" y1="0" x2="1" y2="0"/></defs><rect width="4" height="4" fill="url(#g)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        assert_eq!(out.stats.gradients_processed, 1);
        assert!(out.svg.contains(r#"fill="url(#g)""#));
    }

    #[test]
    fn percentage_coordinates_skip_baking() {
        let src = r#"<svg><defs><linearGradient id="g" x1="0%" x2="100%" gradientTransform="scale(2)"/></defs><rect width="4" height="4" fill="url(#g)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        assert!(out.svg.contains("gradientTransform"));
        assert!(out.stats.warnings.iter().any(|w| w.contains("percentage")));
    }
}
