//! Stage 3: pattern expansion.
//!
//! A paint referencing a `<pattern>` becomes concrete tiles: the pattern
//! content is cloned once per tile across the bounding box of the painted
//! element, and the whole tiling is clipped by the element's own geometry
//! through a generated `clipPath`. The painted element keeps its outline
//! with the pattern paint removed.

use svgbake_algorithms::polygon::sample_path;
use svgbake_decimal::{Context, Decimal};
use svgbake_linalg::Point;
use svgbake_path::serialize::path_to_string;

use crate::dom::{Document, NodeId};
use crate::pipeline::{attr_decimal, element_geometry, url_reference, Flattener};
use crate::{ErrorKind, FlattenError, FlattenStats, Stage};

// Tiling never exceeds this many tiles per axis; tiny tile sizes against
// huge bounding boxes would otherwise explode the document.
const MAX_TILES_PER_AXIS: u32 = 64;

pub(crate) fn run(
    fl: &Flattener,
    doc: &mut Document,
    stats: &mut FlattenStats,
) -> Result<(), FlattenError> {
    let mut candidates: Vec<(NodeId, &'static str)> = Vec::new();
    for n in doc.descendants(doc.root()) {
        if doc.is_element(n) {
            candidates.push((n, "fill"));
            candidates.push((n, "stroke"));
        }
    }

    for (node, paint_attr) in candidates {
        fl.poll_cancel(Stage::Patterns)?;
        let pattern_id = match doc.attribute(node, paint_attr).and_then(url_reference) {
            Some(id) => id.to_string(),
            None => continue,
        };
        let pattern = match doc.element_by_id(&pattern_id) {
            Some(p) if doc.local_tag(p) == "pattern" => p,
            Some(_) => continue,
            None => continue,
        };
        if let Err(kind) = expand(fl, doc, node, paint_attr, pattern, stats) {
            stats.warn(Stage::Patterns, kind.to_string());
        }
    }
    Ok(())
}

struct TileGrid {
    origin_x: Decimal,
    origin_y: Decimal,
    step_x: Decimal,
    step_y: Decimal,
    count_x: u32,
    count_y: u32,
    truncated: bool,
}

fn expand(
    fl: &Flattener,
    doc: &mut Document,
    node: NodeId,
    paint_attr: &str,
    pattern: NodeId,
    stats: &mut FlattenStats,
) -> Result<(), ErrorKind> {
    let cx = fl.context();

    let geometry = match element_geometry(fl, doc, node)? {
        Some(g) => g,
        None => return Ok(()),
    };
    let sampled = sample_path(&geometry.path, 16, cx)?;
    let bbox = match sampled.bounding_box() {
        Some(b) => b,
        None => return Ok(()),
    };

    let grid = tile_grid(doc, pattern, &bbox, cx)?;
    if grid.truncated {
        stats.warn(
            Stage::Patterns,
            format!(
                "pattern {} tiling truncated at {} tiles per axis",
                doc.attribute(pattern, "id").unwrap_or("<anonymous>"),
                MAX_TILES_PER_AXIS
            ),
        );
    }

    // The element's own outline clips the tiling.
    let clip_id = format!("pattern-clip-{}", stats.patterns_resolved);
    let clip_path = doc.create_element("clipPath");
    doc.set_attribute(clip_path, "id", clip_id.clone());
    let clip_shape = doc.create_element("path");
    let shape_d = path_to_string(&geometry.path, fl.options().precision);
    doc.set_attribute(clip_shape, "d", shape_d);
    doc.append_child(clip_path, clip_shape);
    let defs = ensure_defs(doc);
    doc.append_child(defs, clip_path);

    let tiling = doc.create_element("g");
    doc.set_attribute(tiling, "clip-path", format!("url(#{})", clip_id));

    let pattern_children = doc.children(pattern);
    for ix in 0..grid.count_x {
        for iy in 0..grid.count_y {
            let tx = &grid.origin_x + &(&grid.step_x * &Decimal::from(ix));
            let ty = &grid.origin_y + &(&grid.step_y * &Decimal::from(iy));
            let tile = doc.create_element("g");
            doc.set_attribute(tile, "transform", format!("translate({} {})", tx, ty));
            for child in &pattern_children {
                let copy = doc.clone_subtree(*child);
                doc.append_child(tile, copy);
            }
            doc.append_child(tiling, tile);
        }
    }

    doc.insert_after(node, tiling);
    doc.set_attribute(node, paint_attr, "none");
    stats.patterns_resolved += 1;
    Ok(())
}

fn tile_grid(
    doc: &Document,
    pattern: NodeId,
    bbox: &(Point, Point),
    cx: &Context,
) -> Result<TileGrid, ErrorKind> {
    let (min, max) = bbox;
    let bbox_w = &max.x - &min.x;
    let bbox_h = &max.y - &min.y;

    let width = attr_decimal(doc, pattern, "width")?;
    let height = attr_decimal(doc, pattern, "height")?;
    let (width, height) = match (width, height) {
        (Some(w), Some(h)) if w.is_positive() && h.is_positive() => (w, h),
        _ => {
            return Err(ErrorKind::UnresolvedReference(
                "pattern without a positive width and height".into(),
            ))
        }
    };
    let x = attr_decimal(doc, pattern, "x")?.unwrap_or_else(Decimal::zero);
    let y = attr_decimal(doc, pattern, "y")?.unwrap_or_else(Decimal::zero);

    let object_units = doc
        .attribute(pattern, "patternUnits")
        .map(|u| u != "userSpaceOnUse")
        .unwrap_or(true);

    let (step_x, step_y, mut origin_x, mut origin_y) = if object_units {
        // Fractions of the bounding box.
        (
            cx.round(&(&width * &bbox_w)),
            cx.round(&(&height * &bbox_h)),
            cx.round(&(&min.x + &(&x * &bbox_w))),
            cx.round(&(&min.y + &(&y * &bbox_h))),
        )
    } else {
        (width, height, x, y)
    };

    // Shift the origin back so the grid covers the box from its low edge.
    let shift = |origin: &Decimal, low: &Decimal, step: &Decimal| -> Result<Decimal, ErrorKind> {
        let offset = cx.div(&(low - origin), step).map_err(ErrorKind::Numeric)?;
        let steps = offset.floor();
        Ok(cx.round(&(origin + &(&steps * step))))
    };
    origin_x = shift(&origin_x, &min.x, &step_x)?;
    origin_y = shift(&origin_y, &min.y, &step_y)?;

    let count = |low: &Decimal, high: &Decimal, step: &Decimal| -> Result<(u32, bool), ErrorKind> {
        let span = high - low;
        let exact = cx.div(&span, step).map_err(ErrorKind::Numeric)?;
        let mut needed = exact.floor().to_f64() as i64 + 2;
        if needed < 1 {
            needed = 1;
        }
        if needed > MAX_TILES_PER_AXIS as i64 {
            Ok((MAX_TILES_PER_AXIS, true))
        } else {
            Ok((needed as u32, false))
        }
    };
    let (count_x, trunc_x) = count(&origin_x, &max.x, &step_x)?;
    let (count_y, trunc_y) = count(&origin_y, &max.y, &step_y)?;

    Ok(TileGrid {
        origin_x,
        origin_y,
        step_x,
        step_y,
        count_x,
        count_y,
        truncated: trunc_x || trunc_y,
    })
}

// The first <defs> under the root, created on demand.
pub(crate) fn ensure_defs(doc: &mut Document) -> NodeId {
    let root = doc.root();
    for child in doc.children(root) {
        if doc.is_element(child) && doc.local_tag(child) == "defs" {
            return child;
        }
    }
    let defs = doc.create_element("defs");
    doc.append_child(root, defs);
    defs
}

#[cfg(test)]
mod tests {
    use crate::pipeline::flatten_str;
    use crate::FlattenOptions;

    fn options() -> FlattenOptions {
        FlattenOptions::DEFAULT
            .without_use_resolution()
            .without_markers()
            .without_masks()
            .without_clip_paths()
            .without_gradient_baking()
            .without_transform_flattening()
            .keep_unused_defs()
    }

    #[test]
    fn user_space_pattern_tiles() {
        let src = r#"<svg><defs><pattern id="p" width="10" height="10" patternUnits="userSpaceOnUse"><circle cx="5" cy="5" r="2"/></pattern></defs><rect width="20" height="10" fill="url(#p)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        assert_eq!(out.stats.patterns_resolved, 1);
        assert!(out.svg.contains(r#"clip-path="url(#pattern-clip-0)""#));
        assert!(out.svg.contains(r#"fill="none""#));
        // At least 3 tiles across, 2 down.
        assert!(out.svg.matches("<circle").count() >= 6);
    }

    #[test]
    fn object_bounding_box_fractions() {
        let src = r#"<svg><defs><pattern id="p" width="0.5" height="0.5"><rect width="1" height="1"/></pattern></defs><rect x="10" y="10" width="20" height="20" fill="url(#p)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        assert_eq!(out.stats.patterns_resolved, 1);
        // Tiles step by half the bounding box (10 units).
        assert!(out.svg.contains(r#"translate(10 10)"#));
        assert!(out.svg.contains(r#"translate(20 20)"#));
    }

    #[test]
    fn pattern_without_size_warns() {
        let src = r#"<svg><defs><pattern id="p"><rect width="1" height="1"/></pattern></defs><rect width="5" height="5" fill="url(#p)"/></svg>"#;
        let out = flatten_str(src, &options()).unwrap();
        assert_eq!(out.stats.patterns_resolved, 0);
        assert!(!out.stats.warnings.is_empty());
    }
}
