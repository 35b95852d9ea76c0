//! Stage 1: `<use>`/`<symbol>` expansion.
//!
//! Every `<use>` is replaced by a `<g>` wrapping a clone of the referenced
//! subtree. The group carries the use element's transform followed by
//! `translate(x, y)` (the translate applies to the content first, which is
//! what the SVG generated-content rules prescribe). Symbols contribute
//! their children, with their viewBox honored when the use element gives a
//! width and height.
//!
//! Dangling references and cycles are recoverable: the offending `<use>`
//! stays in the document and a warning is recorded.

use crate::dom::{Document, NodeId};
use crate::pipeline::{attr_decimal, href_target, matrix_attribute, Flattener};
use crate::{transform, ErrorKind, FlattenError, FlattenStats, Stage};

use svgbake_decimal::Decimal;
use svgbake_linalg::Matrix;

pub(crate) fn run(
    fl: &Flattener,
    doc: &mut Document,
    stats: &mut FlattenStats,
) -> Result<(), FlattenError> {
    let uses: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&n| is_use(doc, n))
        .collect();

    for use_node in uses {
        fl.poll_cancel(Stage::ResolveUse)?;
        let mut stack = Vec::new();
        expand(fl, doc, use_node, &mut stack, stats)?;
    }
    Ok(())
}

fn is_use(doc: &Document, node: NodeId) -> bool {
    doc.is_element(node) && doc.local_tag(node) == "use"
}

// Attributes that configure the use element itself and do not transfer to
// the generated group.
const CONSUMED: &[&str] = &["x", "y", "width", "height", "href", "xlink:href", "transform"];

fn expand(
    fl: &Flattener,
    doc: &mut Document,
    use_node: NodeId,
    stack: &mut Vec<String>,
    stats: &mut FlattenStats,
) -> Result<(), FlattenError> {
    let target_id = match href_target(doc, use_node) {
        Some(id) => id,
        None => {
            stats.warn(Stage::ResolveUse, "use element without a local href");
            return Ok(());
        }
    };
    if stack.iter().any(|id| *id == target_id) {
        stats.warn(
            Stage::ResolveUse,
            ErrorKind::ReferenceCycle(target_id).to_string(),
        );
        return Ok(());
    }
    let target = match doc.element_by_id(&target_id) {
        Some(t) => t,
        None => {
            stats.warn(
                Stage::ResolveUse,
                ErrorKind::UnresolvedReference(target_id).to_string(),
            );
            return Ok(());
        }
    };

    let x = match attr_decimal(doc, use_node, "x") {
        Ok(v) => v.unwrap_or_else(Decimal::zero),
        Err(kind) => {
            stats.warn(Stage::ResolveUse, kind.to_string());
            return Ok(());
        }
    };
    let y = match attr_decimal(doc, use_node, "y") {
        Ok(v) => v.unwrap_or_else(Decimal::zero),
        Err(kind) => {
            stats.warn(Stage::ResolveUse, kind.to_string());
            return Ok(());
        }
    };

    let mut transform_parts: Vec<String> = Vec::new();
    if let Some(t) = doc.attribute(use_node, "transform") {
        transform_parts.push(t.to_string());
    }
    if !x.is_zero() || !y.is_zero() {
        transform_parts.push(format!("translate({} {})", x, y));
    }

    let is_symbol = doc.local_tag(target) == "symbol";
    if is_symbol {
        match symbol_viewport(fl, doc, use_node, target) {
            Ok(Some(m)) => transform_parts.push(matrix_attribute(&m)),
            Ok(None) => {}
            Err(kind) => {
                stats.warn(Stage::ResolveUse, kind.to_string());
                return Ok(());
            }
        }
    }

    let group = doc.create_element("g");
    if !transform_parts.is_empty() {
        doc.set_attribute(group, "transform", transform_parts.join(" "));
    }
    // Remaining attributes transfer to the group, per the SVG
    // generated-content rules.
    for (name, value) in doc.attributes(use_node).to_vec() {
        if CONSUMED.contains(&name.as_str()) || name.starts_with("xmlns") {
            continue;
        }
        doc.set_attribute(group, &name, value);
    }

    if is_symbol {
        for child in doc.children(target) {
            let copy = doc.clone_subtree(child);
            doc.append_child(group, copy);
        }
    } else {
        let copy = doc.clone_subtree(target);
        // The clone's id would collide with the definition's.
        doc.remove_attribute(copy, "id");
        doc.append_child(group, copy);
    }

    doc.replace_node(use_node, group);
    stats.use_resolved += 1;

    // Freshly inserted content may itself contain use elements.
    stack.push(target_id);
    let nested: Vec<NodeId> = doc
        .descendants(group)
        .into_iter()
        .filter(|&n| is_use(doc, n))
        .collect();
    for nested_use in nested {
        expand(fl, doc, nested_use, stack, stats)?;
    }
    stack.pop();

    Ok(())
}

// The symbol's viewBox-to-viewport matrix, when the use element provides
// a viewport.
fn symbol_viewport(
    fl: &Flattener,
    doc: &Document,
    use_node: NodeId,
    symbol: NodeId,
) -> Result<Option<Matrix>, ErrorKind> {
    let vb_attr = match doc.attribute(symbol, "viewBox") {
        Some(vb) => vb,
        None => return Ok(None),
    };
    let width = attr_decimal(doc, use_node, "width")?;
    let height = attr_decimal(doc, use_node, "height")?;
    let (width, height) = match (width, height) {
        (Some(w), Some(h)) if w.is_positive() && h.is_positive() => (w, h),
        _ => return Ok(None),
    };

    let vb = transform::parse_view_box(vb_attr)?;
    let par = match doc.attribute(symbol, "preserveAspectRatio") {
        Some(src) => transform::parse_preserve_aspect_ratio(src)?,
        None => transform::PreserveAspectRatio::DEFAULT,
    };
    transform::view_box_transform(&vb, &width, &height, &par, fl.context()).map(Some)
}
