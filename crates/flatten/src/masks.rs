//! Stage 4: mask-to-clip conversion.
//!
//! A mask whose content is plain binary geometry (no gradients, patterns,
//! images or filters anywhere below it) is equivalent to a clip path.
//! Those masks are rewritten into `clipPath` definitions and the masked
//! elements get a `clip-path` reference instead, which stage 5 then
//! realizes as a boolean intersection. Masks with soft content pass
//! through untouched, with a warning.

use crate::dom::{Document, NodeId};
use crate::patterns::ensure_defs;
use crate::pipeline::{url_reference, Flattener};
use crate::{ErrorKind, FlattenError, FlattenStats, Stage};

pub(crate) fn run(
    fl: &Flattener,
    doc: &mut Document,
    stats: &mut FlattenStats,
) -> Result<(), FlattenError> {
    let masked: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&n| doc.is_element(n) && doc.attribute(n, "mask").is_some())
        .collect();

    for node in masked {
        fl.poll_cancel(Stage::Masks)?;
        let mask_id = match doc.attribute(node, "mask").and_then(url_reference) {
            Some(id) => id.to_string(),
            None => {
                stats.warn(Stage::Masks, "mask attribute is not a url() reference");
                continue;
            }
        };
        let mask = match doc.element_by_id(&mask_id) {
            Some(m) if doc.local_tag(m) == "mask" => m,
            _ => {
                stats.warn(
                    Stage::Masks,
                    ErrorKind::UnresolvedReference(mask_id).to_string(),
                );
                continue;
            }
        };

        if let Some(soft) = soft_content(doc, mask) {
            stats.warn(
                Stage::Masks,
                format!(
                    "mask {} uses {}; passing it through unconverted",
                    mask_id, soft
                ),
            );
            continue;
        }

        let clip_id = unique_clip_id(doc, &mask_id);
        let clip = doc.create_element("clipPath");
        doc.set_attribute(clip, "id", clip_id.clone());
        for child in doc.children(mask) {
            let copy = doc.clone_subtree(child);
            doc.append_child(clip, copy);
        }
        let defs = ensure_defs(doc);
        doc.append_child(defs, clip);

        doc.remove_attribute(node, "mask");
        doc.set_attribute(node, "clip-path", format!("url(#{})", clip_id));
        stats.masks_resolved += 1;
    }
    Ok(())
}

// Anything below the mask that cannot be expressed as a hard clip.
fn soft_content(doc: &Document, mask: NodeId) -> Option<&'static str> {
    for node in doc.descendants(mask) {
        if !doc.is_element(node) {
            continue;
        }
        match doc.local_tag(node) {
            "linearGradient" | "radialGradient" => return Some("a gradient"),
            "pattern" => return Some("a pattern"),
            "image" => return Some("an image"),
            "filter" => return Some("a filter"),
            _ => {}
        }
        for attr in ["fill", "stroke", "filter"] {
            if let Some(id) = doc.attribute(node, attr).and_then(url_reference) {
                if let Some(target) = doc.element_by_id(id) {
                    match doc.local_tag(target) {
                        "linearGradient" | "radialGradient" => return Some("a gradient"),
                        "pattern" => return Some("a pattern"),
                        "filter" => return Some("a filter"),
                        _ => {}
                    }
                }
            }
        }
    }
    None
}

fn unique_clip_id(doc: &Document, mask_id: &str) -> String {
    let base = format!("{}-clip", mask_id);
    if doc.element_by_id(&base).is_none() {
        return base;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}-clip-{}", mask_id, n);
        if doc.element_by_id(&candidate).is_none() {
            return candidate;
        }
        n += 1;
    }
}
