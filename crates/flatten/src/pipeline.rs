//! The pipeline orchestrator.
//!
//! Eight stages run in a fixed order over the mutable DOM; each stage
//! increments its counter, records warnings for recoverable failures and
//! feeds the verification layer. A per-element failure leaves the element
//! unchanged; only cancellation and (under strict verification) a failed
//! check abort the run.

use svgbake_decimal::{Context, Decimal};
use svgbake_linalg::{point, Matrix, Point};
use svgbake_path::absolute::path_to_absolute;
use svgbake_path::parser::{parse_decimal, parse_path};
use svgbake_path::serialize::path_to_string;
use svgbake_path::Path;

use crate::dom::{Document, NodeId};
use crate::verify::{self, VerificationMode};
use crate::{
    clips, gradients, markers, masks, patterns, transform, use_resolve, CancellationToken,
    ErrorKind, FlattenError, FlattenOptions, FlattenStats, Stage, Verification,
};

/// The result of a flatten run: the serialized document plus stats.
#[derive(Clone, Debug)]
pub struct FlattenOutput {
    pub svg: String,
    pub stats: FlattenStats,
}

/// Convenience wrapper around [`Flattener`].
pub fn flatten_str(src: &str, options: &FlattenOptions) -> Result<FlattenOutput, FlattenError> {
    Flattener::new(options.clone()).flatten_str(src)
}

/// One configured pipeline instance.
///
/// The decimal [`Context`] is built from the options' working precision
/// when the flattener is created and shared by every stage.
pub struct Flattener {
    options: FlattenOptions,
    cancel: Option<CancellationToken>,
    cx: Context,
}

impl Flattener {
    pub fn new(options: FlattenOptions) -> Flattener {
        let cx = Context::new(options.working_precision);
        Flattener {
            options,
            cancel: None,
            cx,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Flattener {
        self.cancel = Some(token);
        self
    }

    pub fn options(&self) -> &FlattenOptions {
        &self.options
    }

    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn flatten_str(&self, src: &str) -> Result<FlattenOutput, FlattenError> {
        let mut doc = Document::parse(src)
            .map_err(|kind| FlattenError::new(Stage::Parse, None, kind))?;
        let stats = self.flatten_document(&mut doc)?;
        Ok(FlattenOutput {
            svg: doc.to_svg_string(),
            stats,
        })
    }

    /// Run the stages over an already parsed document.
    pub fn flatten_document(&self, doc: &mut Document) -> Result<FlattenStats, FlattenError> {
        let mut stats = FlattenStats::default();

        self.poll_cancel(Stage::ResolveUse)?;
        if self.options.resolve_use {
            use_resolve::run(self, doc, &mut stats)?;
        }
        self.poll_cancel(Stage::Markers)?;
        if self.options.resolve_markers {
            markers::run(self, doc, &mut stats)?;
        }
        self.poll_cancel(Stage::Patterns)?;
        if self.options.resolve_patterns {
            patterns::run(self, doc, &mut stats)?;
        }
        self.poll_cancel(Stage::Masks)?;
        if self.options.resolve_masks {
            masks::run(self, doc, &mut stats)?;
        }
        self.poll_cancel(Stage::ClipPaths)?;
        if self.options.resolve_clip_paths {
            clips::run(self, doc, &mut stats)?;
        }
        self.poll_cancel(Stage::Gradients)?;
        if self.options.bake_gradients {
            gradients::run(self, doc, &mut stats)?;
        }
        self.poll_cancel(Stage::Transforms)?;
        if self.options.flatten_transforms {
            self.flatten_transforms(doc, &mut stats)?;
        }
        self.poll_cancel(Stage::DefsSweep)?;
        if self.options.remove_unused_defs {
            self.sweep_defs(doc);
        }

        Ok(stats)
    }

    pub(crate) fn poll_cancel(&self, stage: Stage) -> Result<(), FlattenError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => {
                Err(FlattenError::new(stage, None, ErrorKind::Cancelled))
            }
            _ => Ok(()),
        }
    }

    /// Record a verification outcome; fatal under strict mode.
    pub(crate) fn record_verification(
        &self,
        stage: Stage,
        element: Option<&str>,
        verification: Verification,
        stats: &mut FlattenStats,
    ) -> Result<(), FlattenError> {
        let failed = !verification.valid;
        let message = format!(
            "{} check failed: {}",
            verification.category.name(),
            verification.message
        );
        stats.verifications.push(verification);
        if failed {
            if self.options.verification == VerificationMode::Strict {
                return Err(FlattenError::new(
                    stage,
                    element.map(str::to_string),
                    ErrorKind::VerificationFailed(message),
                ));
            }
            stats.warn(stage, message);
        }
        Ok(())
    }

    // Stage 7: accumulate CTMs down the tree and bake them into `d`.
    fn flatten_transforms(
        &self,
        doc: &mut Document,
        stats: &mut FlattenStats,
    ) -> Result<(), FlattenError> {
        let root = doc.root();
        let identity = Matrix::identity(3);
        self.walk_transforms(doc, root, &identity, false, stats)
    }

    fn walk_transforms(
        &self,
        doc: &mut Document,
        node: NodeId,
        parent_ctm: &Matrix,
        parent_transformed: bool,
        stats: &mut FlattenStats,
    ) -> Result<(), FlattenError> {
        if !doc.is_element(node) {
            return Ok(());
        }
        self.poll_cancel(Stage::Transforms)?;
        let cx = &self.cx;
        let element_id = doc.attribute(node, "id").map(str::to_string);

        let mut ctm = parent_ctm.clone();
        let mut transformed = parent_transformed;

        // Nested viewports fold their viewBox mapping into the CTM.
        if doc.local_tag(node) == "svg" {
            if let Some(vb_attr) = doc.attribute(node, "viewBox").map(str::to_string) {
                match self.view_box_matrix(doc, node, &vb_attr) {
                    Ok(m) => {
                        ctm = ctm.mul(&m, cx).map_err(|e| {
                            FlattenError::new(
                                Stage::Transforms,
                                element_id.clone(),
                                ErrorKind::LinAlg(e),
                            )
                        })?;
                        transformed = true;
                        doc.remove_attribute(node, "viewBox");
                        doc.remove_attribute(node, "preserveAspectRatio");
                    }
                    Err(kind) => stats.warn(Stage::Transforms, kind.to_string()),
                }
            }
        }

        if let Some(list) = doc.attribute(node, "transform").map(str::to_string) {
            match transform::parse_transform_list(&list, cx) {
                Ok(m) => {
                    ctm = ctm.mul(&m, cx).map_err(|e| {
                        FlattenError::new(
                            Stage::Transforms,
                            element_id.clone(),
                            ErrorKind::LinAlg(e),
                        )
                    })?;
                    transformed = true;
                    doc.remove_attribute(node, "transform");
                }
                Err(kind) => {
                    // A transform that does not parse leaves the whole
                    // subtree untouched.
                    stats.warn(
                        Stage::Transforms,
                        format!(
                            "skipping element {}: {}",
                            element_id.as_deref().unwrap_or("<anonymous>"),
                            kind
                        ),
                    );
                    return Ok(());
                }
            }
        }

        match element_geometry(self, doc, node) {
            Ok(Some(geometry)) => {
                self.bake_element(doc, node, &geometry, &ctm, transformed, &element_id, stats)?;
            }
            Ok(None) => {}
            Err(kind) => stats.warn(
                Stage::Transforms,
                format!(
                    "leaving element {} unchanged: {}",
                    element_id.as_deref().unwrap_or("<anonymous>"),
                    kind
                ),
            ),
        }

        for child in doc.children(node) {
            self.walk_transforms(doc, child, &ctm, transformed, stats)?;
        }
        Ok(())
    }

    fn view_box_matrix(
        &self,
        doc: &Document,
        node: NodeId,
        vb_attr: &str,
    ) -> Result<Matrix, ErrorKind> {
        let vb = transform::parse_view_box(vb_attr)?;
        let par = match doc.attribute(node, "preserveAspectRatio") {
            Some(src) => transform::parse_preserve_aspect_ratio(src)?,
            None => transform::PreserveAspectRatio::DEFAULT,
        };
        let width = length_attribute(doc, node, "width").unwrap_or_else(|| vb.width.clone());
        let height = length_attribute(doc, node, "height").unwrap_or_else(|| vb.height.clone());
        transform::view_box_transform(&vb, &width, &height, &par, &self.cx)
    }

    #[allow(clippy::too_many_arguments)]
    fn bake_element(
        &self,
        doc: &mut Document,
        node: NodeId,
        geometry: &ElementGeometry,
        ctm: &Matrix,
        transformed: bool,
        element_id: &Option<String>,
        stats: &mut FlattenStats,
    ) -> Result<(), FlattenError> {
        let cx = &self.cx;

        // Shape conversion is verified against the shape's key points
        // before any transform is applied.
        if !geometry.key_points.is_empty() {
            let v = verify::shape_to_path(&geometry.path, &geometry.key_points, cx);
            self.record_verification(Stage::Transforms, element_id.as_deref(), v, stats)?;
        }

        let baked = if transformed {
            let singular = matches!(ctm.determinant(cx), Ok(d) if d.is_zero());
            if singular {
                stats.warn(
                    Stage::Transforms,
                    format!(
                        "element {} has a singular CTM; geometry collapses",
                        element_id.as_deref().unwrap_or("<anonymous>")
                    ),
                );
            } else {
                let probe = geometry
                    .path
                    .commands()
                    .first()
                    .filter(|c| c.args.len() >= 2)
                    .map(|c| point(c.args[0].clone(), c.args[1].clone()))
                    .unwrap_or_else(Point::origin);
                let v = verify::round_trip(ctm, &probe, cx);
                self.record_verification(Stage::Transforms, element_id.as_deref(), v, stats)?;
                let v = verify::inversion(ctm, cx);
                self.record_verification(Stage::Transforms, element_id.as_deref(), v, stats)?;
                let v = verify::geometry_preservation(ctm, &probe_triangle(), cx);
                self.record_verification(Stage::Transforms, element_id.as_deref(), v, stats)?;
            }

            match transform::apply_to_path(&geometry.path, ctm, cx) {
                Ok(p) => p,
                Err(kind) => {
                    stats.warn(
                        Stage::Transforms,
                        format!(
                            "could not bake element {}: {}",
                            element_id.as_deref().unwrap_or("<anonymous>"),
                            kind
                        ),
                    );
                    return Ok(());
                }
            }
        } else {
            path_to_absolute(&geometry.path)
        };

        rewrite_as_path(doc, node, &path_to_string(&baked, self.options.precision));
        if transformed {
            stats.transforms_flattened += 1;
        }
        Ok(())
    }

    // Stage 8: drop defs content nothing refers to.
    fn sweep_defs(&self, doc: &mut Document) {
        use std::collections::HashSet;

        let root = doc.root();
        let mut all_defs_children: Vec<NodeId> = Vec::new();
        let mut defs_subtrees: HashSet<NodeId> = HashSet::new();
        for node in doc.descendants(root) {
            if doc.is_element(node) && doc.local_tag(node) == "defs" {
                for child in doc.children(node) {
                    all_defs_children.push(child);
                    defs_subtrees.insert(child);
                    for d in doc.descendants(child) {
                        defs_subtrees.insert(d);
                    }
                }
            }
        }

        // Mark: ids referenced from outside defs, then transitively from
        // kept definitions.
        let mut kept: HashSet<String> = HashSet::new();
        let mut queue: Vec<String> = Vec::new();
        for node in doc.descendants(root) {
            if !doc.is_element(node) || defs_subtrees.contains(&node) {
                continue;
            }
            for reference in node_references(doc, node) {
                queue.push(reference);
            }
        }
        while let Some(id) = queue.pop() {
            if !kept.insert(id.clone()) {
                continue;
            }
            if let Some(target) = doc.element_by_id(&id) {
                for reference in node_references(doc, target) {
                    queue.push(reference);
                }
                for d in doc.descendants(target) {
                    if doc.is_element(d) {
                        for reference in node_references(doc, d) {
                            queue.push(reference);
                        }
                    }
                }
            }
        }

        for child in all_defs_children {
            let keep = doc
                .attribute(child, "id")
                .map(|id| kept.contains(id))
                .unwrap_or(false);
            if !keep {
                doc.detach(child);
            }
        }
    }
}

/// A shape or path reduced to path data, with the key points the
/// conversion must preserve.
pub(crate) struct ElementGeometry {
    pub path: Path,
    pub key_points: Vec<Point>,
}

// Geometry elements recognized by the pipeline.
pub(crate) fn is_geometry_element(tag: &str) -> bool {
    matches!(
        tag,
        "path" | "rect" | "circle" | "ellipse" | "line" | "polyline" | "polygon"
    )
}

/// Reduce a geometry element to path data. `Ok(None)` for non-geometry
/// elements and for shapes that render nothing (zero sizes).
pub(crate) fn element_geometry(
    fl: &Flattener,
    doc: &Document,
    node: NodeId,
) -> Result<Option<ElementGeometry>, ErrorKind> {
    use svgbake_algorithms::shapes;

    let cx = fl.context();
    let geometry = match doc.local_tag(node) {
        "path" => {
            let d = match doc.attribute(node, "d") {
                Some(d) if !d.trim().is_empty() => d,
                _ => return Ok(None),
            };
            ElementGeometry {
                path: parse_path(d)?,
                key_points: Vec::new(),
            }
        }
        "rect" => {
            let x = attr_decimal(doc, node, "x")?.unwrap_or_else(Decimal::zero);
            let y = attr_decimal(doc, node, "y")?.unwrap_or_else(Decimal::zero);
            let width = match attr_decimal(doc, node, "width")? {
                Some(w) if w.is_positive() => w,
                _ => return Ok(None),
            };
            let height = match attr_decimal(doc, node, "height")? {
                Some(h) if h.is_positive() => h,
                _ => return Ok(None),
            };
            let rx = attr_decimal(doc, node, "rx")?;
            let ry = attr_decimal(doc, node, "ry")?;
            // A lone rx or ry sets both, per SVG.
            let (rx, ry) = match (rx, ry) {
                (Some(rx), Some(ry)) => (rx, ry),
                (Some(rx), None) => (rx.clone(), rx),
                (None, Some(ry)) => (ry.clone(), ry),
                (None, None) => (Decimal::zero(), Decimal::zero()),
            };
            let sharp = rx.is_zero() && ry.is_zero();
            let path = shapes::rect_to_path(&x, &y, &width, &height, &rx, &ry, false, cx)?;
            let key_points = if sharp {
                vec![
                    point(x.clone(), y.clone()),
                    point(&x + &width, y.clone()),
                    point(&x + &width, &y + &height),
                    point(x, &y + &height),
                ]
            } else {
                Vec::new()
            };
            ElementGeometry { path, key_points }
        }
        "circle" => {
            let ccx = attr_decimal(doc, node, "cx")?.unwrap_or_else(Decimal::zero);
            let ccy = attr_decimal(doc, node, "cy")?.unwrap_or_else(Decimal::zero);
            let r = match attr_decimal(doc, node, "r")? {
                Some(r) if r.is_positive() => r,
                _ => return Ok(None),
            };
            let path = shapes::circle_to_path_n(&ccx, &ccy, &r, fl.options().bezier_arcs, cx)?;
            let key_points = vec![
                point(&ccx + &r, ccy.clone()),
                point(ccx.clone(), &ccy + &r),
                point(&ccx - &r, ccy.clone()),
                point(ccx, &ccy - &r),
            ];
            ElementGeometry { path, key_points }
        }
        "ellipse" => {
            let ccx = attr_decimal(doc, node, "cx")?.unwrap_or_else(Decimal::zero);
            let ccy = attr_decimal(doc, node, "cy")?.unwrap_or_else(Decimal::zero);
            let rx = match attr_decimal(doc, node, "rx")? {
                Some(rx) if rx.is_positive() => rx,
                _ => return Ok(None),
            };
            let ry = match attr_decimal(doc, node, "ry")? {
                Some(ry) if ry.is_positive() => ry,
                _ => return Ok(None),
            };
            let path =
                shapes::ellipse_to_path_n(&ccx, &ccy, &rx, &ry, fl.options().bezier_arcs, cx)?;
            let key_points = vec![
                point(&ccx + &rx, ccy.clone()),
                point(ccx.clone(), &ccy + &ry),
                point(&ccx - &rx, ccy.clone()),
                point(ccx, &ccy - &ry),
            ];
            ElementGeometry { path, key_points }
        }
        "line" => {
            let x1 = attr_decimal(doc, node, "x1")?.unwrap_or_else(Decimal::zero);
            let y1 = attr_decimal(doc, node, "y1")?.unwrap_or_else(Decimal::zero);
            let x2 = attr_decimal(doc, node, "x2")?.unwrap_or_else(Decimal::zero);
            let y2 = attr_decimal(doc, node, "y2")?.unwrap_or_else(Decimal::zero);
            let path = shapes::line_to_path(&x1, &y1, &x2, &y2);
            let key_points = vec![point(x1, y1), point(x2, y2)];
            ElementGeometry { path, key_points }
        }
        "polyline" | "polygon" => {
            let points_attr = match doc.attribute(node, "points") {
                Some(p) => p,
                None => return Ok(None),
            };
            let pts = parse_points_list(points_attr)?;
            if pts.len() < 2 {
                return Ok(None);
            }
            let path = if doc.local_tag(node) == "polygon" {
                shapes::polygon_to_path(&pts)
            } else {
                shapes::polyline_to_path(&pts)
            };
            ElementGeometry {
                key_points: pts,
                path,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(geometry))
}

/// Replace whatever geometry element this was with `<path d="...">`,
/// keeping paint and id attributes.
pub(crate) fn rewrite_as_path(doc: &mut Document, node: NodeId, d: &str) {
    for name in [
        "x", "y", "width", "height", "rx", "ry", "cx", "cy", "r", "x1", "y1", "x2", "y2",
        "points",
    ] {
        doc.remove_attribute(node, name);
    }
    doc.set_tag(node, "path");
    doc.set_attribute(node, "d", d);
}

/// Numeric attribute; `Ok(None)` when absent, an error when present but
/// unparsable (units and percentages are not numbers).
pub(crate) fn attr_decimal(
    doc: &Document,
    node: NodeId,
    name: &str,
) -> Result<Option<Decimal>, ErrorKind> {
    match doc.attribute(node, name) {
        None => Ok(None),
        Some(src) => match parse_decimal(src) {
            Some(value) => Ok(Some(value)),
            None => Err(ErrorKind::InvalidPath(
                svgbake_path::PathError::InvalidNumber {
                    src: src.to_string(),
                    offset: 0,
                },
            )),
        },
    }
}

// Lengths tolerate a "px" suffix; anything else is not resolvable here.
fn length_attribute(doc: &Document, node: NodeId, name: &str) -> Option<Decimal> {
    let raw = doc.attribute(node, name)?;
    let trimmed = raw.trim();
    let numeric = trimmed.strip_suffix("px").unwrap_or(trimmed);
    parse_decimal(numeric)
}

/// Parse a `points` attribute; a dangling odd coordinate is dropped, per
/// SVG error handling.
pub(crate) fn parse_points_list(src: &str) -> Result<Vec<Point>, ErrorKind> {
    let mut numbers = Vec::new();
    for token in src.split(|c: char| c.is_whitespace() || c == ',') {
        if token.is_empty() {
            continue;
        }
        match parse_decimal(token) {
            Some(value) => numbers.push(value),
            None => {
                return Err(ErrorKind::InvalidPath(
                    svgbake_path::PathError::InvalidNumber {
                        src: token.to_string(),
                        offset: 0,
                    },
                ))
            }
        }
    }
    let mut out = Vec::with_capacity(numbers.len() / 2);
    let mut iter = numbers.into_iter();
    while let (Some(x), Some(y)) = (iter.next(), iter.next()) {
        out.push(point(x, y));
    }
    Ok(out)
}

/// `url(#id)` → `id`.
pub(crate) fn url_reference(value: &str) -> Option<&str> {
    let inner = value.trim().strip_prefix("url(")?.strip_suffix(')')?;
    let inner = inner.trim().trim_matches('"').trim_matches('\'');
    inner.strip_prefix('#')
}

/// The `#id` target of an `href`/`xlink:href` attribute.
pub(crate) fn href_target(doc: &Document, node: NodeId) -> Option<String> {
    let value = doc
        .attribute(node, "href")
        .or_else(|| doc.attribute(node, "xlink:href"))?;
    value.trim().strip_prefix('#').map(str::to_string)
}

/// Serialize a matrix as a `transform` attribute value. Entries are
/// rendered at a fixed scale far beyond the output precision and
/// trimmed, so exact values stay short.
pub(crate) fn matrix_attribute(m: &Matrix) -> String {
    let f = |r: usize, c: usize| svgbake_path::serialize::format_number(m.get(r, c), 40);
    format!(
        "matrix({} {} {} {} {} {})",
        f(0, 0),
        f(1, 0),
        f(0, 1),
        f(1, 1),
        f(0, 2),
        f(1, 2)
    )
}

// All reference ids a node carries in its attributes.
fn node_references(doc: &Document, node: NodeId) -> Vec<String> {
    let mut out = Vec::new();
    for (name, value) in doc.attributes(node) {
        if name == "href" || name == "xlink:href" {
            if let Some(id) = value.trim().strip_prefix('#') {
                out.push(id.to_string());
            }
        } else if let Some(id) = url_reference(value) {
            out.push(id.to_string());
        }
    }
    out
}

fn probe_triangle() -> [Point; 3] {
    [
        point(Decimal::zero(), Decimal::zero()),
        point(Decimal::from(10), Decimal::zero()),
        point(Decimal::zero(), Decimal::from(7)),
    ]
}
