use crate::dom;
use crate::error::SkillPrintError;
use crate::font::{self, FontStore};
use crate::theme;
use crate::types::Color;
use base64::Engine;
use kuchiki::NodeRef;
use tiny_skia::{
    FillRule, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint, Rect as SkRect, Stroke, Transform,
};
use ttf_parser::{Face, OutlineBuilder};

#[derive(Debug, Clone, Copy)]
pub(crate) struct RasterOptions {
    pub content_width_px: f32,
    pub oversample: f32,
    pub background: Color,
}

/// One tall raster of the staged content, at oversampled resolution.
pub(crate) struct RasterImage {
    pixmap: Pixmap,
}

impl RasterImage {
    pub(crate) fn px_width(&self) -> u32 {
        self.pixmap.width()
    }

    pub(crate) fn px_height(&self) -> u32 {
        self.pixmap.height()
    }

    pub(crate) fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }
}

pub(crate) fn rasterize(
    content: &NodeRef,
    options: &RasterOptions,
    fonts: &FontStore,
) -> Result<RasterImage, SkillPrintError> {
    let face = fonts.primary_face();
    if face.is_none() {
        log::warn!("no font registered; text is measured for layout but not painted");
    }
    let ctx = LayoutCtx { face };

    let mut ops = Vec::new();
    let height = layout_element(
        content,
        &NodeStyle::root(),
        0.0,
        0.0,
        options.content_width_px,
        &ctx,
        &mut ops,
    );
    let height = height.max(1.0);
    log::debug!(
        "laid out staged content: {}x{} css px, {} paint ops",
        options.content_width_px,
        height,
        ops.len()
    );
    paint_ops(&ops, options, height, &ctx)
}

struct LayoutCtx<'a> {
    face: Option<Face<'a>>,
}

impl LayoutCtx<'_> {
    fn advance(&self, ch: char, size: f32) -> f32 {
        font::char_advance(self.face.as_ref(), ch, size)
    }

    fn text_width(&self, text: &str, size: f32) -> f32 {
        font::text_advance(self.face.as_ref(), text, size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisplayMode {
    Block,
    Inline,
    Flex,
    Hidden,
}

#[derive(Debug, Clone, Copy)]
enum Dim {
    Px(f32),
    Percent(f32),
}

impl Dim {
    fn resolve(self, avail: f32) -> f32 {
        match self {
            Dim::Px(px) => px,
            Dim::Percent(pct) => avail * pct / 100.0,
        }
    }
}

/// The computed-style subset the export pipeline actually produces: marker
/// classes plus the inline declarations written by the transformation passes.
#[derive(Debug, Clone)]
struct NodeStyle {
    display: DisplayMode,
    background: Option<Color>,
    color: Color,
    font_size: f32,
    bold: bool,
    center: bool,
    line_height: f32,
    padding: [f32; 4],
    margin: [f32; 4],
    border_top: Option<(f32, Color)>,
    border_bottom: Option<(f32, Color)>,
    gap: f32,
    width: Option<Dim>,
    min_width: f32,
    max_width: Option<Dim>,
    height: Option<f32>,
    flex_basis: Option<Dim>,
}

impl NodeStyle {
    fn root() -> NodeStyle {
        NodeStyle {
            display: DisplayMode::Block,
            background: None,
            color: Color::BLACK,
            font_size: 16.0,
            bold: false,
            center: false,
            line_height: 1.5,
            padding: [0.0; 4],
            margin: [0.0; 4],
            border_top: None,
            border_bottom: None,
            gap: 0.0,
            width: None,
            min_width: 0.0,
            max_width: None,
            height: None,
            flex_basis: None,
        }
    }

    fn child_seed(&self) -> NodeStyle {
        NodeStyle {
            color: self.color,
            font_size: self.font_size,
            bold: self.bold,
            center: self.center,
            line_height: self.line_height,
            ..NodeStyle::root()
        }
    }
}

fn is_inline_tag(tag: &str) -> bool {
    matches!(
        tag,
        "a" | "span"
            | "strong"
            | "b"
            | "em"
            | "i"
            | "u"
            | "small"
            | "code"
            | "sub"
            | "sup"
            | "label"
            | "abbr"
            | "time"
    )
}

fn is_coerced_icon(node: &NodeRef) -> bool {
    dom::inline_style(node, "width").as_deref() == Some("1em")
}

fn is_inline_level(node: &NodeRef) -> bool {
    let Some(tag) = dom::tag_name(node) else {
        // Text and comment nodes flow with the surrounding line.
        return true;
    };
    if is_inline_tag(&tag) {
        return true;
    }
    if (tag == "svg" || tag == "img") && is_coerced_icon(node) {
        return true;
    }
    matches!(
        dom::inline_style(node, "display").as_deref(),
        Some("inline") | Some("inline-block")
    )
}

fn resolve_style(node: &NodeRef, parent: &NodeStyle) -> NodeStyle {
    let mut style = parent.child_seed();
    let Some(el) = node.as_element() else {
        return style;
    };
    let tag = el.name.local.as_ref().to_ascii_lowercase();
    match tag.as_str() {
        "h1" => {
            style.font_size = 24.0;
            style.bold = true;
            style.margin = [13.0, 0.0, 13.0, 0.0];
        }
        "h2" => {
            style.font_size = 20.0;
            style.bold = true;
            style.margin = [11.0, 0.0, 11.0, 0.0];
        }
        "h3" => {
            style.font_size = 18.0;
            style.bold = true;
            style.margin = [9.0, 0.0, 9.0, 0.0];
        }
        "h4" => {
            style.bold = true;
            style.margin = [8.0, 0.0, 8.0, 0.0];
        }
        "p" => style.margin = [8.0, 0.0, 8.0, 0.0],
        "ul" | "ol" => {
            style.margin = [8.0, 0.0, 8.0, 0.0];
            style.padding[3] = 24.0;
        }
        "li" => style.margin = [4.0, 0.0, 4.0, 0.0],
        "a" => style.color = Color::from_rgb8(0x3b, 0x82, 0xf6),
        "strong" | "b" => style.bold = true,
        "hr" => {
            style.height = Some(1.0);
            style.background = Some(Color::from_rgb8(0xdd, 0xdd, 0xdd));
            style.margin = [8.0, 0.0, 8.0, 0.0];
        }
        _ => {}
    }
    if is_inline_tag(&tag) {
        style.display = DisplayMode::Inline;
    }
    for class in dom::classes(node) {
        if let Some(color) = theme::background_color_for_marker(&class) {
            style.background = Some(color);
        }
        if let Some(color) = theme::text_color_for_marker(&class) {
            style.color = color;
        }
    }
    for (prop, value) in dom::style_declarations(node) {
        apply_declaration(&mut style, &prop, &value);
    }
    style
}

fn apply_declaration(style: &mut NodeStyle, prop: &str, value: &str) {
    match prop {
        "display" => {
            style.display = match value {
                "flex" => DisplayMode::Flex,
                "none" => DisplayMode::Hidden,
                "inline" | "inline-block" => DisplayMode::Inline,
                _ => DisplayMode::Block,
            }
        }
        "background" | "background-color" => {
            if let Some(color) = parse_color(value) {
                style.background = Some(color);
            }
        }
        "color" => {
            if let Some(color) = parse_color(value) {
                style.color = color;
            }
        }
        "font-size" => {
            if let Some(px) = parse_length(value, style.font_size) {
                style.font_size = px;
            }
        }
        "font-weight" => {
            style.bold = matches!(value, "bold" | "bolder")
                || value.parse::<f32>().map(|w| w >= 600.0).unwrap_or(false);
        }
        "text-align" => style.center = value == "center",
        "line-height" => {
            if let Ok(factor) = value.parse::<f32>() {
                style.line_height = factor;
            }
        }
        "padding" => {
            if let Some(edges) = parse_edges(value, style.font_size) {
                style.padding = edges;
            }
        }
        "padding-top" => set_edge(&mut style.padding, 0, value, style.font_size),
        "padding-right" => set_edge(&mut style.padding, 1, value, style.font_size),
        "padding-bottom" => set_edge(&mut style.padding, 2, value, style.font_size),
        "padding-left" => set_edge(&mut style.padding, 3, value, style.font_size),
        "margin" => {
            if let Some(edges) = parse_edges(value, style.font_size) {
                style.margin = edges;
            }
        }
        "margin-top" => set_edge(&mut style.margin, 0, value, style.font_size),
        "margin-right" => set_edge(&mut style.margin, 1, value, style.font_size),
        "margin-bottom" => set_edge(&mut style.margin, 2, value, style.font_size),
        "margin-left" => set_edge(&mut style.margin, 3, value, style.font_size),
        "border-top" => style.border_top = parse_border(value, style.font_size),
        "border-bottom" => style.border_bottom = parse_border(value, style.font_size),
        "gap" => {
            if let Some(px) = parse_length(value, style.font_size) {
                style.gap = px;
            }
        }
        "width" => style.width = parse_dim(value, style.font_size),
        "min-width" => {
            if let Some(Dim::Px(px)) = parse_dim(value, style.font_size) {
                style.min_width = px;
            }
        }
        "max-width" => style.max_width = parse_dim(value, style.font_size),
        "height" => {
            if value == "auto" {
                style.height = None;
            } else if let Some(Dim::Px(px)) = parse_dim(value, style.font_size) {
                style.height = Some(px);
            }
        }
        "flex" => {
            style.flex_basis = value
                .split_whitespace()
                .last()
                .and_then(|basis| parse_dim(basis, style.font_size));
        }
        _ => {}
    }
}

fn set_edge(edges: &mut [f32; 4], index: usize, value: &str, em: f32) {
    if let Some(px) = parse_length(value, em) {
        edges[index] = px;
    }
}

fn parse_length(value: &str, em: f32) -> Option<f32> {
    let value = value.trim();
    if let Some(px) = value.strip_suffix("px") {
        return px.trim().parse().ok();
    }
    if let Some(ems) = value.strip_suffix("em") {
        return ems.trim().parse::<f32>().ok().map(|v| v * em);
    }
    value.parse().ok()
}

fn parse_dim(value: &str, em: f32) -> Option<Dim> {
    let value = value.trim();
    if let Some(pct) = value.strip_suffix('%') {
        return pct.trim().parse().ok().map(Dim::Percent);
    }
    parse_length(value, em).map(Dim::Px)
}

fn parse_edges(value: &str, em: f32) -> Option<[f32; 4]> {
    let parts: Vec<f32> = value
        .split_whitespace()
        .map(|part| parse_length(part, em))
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        [all] => Some([*all; 4]),
        [v, h] => Some([*v, *h, *v, *h]),
        [t, h, b] => Some([*t, *h, *b, *h]),
        [t, r, b, l] => Some([*t, *r, *b, *l]),
        _ => None,
    }
}

fn parse_border(value: &str, em: f32) -> Option<(f32, Color)> {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    let width = parse_length(tokens.first()?, em)?;
    let color = tokens.last().and_then(|token| parse_color(token))?;
    Some((width, color))
}

fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim().to_ascii_lowercase();
    if let Some(hex) = value.strip_prefix('#') {
        let expand = |s: &str| u8::from_str_radix(s, 16).ok();
        return match hex.len() {
            3 => {
                let bytes: Vec<u8> = hex
                    .chars()
                    .filter_map(|c| expand(&format!("{c}{c}")))
                    .collect();
                (bytes.len() == 3).then(|| Color::from_rgb8(bytes[0], bytes[1], bytes[2]))
            }
            6 => {
                let r = expand(&hex[0..2])?;
                let g = expand(&hex[2..4])?;
                let b = expand(&hex[4..6])?;
                Some(Color::from_rgb8(r, g, b))
            }
            _ => None,
        };
    }
    match value.as_str() {
        "white" => Some(Color::WHITE),
        "black" => Some(Color::BLACK),
        _ => None,
    }
}

enum Op {
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Color,
    },
    Text {
        x: f32,
        baseline: f32,
        text: String,
        size: f32,
        color: Color,
        bold: bool,
    },
    Image {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        pixmap: Pixmap,
    },
    Placeholder {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    },
}

fn translate_ops(ops: &mut [Op], dx: f32, dy: f32) {
    for op in ops {
        match op {
            Op::Rect { x, y, .. }
            | Op::Image { x, y, .. }
            | Op::Placeholder { x, y, .. } => {
                *x += dx;
                *y += dy;
            }
            Op::Text { x, baseline, .. } => {
                *x += dx;
                *baseline += dy;
            }
        }
    }
}

fn layout_element(
    node: &NodeRef,
    parent_style: &NodeStyle,
    x: f32,
    y: f32,
    avail: f32,
    ctx: &LayoutCtx<'_>,
    ops: &mut Vec<Op>,
) -> f32 {
    let style = resolve_style(node, parent_style);
    if style.display == DisplayMode::Hidden {
        return 0.0;
    }
    match dom::tag_name(node).as_deref() {
        Some("img") => return layout_image(node, &style, x, y, avail, ops),
        Some("svg") => return layout_svg(node, &style, x, y, avail, ops),
        _ => {}
    }

    let width = style
        .width
        .map(|dim| dim.resolve(avail))
        .unwrap_or(avail)
        .min(avail)
        .max(0.0);
    let border_top = style.border_top.map(|(w, _)| w).unwrap_or(0.0);
    let border_bottom = style.border_bottom.map(|(w, _)| w).unwrap_or(0.0);
    let inner_x = x + style.padding[3];
    let inner_y = y + border_top + style.padding[0];
    let inner_w = (width - style.padding[1] - style.padding[3]).max(0.0);

    let mut child_ops = Vec::new();
    let content_h = if style.display == DisplayMode::Flex {
        layout_flex_children(node, &style, inner_x, inner_y, inner_w, ctx, &mut child_ops)
    } else {
        layout_block_children(node, &style, inner_x, inner_y, inner_w, ctx, &mut child_ops)
    };

    let mut height =
        border_top + style.padding[0] + content_h + style.padding[2] + border_bottom;
    if let Some(px) = style.height {
        height = height.max(px);
    }

    if let Some(color) = style.background {
        ops.push(Op::Rect {
            x,
            y,
            w: width,
            h: height,
            color,
        });
    }
    if let Some((w, color)) = style.border_top {
        ops.push(Op::Rect {
            x,
            y,
            w: width,
            h: w,
            color,
        });
    }
    ops.extend(child_ops);
    if let Some((w, color)) = style.border_bottom {
        ops.push(Op::Rect {
            x,
            y: y + height - w,
            w: width,
            h: w,
            color,
        });
    }
    height
}

fn layout_block_children(
    node: &NodeRef,
    style: &NodeStyle,
    x: f32,
    y: f32,
    avail: f32,
    ctx: &LayoutCtx<'_>,
    ops: &mut Vec<Op>,
) -> f32 {
    let mut cursor = 0.0;
    let mut inline_run: Vec<NodeRef> = Vec::new();
    for child in node.children() {
        if is_inline_level(&child) {
            inline_run.push(child);
            continue;
        }
        if !inline_run.is_empty() {
            cursor += layout_inline_run(&inline_run, style, x, y + cursor, avail, ctx, ops);
            inline_run.clear();
        }
        if child.as_element().is_none() {
            continue;
        }
        let child_style = resolve_style(&child, style);
        if child_style.display == DisplayMode::Hidden {
            continue;
        }
        cursor += child_style.margin[0];
        let child_x = x + child_style.margin[3];
        let child_avail = (avail - child_style.margin[1] - child_style.margin[3]).max(0.0);
        let child_h = layout_element(&child, style, child_x, y + cursor, child_avail, ctx, ops);
        cursor += child_h + child_style.margin[2];
    }
    if !inline_run.is_empty() {
        cursor += layout_inline_run(&inline_run, style, x, y + cursor, avail, ctx, ops);
    }
    cursor
}

fn layout_flex_children(
    node: &NodeRef,
    style: &NodeStyle,
    x: f32,
    y: f32,
    avail: f32,
    ctx: &LayoutCtx<'_>,
    ops: &mut Vec<Op>,
) -> f32 {
    let mut measured: Vec<(Vec<Op>, f32, f32)> = Vec::new();
    for item in node.children().filter(|child| child.as_element().is_some()) {
        let item_style = resolve_style(&item, style);
        if item_style.display == DisplayMode::Hidden {
            continue;
        }
        let basis = item_style.flex_basis.or(item_style.width);
        let mut width = basis.map(|dim| dim.resolve(avail)).unwrap_or(avail);
        if let Some(max) = item_style.max_width {
            width = width.min(max.resolve(avail));
        }
        width = width.max(item_style.min_width).min(avail.max(item_style.min_width));
        let mut item_ops = Vec::new();
        let height = layout_element(&item, style, 0.0, 0.0, width, ctx, &mut item_ops);
        measured.push((item_ops, width, height));
    }
    if measured.is_empty() {
        return 0.0;
    }

    let mut x_off = 0.0;
    let mut y_off = 0.0;
    let mut row_h = 0.0f32;
    for (mut item_ops, width, height) in measured {
        if x_off > 0.0 && x_off + width > avail + 0.1 {
            y_off += row_h + style.gap;
            x_off = 0.0;
            row_h = 0.0;
        }
        translate_ops(&mut item_ops, x + x_off, y + y_off);
        ops.extend(item_ops);
        x_off += width + style.gap;
        row_h = row_h.max(height);
    }
    y_off + row_h
}

enum PieceKind {
    Word(String),
    Icon,
}

struct Piece {
    kind: PieceKind,
    width: f32,
    size: f32,
    color: Color,
    bold: bool,
    space_before: bool,
}

fn layout_inline_run(
    nodes: &[NodeRef],
    style: &NodeStyle,
    x: f32,
    y: f32,
    avail: f32,
    ctx: &LayoutCtx<'_>,
    ops: &mut Vec<Op>,
) -> f32 {
    let mut pieces = Vec::new();
    let mut pending_space = false;
    for node in nodes {
        collect_inline_pieces(node, style, ctx, &mut pieces, &mut pending_space);
    }
    if pieces.is_empty() {
        return 0.0;
    }

    struct Line {
        items: Vec<(f32, usize)>,
        width: f32,
        max_size: f32,
    }
    let mut lines: Vec<Line> = Vec::new();
    let mut line = Line {
        items: Vec::new(),
        width: 0.0,
        max_size: 0.0,
    };
    for (index, piece) in pieces.iter().enumerate() {
        let mut space = if piece.space_before && !line.items.is_empty() {
            ctx.advance(' ', piece.size)
        } else {
            0.0
        };
        if !line.items.is_empty() && line.width + space + piece.width > avail + 0.1 {
            lines.push(line);
            line = Line {
                items: Vec::new(),
                width: 0.0,
                max_size: 0.0,
            };
            space = 0.0;
        }
        line.items.push((line.width + space, index));
        line.width += space + piece.width;
        line.max_size = line.max_size.max(piece.size);
    }
    lines.push(line);

    let mut total = 0.0;
    for line in &lines {
        let line_h = line.max_size * style.line_height;
        let baseline = y + total + (line_h - line.max_size) / 2.0 + line.max_size * 0.8;
        let x_base = if style.center {
            x + ((avail - line.width) / 2.0).max(0.0)
        } else {
            x
        };
        for (offset, index) in &line.items {
            let piece = &pieces[*index];
            match &piece.kind {
                PieceKind::Word(word) => ops.push(Op::Text {
                    x: x_base + offset,
                    baseline,
                    text: word.clone(),
                    size: piece.size,
                    color: piece.color,
                    bold: piece.bold,
                }),
                PieceKind::Icon => ops.push(Op::Placeholder {
                    x: x_base + offset,
                    y: baseline - piece.size * 0.8,
                    w: piece.size,
                    h: piece.size,
                }),
            }
        }
        total += line_h;
    }
    total
}

fn collect_inline_pieces(
    node: &NodeRef,
    style: &NodeStyle,
    ctx: &LayoutCtx<'_>,
    pieces: &mut Vec<Piece>,
    pending_space: &mut bool,
) {
    if let Some(contents) = node.as_text() {
        let text = contents.borrow();
        if text.trim().is_empty() {
            if !pieces.is_empty() {
                *pending_space = true;
            }
            return;
        }
        if text.starts_with(char::is_whitespace) {
            *pending_space = true;
        }
        let mut first = true;
        for word in text.split_whitespace() {
            let space_before = if first { *pending_space } else { true };
            pieces.push(Piece {
                kind: PieceKind::Word(word.to_string()),
                width: ctx.text_width(word, style.font_size),
                size: style.font_size,
                color: style.color,
                bold: style.bold,
                space_before,
            });
            first = false;
        }
        *pending_space = text.ends_with(char::is_whitespace);
        return;
    }

    if node.as_element().is_none() {
        return;
    }
    let tag = dom::tag_name(node).unwrap_or_default();
    if (tag == "svg" || tag == "img") && is_coerced_icon(node) {
        pieces.push(Piece {
            kind: PieceKind::Icon,
            width: style.font_size,
            size: style.font_size,
            color: style.color,
            bold: false,
            space_before: std::mem::take(pending_space),
        });
        return;
    }
    let child_style = resolve_style(node, style);
    if child_style.display == DisplayMode::Hidden {
        return;
    }
    for child in node.children() {
        collect_inline_pieces(&child, &child_style, ctx, pieces, pending_space);
    }
}

fn layout_image(
    node: &NodeRef,
    style: &NodeStyle,
    x: f32,
    y: f32,
    avail: f32,
    ops: &mut Vec<Op>,
) -> f32 {
    let decoded = dom::get_attr(node, "src").and_then(|src| decode_data_uri(&src));
    match decoded {
        Some((pixmap, iw, ih)) => {
            let mut width = style
                .width
                .map(|dim| dim.resolve(avail))
                .unwrap_or(iw as f32)
                .min(avail);
            if let Some(max) = style.max_width {
                width = width.min(max.resolve(avail));
            }
            let height = style
                .height
                .unwrap_or(width * ih as f32 / (iw.max(1)) as f32);
            ops.push(Op::Image {
                x,
                y,
                w: width,
                h: height,
                pixmap,
            });
            height
        }
        None => {
            log::warn!("image source is not an embeddable data URI; painting placeholder");
            let width = style
                .width
                .map(|dim| dim.resolve(avail))
                .unwrap_or_else(|| avail.min(300.0));
            let height = style.height.unwrap_or(150.0);
            ops.push(Op::Placeholder {
                x,
                y,
                w: width,
                h: height,
            });
            height
        }
    }
}

/// Vector content keeps its box so layout and pagination stay truthful, but
/// is painted as an outlined placeholder; charts that must survive export
/// arrive as pre-rendered data-URI images.
fn layout_svg(node: &NodeRef, style: &NodeStyle, x: f32, y: f32, avail: f32, ops: &mut Vec<Op>) -> f32 {
    let attr_px = |name: &str| {
        dom::get_attr(node, name).and_then(|value| parse_length(&value, style.font_size))
    };
    let width = style
        .width
        .map(|dim| dim.resolve(avail))
        .or_else(|| attr_px("width"))
        .unwrap_or_else(|| avail.min(300.0))
        .min(avail);
    let height = style
        .height
        .or_else(|| attr_px("height"))
        .unwrap_or(width * 0.75);
    ops.push(Op::Placeholder {
        x,
        y,
        w: width,
        h: height,
    });
    height
}

fn decode_data_uri(src: &str) -> Option<(Pixmap, u32, u32)> {
    let rest = src.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .ok()?;
    let decoded = image::load_from_memory(&bytes).ok()?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut data = rgba.into_raw();
    for px in data.chunks_exact_mut(4) {
        let alpha = px[3] as u16;
        px[0] = (px[0] as u16 * alpha / 255) as u8;
        px[1] = (px[1] as u16 * alpha / 255) as u8;
        px[2] = (px[2] as u16 * alpha / 255) as u8;
    }
    let pixmap = Pixmap::from_vec(data, IntSize::from_wh(width, height)?)?;
    Some((pixmap, width, height))
}

fn paint_ops(
    ops: &[Op],
    options: &RasterOptions,
    height: f32,
    ctx: &LayoutCtx<'_>,
) -> Result<RasterImage, SkillPrintError> {
    let scale = options.oversample;
    let px_w = (options.content_width_px * scale).round().max(1.0) as u32;
    let px_h = (height * scale).ceil().max(1.0) as u32;
    let mut pixmap = Pixmap::new(px_w, px_h).ok_or_else(|| {
        SkillPrintError::Raster(format!("cannot allocate {}x{} pixmap", px_w, px_h))
    })?;
    let (r, g, b, a) = options.background.to_rgba8();
    pixmap.fill(tiny_skia::Color::from_rgba8(r, g, b, a));
    let transform = Transform::from_scale(scale, scale);

    for op in ops {
        match op {
            Op::Rect { x, y, w, h, color } => {
                let Some(rect) = SkRect::from_xywh(*x, *y, *w, *h) else {
                    continue;
                };
                let mut paint = Paint::default();
                let (r, g, b, a) = color.to_rgba8();
                paint.set_color_rgba8(r, g, b, a);
                paint.anti_alias = false;
                pixmap.fill_rect(rect, &paint, transform, None);
            }
            Op::Text {
                x,
                baseline,
                text,
                size,
                color,
                bold,
            } => {
                if let Some(face) = ctx.face.as_ref() {
                    paint_text(
                        &mut pixmap, face, *x, *baseline, text, *size, *color, *bold, transform,
                    );
                }
            }
            Op::Image { x, y, w, h, pixmap: source } => {
                if source.width() == 0 || *w <= 0.0 {
                    continue;
                }
                let image_transform = transform
                    .pre_translate(*x, *y)
                    .pre_scale(*w / source.width() as f32, *h / source.height() as f32);
                pixmap.draw_pixmap(
                    0,
                    0,
                    source.as_ref(),
                    &PixmapPaint::default(),
                    image_transform,
                    None,
                );
            }
            Op::Placeholder { x, y, w, h } => {
                let Some(rect) = SkRect::from_xywh(*x, *y, *w, *h) else {
                    continue;
                };
                let mut paint = Paint::default();
                paint.set_color_rgba8(0xd1, 0xd5, 0xdb, 0xff);
                paint.anti_alias = false;
                let path = PathBuilder::from_rect(rect);
                let stroke = Stroke {
                    width: 1.0,
                    ..Stroke::default()
                };
                pixmap.stroke_path(&path, &paint, &stroke, transform, None);
            }
        }
    }
    Ok(RasterImage { pixmap })
}

#[allow(clippy::too_many_arguments)]
fn paint_text(
    pixmap: &mut Pixmap,
    face: &Face<'_>,
    x: f32,
    baseline: f32,
    text: &str,
    size: f32,
    color: Color,
    bold: bool,
    transform: Transform,
) {
    let upem = face.units_per_em() as f32;
    if upem <= 0.0 {
        return;
    }
    let glyph_scale = size / upem;
    let mut builder = PathBuilder::new();
    let mut pen = x;
    for ch in text.chars() {
        match face.glyph_index(ch) {
            Some(glyph) => {
                let mut outline = GlyphOutline {
                    builder: &mut builder,
                    scale: glyph_scale,
                    dx: pen,
                    dy: baseline,
                };
                face.outline_glyph(glyph, &mut outline);
                pen += font::char_advance(Some(face), ch, size);
            }
            None => pen += font::char_advance(None, ch, size),
        }
    }
    let Some(path) = builder.finish() else {
        return;
    };
    let mut paint = Paint::default();
    let (r, g, b, a) = color.to_rgba8();
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = true;
    pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);
    if bold {
        let stroke = Stroke {
            width: size * 0.04,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint, &stroke, transform, None);
    }
}

struct GlyphOutline<'a> {
    builder: &'a mut PathBuilder,
    scale: f32,
    dx: f32,
    dy: f32,
}

impl OutlineBuilder for GlyphOutline<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder
            .move_to(self.dx + x * self.scale, self.dy - y * self.scale);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder
            .line_to(self.dx + x * self.scale, self.dy - y * self.scale);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(
            self.dx + x1 * self.scale,
            self.dy - y1 * self.scale,
            self.dx + x * self.scale,
            self.dy - y * self.scale,
        );
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            self.dx + x1 * self.scale,
            self.dy - y1 * self.scale,
            self.dx + x2 * self.scale,
            self.dy - y2 * self.scale,
            self.dx + x * self.scale,
            self.dy - y * self.scale,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchiki::traits::TendrilSink;

    fn fragment(html: &str) -> NodeRef {
        let doc = kuchiki::parse_html().one(format!("<html><body>{}</body></html>", html));
        doc.select_first("body > *")
            .expect("fragment root")
            .as_node()
            .clone()
    }

    fn options() -> RasterOptions {
        RasterOptions {
            content_width_px: 800.0,
            oversample: 2.0,
            background: Color::WHITE,
        }
    }

    #[test]
    fn raster_width_is_content_width_times_oversample() {
        let root = fragment(r#"<div style="height: 50px"></div>"#);
        let raster = rasterize(&root, &options(), &FontStore::new()).expect("raster");
        assert_eq!(raster.px_width(), 1600);
        assert_eq!(raster.px_height(), 100);
    }

    #[test]
    fn text_occupies_line_boxes_even_without_a_registered_face() {
        let root = fragment(r#"<div><p style="margin: 0">hello static export</p></div>"#);
        let raster = rasterize(&root, &options(), &FontStore::new()).expect("raster");
        // One 16px line at 1.5 line height, oversampled twice.
        assert_eq!(raster.px_height(), 48);
    }

    #[test]
    fn flex_row_places_constrained_items_side_by_side() {
        let root = fragment(
            r#"<div style="display: flex; flex-wrap: wrap; gap: 20px">
                 <div style="flex: 1 1 45%; min-width: 300px; max-width: 48%; height: 100px"></div>
                 <div style="flex: 1 1 45%; min-width: 300px; max-width: 48%; height: 100px"></div>
               </div>"#,
        );
        let raster = rasterize(&root, &options(), &FontStore::new()).expect("raster");
        assert_eq!(
            raster.px_height(),
            200,
            "two 48%-wide items fit one 100px row at 800px"
        );
    }

    #[test]
    fn long_text_wraps_and_grows_the_raster() {
        let word = "skill ".repeat(120);
        let root = fragment(&format!(r#"<div><p style="margin: 0">{}</p></div>"#, word));
        let raster = rasterize(&root, &options(), &FontStore::new()).expect("raster");
        assert!(
            raster.px_height() > 48,
            "120 words cannot fit one 800px line"
        );
    }

    #[test]
    fn data_uri_images_use_their_intrinsic_size() {
        let mut png = Vec::new();
        let img = image::RgbaImage::from_pixel(40, 20, image::Rgba([10, 20, 30, 255]));
        img.write_to(
            &mut std::io::Cursor::new(&mut png),
            image::ImageFormat::Png,
        )
        .expect("encode fixture png");
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let root = fragment(&format!(r#"<div><img src="{}"></div>"#, uri));
        let raster = rasterize(&root, &options(), &FontStore::new()).expect("raster");
        assert_eq!(raster.px_height(), 40, "20 css px image at 2x oversampling");
    }

    #[test]
    fn hidden_subtrees_contribute_nothing() {
        let root = fragment(
            r#"<div><div style="display: none; height: 500px"></div><div style="height: 30px"></div></div>"#,
        );
        let raster = rasterize(&root, &options(), &FontStore::new()).expect("raster");
        assert_eq!(raster.px_height(), 60);
    }
}
