use crate::dom;
use crate::types::Color;
use kuchiki::NodeRef;

const DARK_VARIANT_MARKERS: [&str; 2] = ["dark", "dark-mode"];
const LIGHT_VARIANT_MARKERS: [&str; 2] = ["light", "light-mode"];

/// Canonical substitutes applied during normalization.
const LIGHT_BACKGROUND_MARKER: &str = "bg-white";
const DARK_TEXT_MARKER: &str = "text-gray-800";

/// Icons smaller than this attribute width are coerced to inline glyph size.
const ICON_WIDTH_THRESHOLD_PX: f32 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeutralFamily {
    Gray,
    Slate,
    Zinc,
    Neutral,
}

impl NeutralFamily {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "gray" => Some(NeutralFamily::Gray),
            "slate" => Some(NeutralFamily::Slate),
            "zinc" => Some(NeutralFamily::Zinc),
            "neutral" => Some(NeutralFamily::Neutral),
            _ => None,
        }
    }
}

/// Background intensity tiers considered dark. Detection is a total function
/// over this finite vocabulary; anything else is not a dark background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundTier {
    pub family: NeutralFamily,
    pub shade: ShadeLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadeLevel {
    L700,
    L800,
    L900,
    L950,
}

impl ShadeLevel {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "700" => Some(ShadeLevel::L700),
            "800" => Some(ShadeLevel::L800),
            "900" => Some(ShadeLevel::L900),
            "950" => Some(ShadeLevel::L950),
            _ => None,
        }
    }
}

impl BackgroundTier {
    pub fn parse(class: &str) -> Option<Self> {
        let rest = class.strip_prefix("bg-")?;
        let (family, shade) = rest.split_once('-')?;
        Some(BackgroundTier {
            family: NeutralFamily::parse(family)?,
            shade: ShadeLevel::parse(shade)?,
        })
    }
}

/// Text tiers that only read against a dark background: white plus the
/// 100-300 tints of the neutral families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextTier {
    White,
    Tinted {
        family: NeutralFamily,
        tint: TintLevel,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TintLevel {
    L100,
    L200,
    L300,
}

impl TintLevel {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "100" => Some(TintLevel::L100),
            "200" => Some(TintLevel::L200),
            "300" => Some(TintLevel::L300),
            _ => None,
        }
    }
}

impl TextTier {
    pub fn parse(class: &str) -> Option<Self> {
        if class == "text-white" {
            return Some(TextTier::White);
        }
        let rest = class.strip_prefix("text-")?;
        let (family, tint) = rest.split_once('-')?;
        Some(TextTier::Tinted {
            family: NeutralFamily::parse(family)?,
            tint: TintLevel::parse(tint)?,
        })
    }
}

/// Collapses the dual-theme class system into one fixed light appearance.
/// The exported document must not depend on ambient theme state, which is
/// undefined in the staging and preview contexts. Idempotent.
pub fn force_light_appearance(root: &NodeRef) {
    let mut rewritten = 0usize;
    for node in root.inclusive_descendants() {
        if node.as_element().is_none() {
            continue;
        }
        let mut classes = dom::classes(&node);
        if classes.is_empty() {
            continue;
        }
        let mut changed = false;
        let mut needs_light_background = false;
        let mut needs_dark_text = false;
        classes.retain(|class| {
            if DARK_VARIANT_MARKERS.contains(&class.as_str()) {
                changed = true;
                return false;
            }
            if BackgroundTier::parse(class).is_some() {
                changed = true;
                needs_light_background = true;
                return false;
            }
            if TextTier::parse(class).is_some() {
                changed = true;
                needs_dark_text = true;
                return false;
            }
            true
        });
        if needs_light_background && !classes.iter().any(|c| c == LIGHT_BACKGROUND_MARKER) {
            classes.push(LIGHT_BACKGROUND_MARKER.to_string());
        }
        if needs_dark_text && !classes.iter().any(|c| c == DARK_TEXT_MARKER) {
            classes.push(DARK_TEXT_MARKER.to_string());
        }
        if changed {
            dom::set_classes(&node, &classes);
            rewritten += 1;
        }
    }
    for marker in LIGHT_VARIANT_MARKERS {
        dom::add_class(root, marker);
    }
    if rewritten > 0 {
        log::debug!("theme normalization rewrote markers on {} nodes", rewritten);
    }
}

/// Gives every icon an explicit square viewport and coerces small vector
/// graphics and emoji glyphs to a uniform one-line inline size. Viewport and
/// line-relative sizing are undefined off screen, so these must be explicit
/// before rasterization.
pub fn fix_icon_and_emoji_sizing(root: &NodeRef) {
    for emoji in dom::select_nodes(root, ".emoji, .react-emoji") {
        dom::set_styles(
            &emoji,
            &[
                ("width", "1em"),
                ("height", "1em"),
                ("display", "inline-block"),
                ("vertical-align", "middle"),
                ("font-size", "inherit"),
            ],
        );
    }

    for svg in dom::select_nodes(root, "svg") {
        let width = dom::get_attr(&svg, "width");
        let height = dom::get_attr(&svg, "height");
        if dom::get_attr(&svg, "viewBox").is_none() {
            if let (Some(width), Some(height)) = (&width, &height) {
                dom::set_attr(&svg, "viewBox", &format!("0 0 {} {}", width, height));
            }
        }

        let is_marked_icon = dom::has_class(&svg, "icon")
            || svg
                .parent()
                .map(|parent| dom::has_class(&parent, "icon"))
                .unwrap_or(false);
        let is_small = width
            .as_deref()
            .and_then(parse_numeric_prefix)
            .map(|w| w < ICON_WIDTH_THRESHOLD_PX)
            .unwrap_or(false);
        if is_marked_icon || is_small {
            dom::set_styles(
                &svg,
                &[
                    ("width", "1em"),
                    ("height", "1em"),
                    ("vertical-align", "middle"),
                ],
            );
        }
    }

    // Charts keep their natural position here; only their box behavior is
    // pinned so rasterization cannot overflow the page width.
    for chart in dom::select_nodes(root, ".recharts-wrapper, .chart-container") {
        dom::set_styles(
            &chart,
            &[
                ("max-width", "100%"),
                ("height", "auto"),
                ("page-break-inside", "avoid"),
            ],
        );
    }
}

fn parse_numeric_prefix(value: &str) -> Option<f32> {
    let digits: String = value
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok()
}

/// Raster colors for the marker vocabulary that survives normalization.
pub(crate) fn background_color_for_marker(class: &str) -> Option<Color> {
    match class {
        "bg-white" => Some(Color::WHITE),
        "bg-gray-50" => Some(Color::from_rgb8(0xf9, 0xfa, 0xfb)),
        "bg-gray-100" => Some(Color::from_rgb8(0xf3, 0xf4, 0xf6)),
        "bg-gray-200" => Some(Color::from_rgb8(0xe5, 0xe7, 0xeb)),
        _ => None,
    }
}

pub(crate) fn text_color_for_marker(class: &str) -> Option<Color> {
    match class {
        "text-gray-800" => Some(Color::from_rgb8(0x1f, 0x29, 0x37)),
        "text-gray-700" => Some(Color::from_rgb8(0x37, 0x41, 0x51)),
        "text-gray-600" => Some(Color::from_rgb8(0x4b, 0x55, 0x63)),
        "text-gray-500" => Some(Color::from_rgb8(0x6b, 0x72, 0x80)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{classes, has_class, serialize_html};
    use kuchiki::traits::TendrilSink;

    fn fragment(html: &str) -> NodeRef {
        let doc = kuchiki::parse_html().one(format!("<html><body>{}</body></html>", html));
        doc.select_first("body > *")
            .expect("fragment root")
            .as_node()
            .clone()
    }

    #[test]
    fn tier_parsing_is_closed_over_the_marker_vocabulary() {
        assert!(BackgroundTier::parse("bg-gray-900").is_some());
        assert!(BackgroundTier::parse("bg-slate-700").is_some());
        assert!(BackgroundTier::parse("bg-zinc-950").is_some());
        assert!(BackgroundTier::parse("bg-white").is_none());
        assert!(BackgroundTier::parse("bg-gray-100").is_none());
        assert!(BackgroundTier::parse("bg-blue-900").is_none());

        assert_eq!(TextTier::parse("text-white"), Some(TextTier::White));
        assert!(TextTier::parse("text-neutral-200").is_some());
        assert!(TextTier::parse("text-gray-800").is_none());
        assert!(TextTier::parse("text-red-100").is_none());
    }

    #[test]
    fn dark_tiers_are_replaced_with_canonical_light_markers() {
        let root = fragment(
            r#"<div class="dark bg-gray-900">
                 <p class="text-white">score</p>
                 <section class="card bg-slate-800 text-gray-300">detail</section>
               </div>"#,
        );
        force_light_appearance(&root);

        assert!(has_class(&root, "light"));
        assert!(has_class(&root, "light-mode"));
        assert!(has_class(&root, "bg-white"));
        assert!(!has_class(&root, "dark"));

        let p = root.select_first("p").expect("p").as_node().clone();
        assert_eq!(classes(&p), vec!["text-gray-800".to_string()]);

        let section = root.select_first("section").expect("section").as_node().clone();
        assert!(has_class(&section, "card"));
        assert!(has_class(&section, "bg-white"));
        assert!(has_class(&section, "text-gray-800"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let root = fragment(
            r#"<div class="dark-mode bg-neutral-950"><span class="text-zinc-100">x</span></div>"#,
        );
        force_light_appearance(&root);
        let once = serialize_html(&root);
        force_light_appearance(&root);
        assert_eq!(serialize_html(&root), once, "second pass must be a no-op");
    }

    #[test]
    fn already_light_markup_gains_no_residual_markers() {
        let root = fragment(r#"<div class="bg-white"><p class="text-gray-800">x</p></div>"#);
        force_light_appearance(&root);
        for node in root.inclusive_descendants() {
            for class in classes(&node) {
                assert!(BackgroundTier::parse(&class).is_none(), "residual: {}", class);
                assert!(TextTier::parse(&class).is_none(), "residual: {}", class);
            }
        }
    }

    #[test]
    fn icons_get_square_viewports_and_inline_sizing() {
        let root = fragment(
            r#"<div>
                 <svg width="16" height="16"></svg>
                 <svg class="icon" width="32" height="32" viewBox="0 0 32 32"></svg>
                 <svg width="400" height="300"></svg>
                 <span class="emoji">🦀</span>
               </div>"#,
        );
        fix_icon_and_emoji_sizing(&root);

        let svgs = dom::select_nodes(&root, "svg");
        assert_eq!(dom::get_attr(&svgs[0], "viewBox").as_deref(), Some("0 0 16 16"));
        assert_eq!(dom::inline_style(&svgs[0], "width").as_deref(), Some("1em"));
        assert_eq!(dom::inline_style(&svgs[1], "width").as_deref(), Some("1em"));
        assert!(
            dom::inline_style(&svgs[2], "width").is_none(),
            "large unmarked svg keeps its natural size"
        );

        let emoji = root.select_first(".emoji").expect("emoji").as_node().clone();
        assert_eq!(dom::inline_style(&emoji, "font-size").as_deref(), Some("inherit"));
    }
}
