use crate::dom;
use crate::error::SkillPrintError;
use chrono::{Datelike, NaiveDate};
use kuchiki::NodeRef;

pub(crate) const STAGING_CLASS: &str = "pdf-staging";
pub(crate) const STRUCTURED_CONTENT_CLASS: &str = "pdf-structured-content";

/// Off-screen container hosting the transformed clone while it is measured
/// and rasterized. It must be attached to the live report document (layout
/// and computed style only exist for attached nodes) but must never become
/// visible, and it must never outlive the export call: a leaked staging
/// container silently degrades the host page over repeated exports.
///
/// Detachment is tied to `Drop`, so every exit path of the caller, success
/// or error, tears the container down exactly once.
pub(crate) struct StagingSurface {
    container: NodeRef,
}

impl StagingSurface {
    fn attach(host_document: &NodeRef) -> Result<StagingSurface, SkillPrintError> {
        let container = dom::make_element("div", &[("class", STAGING_CLASS)]);
        dom::set_styles(
            &container,
            &[
                ("position", "absolute"),
                ("left", "-9999px"),
                ("top", "-9999px"),
                ("width", "800px"),
                ("background-color", "#ffffff"),
                ("color", "#000000"),
                ("font-family", "Arial, sans-serif"),
            ],
        );
        let mount = dom::document_body(host_document)
            .ok_or(SkillPrintError::DetachedTarget)?;
        mount.append(container.clone());
        Ok(StagingSurface { container })
    }

    pub(crate) fn container(&self) -> &NodeRef {
        &self.container
    }
}

impl Drop for StagingSurface {
    fn drop(&mut self) {
        self.container.detach();
    }
}

pub(crate) struct StagedContent {
    pub surface: StagingSurface,
    pub content: NodeRef,
}

/// Wraps the sanitized clone with a generated header and footer inside the
/// staging surface, ready for rasterization at the fixed content width.
pub(crate) fn stage_for_rasterization(
    host_document: &NodeRef,
    content_clone: NodeRef,
    title: &str,
    subtitle: &str,
    brand: &str,
    generated_on: NaiveDate,
) -> Result<StagedContent, SkillPrintError> {
    let surface = StagingSurface::attach(host_document)?;

    let structured = dom::make_element("div", &[("class", STRUCTURED_CONTENT_CLASS)]);
    dom::set_styles(&structured, &[("padding", "20px")]);

    structured.append(build_header(title, subtitle));
    structured.append(content_clone);
    structured.append(build_footer(brand, generated_on));

    surface.container().append(structured.clone());
    Ok(StagedContent {
        surface,
        content: structured,
    })
}

fn build_header(title: &str, subtitle: &str) -> NodeRef {
    let header = dom::make_element("div", &[("class", "pdf-report-header")]);
    dom::set_styles(
        &header,
        &[
            ("text-align", "center"),
            ("margin-bottom", "20px"),
            ("border-bottom", "2px solid #333"),
            ("padding-bottom", "10px"),
        ],
    );

    let heading = dom::make_element("h1", &[]);
    dom::set_styles(
        &heading,
        &[
            ("margin", "0"),
            ("color", "#333"),
            ("font-size", "24px"),
            ("font-weight", "bold"),
        ],
    );
    heading.append(NodeRef::new_text(title));

    let tagline = dom::make_element("p", &[]);
    dom::set_styles(
        &tagline,
        &[
            ("margin", "5px 0 0"),
            ("color", "#666"),
            ("font-size", "14px"),
        ],
    );
    tagline.append(NodeRef::new_text(subtitle));

    header.append(heading);
    header.append(tagline);
    header
}

fn build_footer(brand: &str, generated_on: NaiveDate) -> NodeRef {
    let footer = dom::make_element("div", &[("class", "pdf-report-footer")]);
    dom::set_styles(
        &footer,
        &[
            ("margin-top", "30px"),
            ("border-top", "1px solid #ddd"),
            ("padding-top", "10px"),
            ("font-size", "12px"),
            ("color", "#666"),
            ("text-align", "center"),
        ],
    );

    let generated = dom::make_element("p", &[]);
    generated.append(NodeRef::new_text(format!(
        "Generated on {}",
        generated_on.format("%B %-d, %Y")
    )));

    let copyright = dom::make_element("p", &[]);
    copyright.append(NodeRef::new_text(format!(
        "{} \u{00a9} {}",
        brand,
        generated_on.year()
    )));

    footer.append(generated);
    footer.append(copyright);
    footer
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchiki::traits::TendrilSink;

    fn report_document() -> NodeRef {
        kuchiki::parse_html().one(
            r#"<html><body><div id="analysis-results"><p>content</p></div></body></html>"#,
        )
    }

    fn staging_count(document: &NodeRef) -> usize {
        dom::select_nodes(document, &format!(".{}", STAGING_CLASS)).len()
    }

    #[test]
    fn staging_surface_is_attached_off_screen_and_removed_on_drop() {
        let document = report_document();
        let clone = dom::make_element("div", &[]);
        {
            let staged = stage_for_rasterization(
                &document,
                clone,
                "SkillLens Analysis Report",
                "Comprehensive Skill Assessment",
                "SkillLens",
                NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
            )
            .expect("stage");
            assert_eq!(staging_count(&document), 1);
            assert_eq!(
                dom::inline_style(staged.surface.container(), "left").as_deref(),
                Some("-9999px")
            );
            assert_eq!(
                dom::inline_style(staged.surface.container(), "width").as_deref(),
                Some("800px")
            );
        }
        assert_eq!(staging_count(&document), 0, "guard must detach on drop");
    }

    #[test]
    fn staged_content_orders_header_content_footer() {
        let document = report_document();
        let clone = dom::make_element("section", &[("id", "cloned-report")]);
        let staged = stage_for_rasterization(
            &document,
            clone,
            "SkillLens Analysis Report",
            "Comprehensive Skill Assessment",
            "SkillLens",
            NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
        )
        .expect("stage");

        let children: Vec<_> = staged.content.children().collect();
        assert_eq!(children.len(), 3);
        assert!(dom::has_class(&children[0], "pdf-report-header"));
        assert_eq!(dom::get_attr(&children[1], "id").as_deref(), Some("cloned-report"));
        assert!(dom::has_class(&children[2], "pdf-report-footer"));

        let header_text = children[0].text_contents();
        assert!(header_text.contains("SkillLens Analysis Report"));
        assert!(header_text.contains("Comprehensive Skill Assessment"));
    }

    #[test]
    fn footer_carries_long_form_date_and_copyright_year() {
        let document = report_document();
        let staged = stage_for_rasterization(
            &document,
            dom::make_element("div", &[]),
            "SkillLens Analysis Report",
            "Comprehensive Skill Assessment",
            "SkillLens",
            NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
        )
        .expect("stage");

        let footer = dom::select_nodes(&staged.content, ".pdf-report-footer");
        let text = footer[0].text_contents();
        assert!(text.contains("Generated on August 6, 2026"), "got: {}", text);
        assert!(text.contains("SkillLens \u{00a9} 2026"));
    }

    #[test]
    fn staging_fails_cleanly_without_a_body_to_mount_on() {
        let fragment = dom::make_element("div", &[]);
        let err = stage_for_rasterization(
            &fragment,
            dom::make_element("div", &[]),
            "t",
            "s",
            "b",
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        )
        .err()
        .expect("must fail");
        assert!(matches!(err, SkillPrintError::DetachedTarget));
    }
}
