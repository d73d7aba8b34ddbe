use crate::dom;
use crate::error::SkillPrintError;
use crate::reflow;
use crate::sanitize;
use crate::theme;
use kuchiki::NodeRef;
use kuchiki::traits::TendrilSink;
use std::path::PathBuf;

pub(crate) const CONTENT_SLOT_ID: &str = "report-content";

/// Print/export stylesheets appended to every preview surface after the
/// stylesheets copied over from the originating surface.
pub(crate) const LOCAL_PRINT_STYLESHEETS: [&str; 2] =
    ["/styles/print.css", "/styles/pdf-export.css"];

/// Self-contained scaffold for the preview surface. The surface is an
/// independent browsing context with none of the originating page's style or
/// script state, so everything it needs ships inline.
const PREVIEW_SCAFFOLD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>SkillLens Analysis Report</title>
<style>
  body {
    margin: 0;
    padding: 20px;
    font-family: system-ui, -apple-system, sans-serif;
    background-color: #ffffff;
    color: #212529;
    line-height: 1.5;
  }
  .preview-container {
    max-width: 800px;
    margin: 0 auto;
    background-color: #fff;
    box-shadow: 0 0 20px rgba(0, 0, 0, 0.1);
    border-radius: 8px;
    overflow: hidden;
  }
  .preview-header {
    background-color: #f1f5f9;
    padding: 15px 20px;
    border-bottom: 1px solid #e2e8f0;
    text-align: center;
  }
  .preview-title {
    font-size: 1.5rem;
    font-weight: 600;
    color: #334155;
    margin: 0;
  }
  .preview-subtitle {
    font-size: 1rem;
    color: #64748b;
    margin: 5px 0 0;
  }
  .preview-content {
    padding: 30px;
  }
  .charts-container {
    display: flex;
    flex-wrap: wrap;
    justify-content: space-between;
    gap: 20px;
    margin-bottom: 30px;
  }
  a {
    color: #3b82f6;
    text-decoration: none;
  }
  @media print {
    .preview-container {
      box-shadow: none;
      max-width: 100%;
    }
    body {
      padding: 0;
      background-color: #fff;
    }
    a {
      color: #000;
      text-decoration: underline;
    }
  }
</style>
</head>
<body>
<div class="preview-container">
  <div class="preview-header">
    <h1 class="preview-title">SkillLens Analysis Report</h1>
    <p class="preview-subtitle">Comprehensive Skill Assessment</p>
  </div>
  <div class="preview-content" id="report-content"></div>
</div>
</body>
</html>
"#;

/// An independent display surface the preview renders into. Implementations
/// present the finished markup (a browser window, a file, a test recorder);
/// a failed open must surface an error, never silently drop the preview.
pub trait DisplaySurface {
    fn present(&mut self, title: &str, html: &str) -> Result<(), SkillPrintError>;
}

/// File-backed surface: writes the preview markup for an external viewer.
pub struct HtmlFileSurface {
    path: PathBuf,
}

impl HtmlFileSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl DisplaySurface for HtmlFileSurface {
    fn present(&mut self, _title: &str, html: &str) -> Result<(), SkillPrintError> {
        std::fs::write(&self.path, html).map_err(|err| {
            SkillPrintError::SurfaceBlocked(format!(
                "cannot write preview to {}: {}",
                self.path.display(),
                err
            ))
        })
    }
}

/// A fully transformed, read-only preview of the report.
pub struct PreviewDocument {
    pub title: String,
    document: NodeRef,
}

impl PreviewDocument {
    pub fn document(&self) -> &NodeRef {
        &self.document
    }

    pub fn html(&self) -> String {
        dom::serialize_html(&self.document)
    }
}

/// The same transformation pipeline the export path runs, re-applied inside
/// the new surface's own tree. The four passes are pure functions over the
/// markup, so export and preview share one implementation instead of two.
pub(crate) fn apply_static_transforms(root: &NodeRef) {
    sanitize::sanitize(Some(root));
    theme::fix_icon_and_emoji_sizing(root);
    theme::force_light_appearance(root);
    reflow::reflow_charts_for_print(root);
}

/// Builds the preview surface document: scaffold, stylesheet references
/// copied from the originating document, the two fixed print stylesheets,
/// the target markup re-instantiated in the new context, and the static
/// transforms re-run inside that context.
pub(crate) fn build_preview_document(
    target: &NodeRef,
    origin_document: &NodeRef,
    extra_stylesheets: &[String],
    title: &str,
) -> Result<PreviewDocument, SkillPrintError> {
    let document = kuchiki::parse_html().one(PREVIEW_SCAFFOLD);
    let head = document
        .select_first("head")
        .map_err(|()| SkillPrintError::SurfaceBlocked("scaffold has no head".to_string()))?
        .as_node()
        .clone();

    set_text(&document, "title", title);
    set_text(&document, ".preview-title", title);

    let mut copied = 0usize;
    for link in dom::select_nodes(origin_document, "link[rel=\"stylesheet\"]") {
        if let Some(href) = dom::get_attr(&link, "href") {
            head.append(stylesheet_link(&href));
            copied += 1;
        }
    }
    for href in LOCAL_PRINT_STYLESHEETS {
        head.append(stylesheet_link(href));
    }
    for href in extra_stylesheets {
        head.append(stylesheet_link(href));
    }
    log::debug!(
        "preview surface carries {} copied + {} fixed stylesheet links",
        copied,
        LOCAL_PRINT_STYLESHEETS.len() + extra_stylesheets.len()
    );

    let slot = dom::find_by_id(&document, CONTENT_SLOT_ID).ok_or_else(|| {
        SkillPrintError::SurfaceBlocked("scaffold has no content slot".to_string())
    })?;

    // Markup crosses the surface boundary as text, never as shared nodes:
    // serialize in the originating context, re-parse in the new one.
    let markup = dom::serialize_html(target);
    let reparsed = kuchiki::parse_html().one(markup);
    if let Some(body) = dom::document_body(&reparsed) {
        let children: Vec<NodeRef> = body.children().collect();
        for child in children {
            child.detach();
            slot.append(child);
        }
    }

    let surface_body = dom::document_body(&document).ok_or_else(|| {
        SkillPrintError::SurfaceBlocked("scaffold has no body".to_string())
    })?;
    apply_static_transforms(&surface_body);

    Ok(PreviewDocument {
        title: title.to_string(),
        document,
    })
}

fn stylesheet_link(href: &str) -> NodeRef {
    dom::make_element("link", &[("rel", "stylesheet"), ("href", href)])
}

fn set_text(document: &NodeRef, selector: &str, text: &str) {
    if let Ok(node) = document.select_first(selector) {
        let node = node.as_node();
        for child in node.children().collect::<Vec<_>>() {
            child.detach();
        }
        node.append(NodeRef::new_text(text));
    }
}
