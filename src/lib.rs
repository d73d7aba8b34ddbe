mod compose;
mod dom;
mod error;
mod events;
mod font;
mod pdf;
mod preview;
mod raster;
mod reflow;
mod sanitize;
mod theme;
mod types;

pub use error::SkillPrintError;
pub use events::{EventHub, ExportEvent, SubscriptionId};
pub use font::FontStore;
pub use pdf::{DocumentMetadata, PageArtifact, PagePlan};
pub use preview::{DisplaySurface, HtmlFileSurface, PreviewDocument};
pub use reflow::reflow_charts_for_print;
pub use sanitize::sanitize;
pub use theme::{
    BackgroundTier, NeutralFamily, ShadeLevel, TextTier, TintLevel, fix_icon_and_emoji_sizing,
    force_light_appearance,
};
pub use types::{Color, PageGeometry, Pt, Size};

use chrono::NaiveDate;
use kuchiki::NodeRef;
use raster::RasterOptions;
use std::path::{Path, PathBuf};

pub const DEFAULT_FILENAME: &str = "skill-analysis";
pub const REPORT_TITLE: &str = "SkillLens Analysis Report";
pub const REPORT_SUBTITLE: &str = "Comprehensive Skill Assessment";
pub const REPORT_BRAND: &str = "SkillLens";

/// Width of the off-screen staging surface in CSS px, decoupled from any
/// real viewport so export output is independent of window size.
const STAGING_WIDTH_PX: f32 = 800.0;

/// The export and preview engine for SkillLens reports.
///
/// Both operations take a reference to mounted report markup, never mutate
/// it, and run the same static-document transformations over an owned clone:
/// sanitize, icon/emoji sizing, light-mode normalization, chart reflow.
/// Export then stages, rasterizes and paginates the clone into an A4 PDF;
/// preview re-instantiates it inside an independent display surface.
pub struct SkillPrint {
    geometry: PageGeometry,
    metadata: DocumentMetadata,
    fonts: FontStore,
    events: EventHub,
    generation_date: Option<NaiveDate>,
    preview_stylesheets: Vec<String>,
}

impl Default for SkillPrint {
    fn default() -> Self {
        SkillPrint {
            geometry: PageGeometry::default(),
            metadata: DocumentMetadata::default(),
            fonts: FontStore::new(),
            events: EventHub::new(),
            generation_date: None,
            preview_stylesheets: Vec::new(),
        }
    }
}

pub struct SkillPrintBuilder {
    geometry: PageGeometry,
    metadata: DocumentMetadata,
    fonts: FontStore,
    events: EventHub,
    generation_date: Option<NaiveDate>,
    preview_stylesheets: Vec<String>,
}

impl SkillPrint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> SkillPrintBuilder {
        SkillPrintBuilder {
            geometry: PageGeometry::default(),
            metadata: DocumentMetadata::default(),
            fonts: FontStore::new(),
            events: EventHub::new(),
            generation_date: None,
            preview_stylesheets: Vec::new(),
        }
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Runs the full export pipeline and returns the assembled document
    /// without touching the filesystem.
    pub fn render(&self, target: &NodeRef) -> Result<RenderedReport, SkillPrintError> {
        let host_document = dom::owning_document(target).ok_or(SkillPrintError::DetachedTarget)?;

        let clone = dom::deep_clone(target);
        sanitize::sanitize(Some(&clone));

        let staged = compose::stage_for_rasterization(
            &host_document,
            clone,
            &self.metadata.title,
            REPORT_SUBTITLE,
            REPORT_BRAND,
            self.generation_date
                .unwrap_or_else(|| chrono::Local::now().date_naive()),
        )?;
        theme::fix_icon_and_emoji_sizing(&staged.content);
        theme::force_light_appearance(&staged.content);
        reflow::reflow_charts_for_print(&staged.content);

        let options = RasterOptions {
            content_width_px: STAGING_WIDTH_PX,
            oversample: self.geometry.oversample,
            background: self.geometry.background,
        };
        // The staging guard must outlive rasterization; it detaches the
        // container on every exit path, including the `?` ones above/below.
        let raster = raster::rasterize(&staged.content, &options, &self.fonts)?;
        let plan = PagePlan::compute(raster.px_width(), raster.px_height(), &self.geometry);
        let pdf = pdf::build_pdf(&plan, &raster, &self.metadata)?;
        drop(staged);

        Ok(RenderedReport {
            raster_width_px: raster.px_width(),
            raster_height_px: raster.px_height(),
            pdf,
            plan,
        })
    }

    /// Exports the target subtree as `<path>`, the "save as file" action.
    pub fn export_to_file(
        &self,
        target: &NodeRef,
        path: impl AsRef<Path>,
    ) -> Result<ExportSummary, SkillPrintError> {
        let path = path.as_ref();
        self.events.emit(&ExportEvent::ExportStarted {
            target: describe_target(target),
        });
        match self.export_inner(target, path) {
            Ok(summary) => {
                self.events.emit(&ExportEvent::ExportFinished {
                    pages: summary.pages,
                });
                Ok(summary)
            }
            Err(err) => {
                self.events.emit(&ExportEvent::ExportFailed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn export_inner(
        &self,
        target: &NodeRef,
        path: &Path,
    ) -> Result<ExportSummary, SkillPrintError> {
        let mut rendered = self.render(target)?;
        rendered
            .pdf
            .save(path)
            .map_err(|err| SkillPrintError::Pdf(format!("cannot save {}: {}", path.display(), err)))?;
        Ok(ExportSummary {
            pages: rendered.plan.page_count(),
            path: path.to_path_buf(),
        })
    }

    /// Resolves the export target by element id, the convenience entry point
    /// UI call sites use, and fails fast with a descriptive error when the
    /// element is missing. No staging resources exist at that point.
    pub fn export_element_by_id(
        &self,
        document: &NodeRef,
        id: &str,
        path: impl AsRef<Path>,
    ) -> Result<ExportSummary, SkillPrintError> {
        let target = dom::find_by_id(document, id)
            .ok_or_else(|| SkillPrintError::MissingTarget(format!("element with id {:?}", id)))?;
        self.export_to_file(&target, path)
    }

    /// Builds the read-only preview document without presenting it.
    pub fn preview_document(&self, target: &NodeRef) -> Result<PreviewDocument, SkillPrintError> {
        let host_document = dom::owning_document(target).ok_or(SkillPrintError::DetachedTarget)?;
        preview::build_preview_document(
            target,
            &host_document,
            &self.preview_stylesheets,
            &self.metadata.title,
        )
    }

    /// Opens the preview in the given display surface. A blocked surface
    /// propagates as an error; there is no fallback to export.
    pub fn open_preview(
        &self,
        target: &NodeRef,
        surface: &mut dyn DisplaySurface,
    ) -> Result<PreviewDocument, SkillPrintError> {
        let document = self.preview_document(target)?;
        surface.present(&document.title, &document.html())?;
        self.events.emit(&ExportEvent::PreviewOpened {
            title: document.title.clone(),
        });
        Ok(document)
    }
}

impl SkillPrintBuilder {
    pub fn page_geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn oversample(mut self, oversample: f32) -> Self {
        self.geometry.oversample = oversample;
        self
    }

    pub fn metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn register_font(
        mut self,
        name: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Self, SkillPrintError> {
        self.fonts.register(name, data)?;
        Ok(self)
    }

    pub fn event_hub(mut self, events: EventHub) -> Self {
        self.events = events;
        self
    }

    /// Pins the footer generation date, primarily for reproducible output.
    pub fn generation_date(mut self, date: NaiveDate) -> Self {
        self.generation_date = Some(date);
        self
    }

    /// Additional stylesheet references appended to preview surfaces after
    /// the fixed print/export pair.
    pub fn preview_stylesheet(mut self, href: impl Into<String>) -> Self {
        self.preview_stylesheets.push(href.into());
        self
    }

    pub fn build(self) -> Result<SkillPrint, SkillPrintError> {
        if !self.geometry.oversample.is_finite() || self.geometry.oversample <= 0.0 {
            return Err(SkillPrintError::InvalidConfiguration(
                "oversample must be a positive factor".to_string(),
            ));
        }
        if self.geometry.page.width <= Pt::ZERO || self.geometry.page.height <= Pt::ZERO {
            return Err(SkillPrintError::InvalidConfiguration(
                "page size must be positive".to_string(),
            ));
        }
        Ok(SkillPrint {
            geometry: self.geometry,
            metadata: self.metadata,
            fonts: self.fonts,
            events: self.events,
            generation_date: self.generation_date,
            preview_stylesheets: self.preview_stylesheets,
        })
    }
}

/// The assembled document plus the page plan it was stitched from.
pub struct RenderedReport {
    pub pdf: lopdf::Document,
    pub plan: PagePlan,
    pub raster_width_px: u32,
    pub raster_height_px: u32,
}

impl RenderedReport {
    pub fn page_count(&self) -> usize {
        self.plan.page_count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub pages: usize,
    pub path: PathBuf,
}

fn describe_target(target: &NodeRef) -> String {
    dom::get_attr(target, "id")
        .map(|id| format!("#{}", id))
        .or_else(|| dom::tag_name(target))
        .unwrap_or_else(|| "unnamed subtree".to_string())
}
