use crate::error::SkillPrintError;
use crate::raster::RasterImage;
use crate::types::{PageGeometry, Pt};
use image::codecs::jpeg::JpegEncoder;
use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, dictionary};

const PAGE_NUMBER_FONT_SIZE: f32 = 10.0;
const PAGE_NUMBER_GRAY: f32 = 0.39;
/// Stamp position relative to the page edges, matching the footer margin of
/// the generated layout: 25mm in from the right, 10mm up from the bottom.
const PAGE_NUMBER_INSET_RIGHT_MM: f32 = 25.0;
const PAGE_NUMBER_INSET_BOTTOM_MM: f32 = 10.0;

const JPEG_QUALITY: u8 = 90;

/// Fixed properties carried by every exported document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: String,
    pub subject: String,
    pub author: String,
    pub creator: String,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: "SkillLens Analysis Report".to_string(),
            subject: "Skill Analysis Results".to_string(),
            author: "SkillLens".to_string(),
            creator: "SkillLens Application".to_string(),
        }
    }
}

/// One page of the stitched sequence: the shared raster is re-placed on every
/// page, shifted up by one page height per page, so each page shows its own
/// window into the same tall image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageArtifact {
    pub number: usize,
    /// Vertical offset of the raster's top edge from the page top. Zero on
    /// the first page, then one page height more negative per page.
    pub offset: Pt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    pub page_width: Pt,
    pub page_height: Pt,
    /// Full proportional height of the raster at page width.
    pub image_height: Pt,
    pub pages: Vec<PageArtifact>,
}

impl PagePlan {
    /// Scales the raster to the fixed page width and windows it across pages.
    /// The produced count always equals `ceil(image_height / page_height)`
    /// with a minimum of one page; every vertical pixel of the raster lands
    /// on exactly one page's worth of the sequence.
    pub fn compute(raster_width_px: u32, raster_height_px: u32, geometry: &PageGeometry) -> PagePlan {
        let page_width = geometry.page.width;
        let page_height = geometry.page.height;
        let image_height = if raster_width_px == 0 {
            Pt::ZERO
        } else {
            Pt::from_f32(raster_height_px as f32 * page_width.to_f32() / raster_width_px as f32)
        };

        let mut pages = vec![PageArtifact {
            number: 1,
            offset: Pt::ZERO,
        }];
        let mut height_left = image_height - page_height;
        let mut offset = Pt::ZERO;
        while height_left > Pt::ZERO {
            offset -= page_height;
            pages.push(PageArtifact {
                number: pages.len() + 1,
                offset,
            });
            height_left -= page_height;
        }

        PagePlan {
            page_width,
            page_height,
            image_height,
            pages,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Assembles the final PDF: a shared image XObject placed once per page at
/// that page's offset, a page number stamp on every page (the first page is
/// stamped after the loop so single-page output numbers consistently), and
/// the document information dictionary.
pub(crate) fn build_pdf(
    plan: &PagePlan,
    raster: &RasterImage,
    metadata: &DocumentMetadata,
) -> Result<LoDocument, SkillPrintError> {
    let mut doc = LoDocument::with_version("1.7");
    let pages_id = doc.new_object_id();

    let jpeg = encode_raster_jpeg(raster)?;
    let image_id = doc.add_object(LoStream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => raster.px_width() as i64,
            "Height" => raster.px_height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im0" => image_id },
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut stamps: Vec<String> = plan.pages[1..]
        .iter()
        .map(|artifact| page_number_stamp(plan, artifact.number))
        .collect();
    stamps.insert(0, page_number_stamp(plan, 1));

    let mut kids: Vec<LoObject> = Vec::with_capacity(plan.pages.len());
    for (artifact, stamp) in plan.pages.iter().zip(stamps) {
        let content = format!(
            "q\n{w:.2} 0 0 {h:.2} 0 {y:.2} cm\n/Im0 Do\nQ\n{stamp}",
            w = plan.page_width.to_f32(),
            h = plan.image_height.to_f32(),
            y = (plan.page_height - plan.image_height - artifact.offset).to_f32(),
        );
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                plan.page_width.to_f32().into(),
                plan.page_height.to_f32().into(),
            ],
        });
        kids.push(LoObject::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => plan.pages.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let info_id = doc.add_object(dictionary! {
        "Title" => LoObject::string_literal(metadata.title.clone()),
        "Subject" => LoObject::string_literal(metadata.subject.clone()),
        "Author" => LoObject::string_literal(metadata.author.clone()),
        "Creator" => LoObject::string_literal(metadata.creator.clone()),
        "CreationDate" => LoObject::string_literal(
            chrono::Local::now().format("D:%Y%m%d%H%M%S").to_string(),
        ),
    });
    doc.trailer.set("Info", info_id);

    doc.compress();
    log::debug!(
        "assembled pdf: {} pages, image height {:.1}pt",
        plan.pages.len(),
        plan.image_height.to_f32()
    );
    Ok(doc)
}

fn page_number_stamp(plan: &PagePlan, number: usize) -> String {
    let x = (plan.page_width - Pt::from_mm(PAGE_NUMBER_INSET_RIGHT_MM)).to_f32();
    let y = Pt::from_mm(PAGE_NUMBER_INSET_BOTTOM_MM).to_f32();
    format!(
        "BT\n/F1 {size} Tf\n{g} {g} {g} rg\n1 0 0 1 {x:.2} {y:.2} Tm\n(Page {number}) Tj\nET\n",
        size = PAGE_NUMBER_FONT_SIZE,
        g = PAGE_NUMBER_GRAY,
    )
}

/// Flattens the premultiplied raster over opaque white and encodes it as a
/// baseline JPEG for DCTDecode embedding.
fn encode_raster_jpeg(raster: &RasterImage) -> Result<Vec<u8>, SkillPrintError> {
    let pixmap = raster.pixmap();
    let mut rgb = Vec::with_capacity(pixmap.width() as usize * pixmap.height() as usize * 3);
    for px in pixmap.pixels() {
        let inverse = 255 - px.alpha() as u16;
        rgb.push((px.red() as u16 + inverse).min(255) as u8);
        rgb.push((px.green() as u16 + inverse).min(255) as u8);
        rgb.push((px.blue() as u16 + inverse).min(255) as u8);
    }
    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    encoder
        .encode(
            &rgb,
            pixmap.width(),
            pixmap.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|err| SkillPrintError::ImageEncode(err.to_string()))?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Size;

    fn geometry() -> PageGeometry {
        PageGeometry::default()
    }

    fn mm_tall_plan(height_mm: f32) -> PagePlan {
        // An 800px-wide raster whose scaled height equals `height_mm`:
        // raster_h = height_mm/210mm * 800px.
        let raster_h = (height_mm / 210.0 * 800.0).round() as u32;
        PagePlan::compute(800, raster_h, &geometry())
    }

    #[test]
    fn short_report_fits_one_page() {
        let plan = mm_tall_plan(280.0);
        assert_eq!(plan.page_count(), 1);
        assert_eq!(plan.pages[0].number, 1);
        assert_eq!(plan.pages[0].offset, Pt::ZERO);
    }

    #[test]
    fn long_report_windows_the_raster_across_pages() {
        let plan = mm_tall_plan(900.0);
        assert_eq!(plan.page_count(), 4, "ceil(900/297) pages");
        for (index, artifact) in plan.pages.iter().enumerate() {
            assert_eq!(artifact.number, index + 1);
            let expected = if index == 0 {
                Pt::ZERO
            } else {
                -(plan.page_height * index as f32)
            };
            assert!(
                (artifact.offset.to_f32() - expected.to_f32()).abs() < 0.01,
                "page {} shifts the shared raster by whole page heights",
                index + 1
            );
        }
    }

    #[test]
    fn page_count_matches_the_ceiling_formula() {
        for (raster_w, raster_h) in [(800u32, 100u32), (800, 2400), (1600, 9000), (640, 640)] {
            let plan = PagePlan::compute(raster_w, raster_h, &geometry());
            let image_height =
                raster_h as f32 * plan.page_width.to_f32() / raster_w as f32;
            let expected = (image_height / plan.page_height.to_f32()).ceil().max(1.0) as usize;
            assert_eq!(plan.page_count(), expected, "{}x{}", raster_w, raster_h);
        }
    }

    #[test]
    fn degenerate_raster_still_yields_one_page() {
        let plan = PagePlan::compute(0, 0, &geometry());
        assert_eq!(plan.page_count(), 1);
        assert_eq!(plan.image_height, Pt::ZERO);
    }

    #[test]
    fn page_width_is_always_the_physical_a4_width() {
        let plan = PagePlan::compute(123, 4567, &geometry());
        assert_eq!(plan.page_width, Size::a4().width);
        assert_eq!(plan.page_height, Size::a4().height);
    }

    #[test]
    fn first_page_is_always_stamped_page_one() {
        let plan = mm_tall_plan(100.0);
        let stamp = page_number_stamp(&plan, 1);
        assert!(stamp.contains("(Page 1) Tj"));
        let stamp = page_number_stamp(&plan, 4);
        assert!(stamp.contains("(Page 4) Tj"));
    }
}
