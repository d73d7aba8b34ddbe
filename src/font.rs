use crate::error::SkillPrintError;
use ttf_parser::Face;

/// Advance used for characters with no registered face or no glyph coverage,
/// as a fraction of the font size. Keeps layout and pagination math stable
/// even when nothing can be painted for a run.
const FALLBACK_ADVANCE_EM: f32 = 0.5;

/// Registered font programs for text rasterization. The engine works without
/// any registered face: text still occupies its measured space so pagination
/// is unaffected, but glyphs are not painted and a warning is logged.
#[derive(Default)]
pub struct FontStore {
    faces: Vec<(String, Vec<u8>)>,
}

impl FontStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<(), SkillPrintError> {
        let name = name.into();
        Face::parse(&data, 0).map_err(|err| {
            SkillPrintError::InvalidConfiguration(format!(
                "font {:?} failed to parse: {}",
                name, err
            ))
        })?;
        self.faces.push((name, data));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// The face used for body text. Registration order decides priority.
    pub(crate) fn primary_face(&self) -> Option<Face<'_>> {
        let (_, data) = self.faces.first()?;
        Face::parse(data, 0).ok()
    }
}

pub(crate) fn char_advance(face: Option<&Face<'_>>, ch: char, size_px: f32) -> f32 {
    let Some(face) = face else {
        return size_px * FALLBACK_ADVANCE_EM;
    };
    let advance = face
        .glyph_index(ch)
        .and_then(|glyph| face.glyph_hor_advance(glyph));
    match advance {
        Some(advance) => advance as f32 * size_px / face.units_per_em() as f32,
        None => size_px * FALLBACK_ADVANCE_EM,
    }
}

pub(crate) fn text_advance(face: Option<&Face<'_>>, text: &str, size_px: f32) -> f32 {
    text.chars().map(|ch| char_advance(face, ch, size_px)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_metric_measures_text_without_a_face() {
        let width = text_advance(None, "Rust", 16.0);
        assert!((width - 4.0 * 16.0 * FALLBACK_ADVANCE_EM).abs() < f32::EPSILON);
    }

    #[test]
    fn registering_garbage_bytes_is_rejected() {
        let mut store = FontStore::new();
        let err = store.register("broken", vec![0u8; 16]).err().expect("reject");
        assert!(matches!(err, SkillPrintError::InvalidConfiguration(_)));
        assert!(store.is_empty());
    }
}
