use std::fmt;

#[derive(Debug)]
pub enum SkillPrintError {
    MissingTarget(String),
    DetachedTarget,
    InvalidConfiguration(String),
    Raster(String),
    ImageEncode(String),
    Pdf(String),
    SurfaceBlocked(String),
    Io(std::io::Error),
}

impl fmt::Display for SkillPrintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkillPrintError::MissingTarget(target) => {
                write!(f, "export target element not found: {}", target)
            }
            SkillPrintError::DetachedTarget => {
                write!(f, "export target is not mounted in a report document")
            }
            SkillPrintError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            SkillPrintError::Raster(message) => write!(f, "rasterization failed: {}", message),
            SkillPrintError::ImageEncode(message) => {
                write!(f, "page image encoding failed: {}", message)
            }
            SkillPrintError::Pdf(message) => write!(f, "pdf assembly failed: {}", message),
            SkillPrintError::SurfaceBlocked(message) => {
                write!(f, "preview surface failed to open: {}", message)
            }
            SkillPrintError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for SkillPrintError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SkillPrintError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SkillPrintError {
    fn from(value: std::io::Error) -> Self {
        SkillPrintError::Io(value)
    }
}
