pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Core(#[from] vizier_core::Error),
    #[error("failed to allocate pixmap for preview rendering")]
    PixmapAlloc,
    #[error("failed to encode PNG")]
    PngEncode,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
