use crate::{convolve::ConvolveError, model::ModelError, psf::PsfError, pupil::PupilError};

/// Coarse classification of the failures of the simulation core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParameter,
    DimensionMismatch,
    UnsupportedMode,
    /// writing an image or an array to disk failed
    Export,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `pupil` module")]
    Pupil(#[from] PupilError),
    #[error("Error in the `psf` module")]
    Psf(#[from] PsfError),
    #[error("Error in the `convolve` module")]
    Convolve(#[from] ConvolveError),
    #[error("Error in the `model` module")]
    Model(#[from] ModelError),
    #[error("failed to encode the image")]
    Encode(#[from] image::ImageError),
}
impl Error {
    /// Returns the kind of failure, independently of the module it was raised in
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Pupil(e) => e.kind(),
            Error::Psf(e) => e.kind(),
            Error::Convolve(e) => e.kind(),
            Error::Model(e) => e.kind(),
            Error::Encode(_) => ErrorKind::Export,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
