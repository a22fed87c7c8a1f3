use std::path::PathBuf;

use crate::display::ScreenId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to decode image '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image path '{0}' does not exist")]
    InvalidImagePath(PathBuf),

    #[error("invalid background '{0}'")]
    InvalidBackgroundSpec(String),

    #[error("{0}")]
    Monitor(String),

    #[error("screen {received:?} is not the one this manager is bound to ({bound:?})")]
    Binding { bound: ScreenId, received: ScreenId },
}

impl Error {
    /// Per-display problems that only affect the display they occur on.
    pub fn is_per_display(&self) -> bool {
        matches!(
            self,
            Error::Decode { .. } | Error::InvalidImagePath(_) | Error::InvalidBackgroundSpec(_)
        )
    }
}
