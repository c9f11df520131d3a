use std::ops::{Deref, DerefMut};

use super::traits::EngineImage;

/// Owns an [`EngineImage`] and disposes it when dropped.
pub struct ImageGuard {
    image: Box<dyn EngineImage>,
}

impl ImageGuard {
    pub fn new(image: Box<dyn EngineImage>) -> Self {
        Self { image }
    }
}

impl Deref for ImageGuard {
    type Target = dyn EngineImage;

    fn deref(&self) -> &Self::Target {
        self.image.as_ref()
    }
}

impl DerefMut for ImageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.image.as_mut()
    }
}

impl Drop for ImageGuard {
    fn drop(&mut self) {
        self.image.dispose();
    }
}
