use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::{RgbImage, imageops};
use tracing::debug;

/// EXIF orientation tag (1..=8). Anything else is treated as identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Orientation(u16);

impl Orientation {
    pub const IDENTITY: Self = Self(1);

    pub fn from_exif(tag: u16) -> Self {
        if (1..=8).contains(&tag) {
            Self(tag)
        } else {
            Self::IDENTITY
        }
    }

    pub fn tag(&self) -> u16 {
        self.0
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Whether applying this orientation swaps width and height.
    pub fn swaps_axes(&self) -> bool {
        matches!(self.0, 5..=8)
    }

    pub fn apply(&self, img: RgbImage) -> RgbImage {
        match self.0 {
            2 => imageops::flip_horizontal(&img),
            3 => imageops::rotate180(&img),
            4 => imageops::flip_vertical(&img),
            // transpose
            5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
            6 => imageops::rotate90(&img),
            // transverse
            7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
            8 => imageops::rotate270(&img),
            _ => img,
        }
    }

    pub fn apply_ref<'a>(&self, img: &'a RgbImage) -> Cow<'a, RgbImage> {
        if self.is_identity() {
            Cow::Borrowed(img)
        } else {
            Cow::Owned(self.apply(img.clone()))
        }
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Header-only EXIF read; files without metadata are identity.
pub fn read_orientation(path: &Path) -> Orientation {
    let Ok(file) = File::open(path) else {
        return Orientation::IDENTITY;
    };
    let mut buf = BufReader::new(file);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut buf) else {
        return Orientation::IDENTITY;
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(|val| {
            debug!("exif orientation {} for {}", val, path.display());
            Orientation::from_exif(val as u16)
        })
        .unwrap_or_default()
}
