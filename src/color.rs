//! Color-space names recognized on the channel axis.

/// Resolves axis names to canonical color-space names.
///
/// The registry is owned by the caller and borrowed by [`IcsCodec`](crate::IcsCodec)
/// for as long as the codec lives.
pub trait ColorSpaceRegistry {
    /// Returns the canonical spelling of `name` if it names a known color
    /// space. Matching is case-insensitive.
    fn canonical_name(&self, name: &str) -> Option<&str>;
}

/// The color spaces known to ICS files written by microscopy software.
#[derive(Debug, Clone, Copy, Default)]
pub struct KnownColorSpaces;

const KNOWN_COLOR_SPACES: &[&str] = &[
    "RGB", "sRGB", "Lab", "Luv", "LCH", "CMY", "CMYK", "XYZ", "Yxy", "HSI", "ICH", "ISH", "HCV", "HSV",
];

impl ColorSpaceRegistry for KnownColorSpaces {
    fn canonical_name(&self, name: &str) -> Option<&str> {
        KNOWN_COLOR_SPACES
            .iter()
            .copied()
            .find(|known| known.eq_ignore_ascii_case(name))
    }
}

/// A registry backed by a caller-supplied list of names.
#[derive(Debug, Clone, Default)]
pub struct ColorSpaceList {
    names: Vec<String>,
}

impl ColorSpaceList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { names: names.into_iter().map(Into::into).collect() }
    }
}

impl ColorSpaceRegistry for ColorSpaceList {
    fn canonical_name(&self, name: &str) -> Option<&str> {
        self.names
            .iter()
            .find(|known| known.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_spaces_normalize_case() {
        assert_eq!(KnownColorSpaces.canonical_name("rgb"), Some("RGB"));
        assert_eq!(KnownColorSpaces.canonical_name("SRGB"), Some("sRGB"));
        assert_eq!(KnownColorSpaces.canonical_name("yxy"), Some("Yxy"));
        assert_eq!(KnownColorSpaces.canonical_name("x"), None);
    }

    #[test]
    fn test_custom_list() {
        let list = ColorSpaceList::new(["OKLab"]);
        assert_eq!(list.canonical_name("oklab"), Some("OKLab"));
        assert_eq!(list.canonical_name("RGB"), None);
    }
}
