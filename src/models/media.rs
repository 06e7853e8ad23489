/// Media kinds the library serves, as a closed lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Epub,
    Mobi,
    Mp3,
    Mp4,
    Png,
    Jpeg,
    Other,
}

impl MediaKind {
    /// Maps a file extension to a media kind (case-insensitive).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => MediaKind::Pdf,
            "epub" => MediaKind::Epub,
            "mobi" => MediaKind::Mobi,
            "mp3" => MediaKind::Mp3,
            "mp4" => MediaKind::Mp4,
            "png" => MediaKind::Png,
            "jpg" | "jpeg" => MediaKind::Jpeg,
            _ => MediaKind::Other,
        }
    }

    /// Maps a storage reference to a media kind via its extension.
    pub fn from_storage_ref(storage_ref: &str) -> Self {
        storage_ref
            .rsplit_once('.')
            .map(|(_, ext)| Self::from_extension(ext))
            .unwrap_or(MediaKind::Other)
    }

    /// The MIME string for this kind.
    pub fn content_type(self) -> &'static str {
        match self {
            MediaKind::Pdf => "application/pdf",
            MediaKind::Epub => "application/epub+zip",
            MediaKind::Mobi => "application/x-mobipocket-ebook",
            MediaKind::Mp3 => "audio/mpeg",
            MediaKind::Mp4 => "video/mp4",
            MediaKind::Png => "image/png",
            MediaKind::Jpeg => "image/jpeg",
            MediaKind::Other => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_lookup() {
        assert_eq!(MediaKind::from_extension("PDF"), MediaKind::Pdf);
        assert_eq!(MediaKind::from_extension("jpeg"), MediaKind::Jpeg);
        assert_eq!(MediaKind::from_extension("exe"), MediaKind::Other);
    }

    #[test]
    fn storage_ref_lookup() {
        assert_eq!(
            MediaKind::from_storage_ref("protected/abc/123.epub"),
            MediaKind::Epub
        );
        assert_eq!(MediaKind::from_storage_ref("no-extension"), MediaKind::Other);
        assert_eq!(
            MediaKind::from_storage_ref("").content_type(),
            "application/octet-stream"
        );
    }
}
