use std::io::Cursor;
use std::path::Path;

use lofty::error::LoftyError;
use lofty::file::{FileType, TaggedFile};
use lofty::picture::{Picture, PictureType};
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};
use lofty::probe::Probe;

/// Raw tag fields as found in the file. Nothing is defaulted here.
#[derive(Debug, Default, Clone)]
pub struct TagData {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_secs: Option<f64>,
    pub cover: Option<CoverArt>,
}

#[derive(Debug, Clone)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime: Option<String>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag parse error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// Anything that can turn an audio file into [`TagData`].
pub trait TagExtractor: Send + Sync {
    fn extract_path(&self, path: &Path) -> Result<TagData, MetadataError>;

    /// `mime` is the declared content type, used when the bytes alone don't
    /// identify the container.
    fn extract_bytes(&self, bytes: &[u8], mime: Option<&str>) -> Result<TagData, MetadataError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyExtractor;

impl TagExtractor for LoftyExtractor {
    fn extract_path(&self, path: &Path) -> Result<TagData, MetadataError> {
        let tagged_file = lofty::read_from_path(path)?;
        Ok(tag_data(&tagged_file))
    }

    fn extract_bytes(&self, bytes: &[u8], mime: Option<&str>) -> Result<TagData, MetadataError> {
        let mut probe = Probe::new(Cursor::new(bytes)).guess_file_type()?;
        if probe.file_type().is_none() {
            if let Some(file_type) = mime.and_then(file_type_from_mime) {
                probe = probe.set_file_type(file_type);
            }
        }
        let tagged_file = probe.read()?;
        Ok(tag_data(&tagged_file))
    }
}

fn tag_data(tagged_file: &TaggedFile) -> TagData {
    let mut info = TagData::default();

    let duration = tagged_file.properties().duration();
    if !duration.is_zero() {
        info.duration_secs = Some(duration.as_secs_f64());
    }

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        info.title = tag.get_string(&ItemKey::TrackTitle).map(|v| v.to_string());
        info.album = tag.get_string(&ItemKey::AlbumTitle).map(|v| v.to_string());
        let album_artist = tag.get_string(&ItemKey::AlbumArtist).map(|v| v.to_string());
        let track_artist = tag.get_string(&ItemKey::TrackArtist).map(|v| v.to_string());
        info.artist = track_artist.or(album_artist);
        info.cover = pick_picture(tag.pictures()).map(|picture| {
            let data = picture.data().to_vec();
            let mime = guess_mime(&data);
            CoverArt { data, mime }
        });
    }

    info
}

fn file_type_from_mime(mime: &str) -> Option<FileType> {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    mime_guess::get_mime_extensions_str(essence)?
        .iter()
        .find_map(|ext| FileType::from_ext(ext))
}

fn pick_picture(pictures: &[Picture]) -> Option<&Picture> {
    for picture in pictures {
        if picture.pic_type() == PictureType::CoverFront {
            return Some(picture);
        }
    }
    pictures.first()
}

fn guess_mime(bytes: &[u8]) -> Option<String> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg".to_string())
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png".to_string())
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif".to_string())
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp".to_string())
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp".to_string())
    } else {
        None
    }
}
