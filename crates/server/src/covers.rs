use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use common::{now_millis, MetadataLite};
use metadata::TagData;
use rand::Rng;

pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// Writes extracted cover art into the public uploads directory.
#[derive(Clone, Debug)]
pub struct CoverWriter {
    dir: PathBuf,
}

impl CoverWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stores `data` under a fresh name and returns its public URL.
    pub fn materialize(&self, data: &[u8], mime: Option<&str>) -> io::Result<String> {
        let ext = mime.and_then(image_ext_from_mime).unwrap_or("jpg");
        let filename = format!("cover-{}-{}.{}", now_millis(), random_suffix(10), ext);
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(&filename), data)?;
        Ok(format!("{}/{}", UPLOADS_URL_PREFIX, filename))
    }

    /// Applies the default-filling rules to `tags` and materializes the cover,
    /// if there is one. `source_name` supplies the fallback title.
    pub fn lite_metadata(&self, source_name: &str, tags: TagData) -> io::Result<MetadataLite> {
        let cover_url = match tags.cover {
            Some(cover) => Some(self.materialize(&cover.data, cover.mime.as_deref())?),
            None => None,
        };
        Ok(MetadataLite::with_defaults(
            source_name,
            tags.title,
            tags.artist,
            tags.album,
            tags.duration_secs,
            cover_url,
        ))
    }
}

pub fn image_ext_from_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    match essence {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/bmp" => Some("bmp"),
        _ => mime_guess::get_mime_extensions_str(essence)
            .and_then(|exts| exts.first().copied()),
    }
}

fn random_suffix(len: usize) -> String {
    const CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CHARS[rng.random_range(0..CHARS.len())] as char)
        .collect()
}
