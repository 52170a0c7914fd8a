//! File classification by MIME type and extension.

use crate::gateway::CandidateFile;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "m4v", "avi", "mov", "wmv", "flv", "webm", "ts", "m2ts", "mts", "mpg", "mpeg",
    "vob", "iso", "3gp", "ogv", "divx", "rmvb",
];

const DOCUMENT_EXTENSIONS: &[&str] = &[
    "nfo", "txt", "pdf", "doc", "docx", "md", "rtf", "log", "html", "htm", "url", "sfv", "md5",
    "exe",
];

const ARCHIVE_EXTENSIONS: &[&str] = &["rar", "zip", "7z", "tar", "gz", "bz2", "xz", "par2"];

const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "sub", "idx", "vtt", "sup", "smi"];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff"];

/// Coarse kind of a file inside a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Video,
    Document,
    Archive,
    Subtitle,
    Image,
    /// Nothing conclusive; kept as a candidate.
    Other,
}

impl FileKind {
    /// Kinds that can never be the requested stream.
    pub fn is_excluded(&self) -> bool {
        matches!(
            self,
            FileKind::Document | FileKind::Archive | FileKind::Subtitle | FileKind::Image
        )
    }
}

fn extension(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (_, ext) = base.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

fn kind_from_mime(mime: &str) -> Option<FileKind> {
    let mime = mime.to_ascii_lowercase();
    let kind = match mime.as_str() {
        "application/x-subrip" | "text/vtt" | "text/x-ssa" => FileKind::Subtitle,
        "application/zip" | "application/x-rar-compressed" | "application/vnd.rar"
        | "application/x-7z-compressed" | "application/gzip" => FileKind::Archive,
        "application/pdf" => FileKind::Document,
        m if m.starts_with("video/") => FileKind::Video,
        m if m.starts_with("image/") => FileKind::Image,
        m if m.starts_with("text/") => FileKind::Document,
        _ => return None,
    };
    Some(kind)
}

fn kind_from_extension(ext: &str) -> FileKind {
    let is_split_archive = (ext.len() == 3 && ext.starts_with('r') && ext[1..].bytes().all(|b| b.is_ascii_digit()))
        || (!ext.is_empty() && ext.bytes().all(|b| b.is_ascii_digit()));

    if VIDEO_EXTENSIONS.contains(&ext) {
        FileKind::Video
    } else if SUBTITLE_EXTENSIONS.contains(&ext) {
        FileKind::Subtitle
    } else if ARCHIVE_EXTENSIONS.contains(&ext) || is_split_archive {
        FileKind::Archive
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        FileKind::Image
    } else if DOCUMENT_EXTENSIONS.contains(&ext) {
        FileKind::Document
    } else {
        FileKind::Other
    }
}

/// Classify a file. A recognised MIME type takes precedence over the extension.
pub fn classify(file: &CandidateFile) -> FileKind {
    if let Some(kind) = file.mime_type.as_deref().and_then(kind_from_mime) {
        return kind;
    }
    extension(&file.name)
        .map(|ext| kind_from_extension(&ext))
        .unwrap_or(FileKind::Other)
}

pub fn is_video(file: &CandidateFile) -> bool {
    classify(file) == FileKind::Video
}
