//! Storage key layout.
//!
//! Published media lives under `{root}/{diaryId}/{snapId}/`. The cascading
//! delete listeners remove the whole prefix when a snap or diary goes away, so
//! this layout is a contract with them.

use crate::encoding::{THUMBNAIL_FILENAME, VIDEO_FILENAME};
use crate::ids::{DiaryId, SnapId, UploadToken};

/// Prefix under which clients stage raw uploads.
pub const TEMP_UPLOAD_ROOT: &str = "temp";

/// Default prefix for published snap media.
pub const DEFAULT_MEDIA_ROOT: &str = "diary-media";

/// Key of a staged upload: `temp/{token}/{filename}`.
pub fn temp_upload_key(token: &UploadToken, filename: &str) -> String {
    format!("{}/{}/{}", TEMP_UPLOAD_ROOT, token.as_str(), filename)
}

/// Keys of the two published objects for a snap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaKeys {
    pub prefix: String,
    pub video: String,
    pub thumbnail: String,
}

impl MediaKeys {
    pub fn new(root: &str, diary_id: &DiaryId, snap_id: &SnapId) -> Self {
        let root = root.trim_end_matches('/');
        let prefix = format!("{}/{}/{}", root, diary_id.as_str(), snap_id.as_str());
        Self {
            video: format!("{}/{}", prefix, VIDEO_FILENAME),
            thumbnail: format!("{}/{}", prefix, THUMBNAIL_FILENAME),
            prefix,
        }
    }
}
