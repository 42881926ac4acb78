//! Publish each language's media directory at `<media_prefix>/<language>/`.
//!
//! This is the address scheme the cross-referencer writes into row audio mappings, so a served
//! location resolves as long as the file sits directly in the mounted directory.

use std::collections::BTreeMap;
use std::path::PathBuf;

use axum::Router;
use tower_http::services::ServeDir;

use crate::data::crossref::MediaSettings;

pub fn mount_media(
    router: Router,
    media: &MediaSettings,
    roots: &BTreeMap<String, PathBuf>,
) -> Router {
    roots.iter().fold(router, |router, (language, dir)| {
        let mount = media.language_path(language);
        tracing::debug!(%mount, dir = %dir.display(), "serving media");
        router.nest_service(&mount, ServeDir::new(dir))
    })
}
