// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::PlaylistError;

/// Append a downloaded file to a playlist, one path per line.
///
/// The playlist is created if it does not exist yet.
pub fn append_to_playlist(playlist: &Path, media: &Path) -> Result<(), PlaylistError> {
    let write_err = |e| PlaylistError::WriteFailed {
        path: playlist.to_path_buf(),
        source: e,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(playlist)
        .map_err(write_err)?;

    writeln!(file, "{}", media.display()).map_err(write_err)?;

    tracing::debug!(playlist = %playlist.display(), media = %media.display(), "playlist updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appends_one_line_per_file() {
        let dir = tempdir().unwrap();
        let playlist = dir.path().join("podcasts.m3u");

        append_to_playlist(&playlist, Path::new("/spool/a.mp3")).unwrap();
        append_to_playlist(&playlist, Path::new("/spool/b.mp3")).unwrap();

        assert_eq!(
            std::fs::read_to_string(&playlist).unwrap(),
            "/spool/a.mp3\n/spool/b.mp3\n"
        );
    }

    #[test]
    fn unwritable_playlist_is_reported() {
        let dir = tempdir().unwrap();
        let playlist = dir.path().join("missing").join("podcasts.m3u");

        let result = append_to_playlist(&playlist, Path::new("/spool/a.mp3"));

        assert!(matches!(result, Err(PlaylistError::WriteFailed { .. })));
    }
}
