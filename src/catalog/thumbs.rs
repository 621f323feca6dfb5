//! Thumbnail generation through external tools.
//!
//! Images are resized with ImageMagick's `convert`; videos get one frame
//! extracted with `ffmpeg` at the 1-second mark and their duration (from
//! `ffprobe`) burned into the bottom of the thumbnail.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Capability for producing a thumbnail file.
pub trait Thumbnailer {
    /// Generate a thumbnail for `path`, stored under a name derived from
    /// `fname`. Returns the thumbnail's filename, or `None` when no
    /// thumbnail could be produced — never an error; a missing thumbnail is
    /// an accepted outcome.
    fn generate(&self, path: &Path, fname: &str, mime_type: &str) -> Option<String>;
}

/// `convert`/`ffmpeg`/`ffprobe`-backed thumbnailer.
pub struct ExternalThumbnailer {
    thumbnail_dir: PathBuf,
    size: u32,
}

impl ExternalThumbnailer {
    pub fn new(thumbnail_dir: PathBuf, size: u32) -> Self {
        Self {
            thumbnail_dir,
            size,
        }
    }

    /// Thumbnails are always stored as png, keeping the original filename
    /// visible: `clip.mp4` becomes `clip.mp4.png`.
    fn thumbnail_path(&self, fname: &str) -> PathBuf {
        let mut name = fname.to_string();
        if !name.ends_with(".png") {
            name.push_str(".png");
        }
        self.thumbnail_dir.join(name)
    }

    fn resize(&self, src: &Path, dst: &Path, label: Option<&str>) -> Option<()> {
        let bounds = format!("{}x{}", self.size, self.size);
        let mut cmd = Command::new("convert");
        cmd.arg(src).args(["-resize", &bounds]);
        if let Some(text) = label {
            // dark backing label first, then the white label offset on top,
            // so the text stays legible on any background
            cmd.args(["-font", "helvetica", "-fill", "gray", "-pointsize", "20"])
                .args(["-gravity", "South", "-draw"])
                .arg(format!("text 12,8 '{text}'"));
            cmd.args(["-font", "helvetica", "-fill", "white", "-pointsize", "20"])
                .args(["-gravity", "South", "-draw"])
                .arg(format!("text 10,10 '{text}'"));
        }
        cmd.arg(dst);
        run_tool(cmd)
    }

    /// Extract a single frame at the 1-second mark.
    fn video_frame(&self, path: &Path, dst: &Path) -> Option<()> {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-i")
            .arg(path)
            .args(["-r", "1", "-v", "quiet", "-t", "00:00:01", "-f", "image2"])
            .arg(dst);
        run_tool(cmd)
    }

    /// Duration in seconds, truncated to 2 decimal places.
    fn video_duration(&self, path: &Path) -> Option<String> {
        let output = Command::new("ffprobe")
            .arg("-i")
            .arg(path)
            .args(["-show_entries", "format=duration", "-v", "quiet", "-of", "csv=p=0"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = stdout.split_whitespace().next()?;
        Some(match text.split_once('.') {
            Some((whole, frac)) => format!("{}.{}", whole, &frac[..frac.len().min(2)]),
            None => text.to_string(),
        })
    }
}

impl Thumbnailer for ExternalThumbnailer {
    fn generate(&self, path: &Path, fname: &str, mime_type: &str) -> Option<String> {
        if let Err(err) = std::fs::create_dir_all(&self.thumbnail_dir) {
            warn!(dir = %self.thumbnail_dir.display(), %err, "cannot create thumbnail dir");
            return None;
        }
        let dst = self.thumbnail_path(fname);

        if mime_type.contains("image") {
            self.resize(path, &dst, None)?;
        } else if mime_type.contains("video") {
            let workdir = match tempfile::tempdir() {
                Ok(dir) => dir,
                Err(err) => {
                    warn!(%err, "cannot create scratch dir for frame extraction");
                    return None;
                }
            };
            let frame = workdir.path().join("frame.png");
            self.video_frame(path, &frame)?;
            let duration = self.video_duration(path);
            self.resize(&frame, &dst, duration.as_deref())?;
        } else {
            // no thumbnail for other categories; presentation layers show a
            // generic file-type marker instead
            return None;
        }

        dst.file_name().map(|n| n.to_string_lossy().into_owned())
    }
}

fn run_tool(mut cmd: Command) -> Option<()> {
    debug!(?cmd, "running external tool");
    match cmd.output() {
        Ok(output) if output.status.success() => Some(()),
        Ok(output) => {
            debug!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "external tool failed"
            );
            None
        }
        Err(err) => {
            warn!(%err, "failed to spawn external tool");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_name_always_gets_png_suffix() {
        let thumbs = ExternalThumbnailer::new(PathBuf::from("/thumbs"), 240);
        assert_eq!(
            thumbs.thumbnail_path("clip.mp4"),
            PathBuf::from("/thumbs/clip.mp4.png")
        );
        assert_eq!(
            thumbs.thumbnail_path("photo.png"),
            PathBuf::from("/thumbs/photo.png")
        );
    }
}
