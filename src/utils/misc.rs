use crate::utils::error::{Error, Result};
use image::ColorType;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

pub fn progress_bar(len: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise} / {eta}] [{wide_bar}] {pos}/{len}")
            .progress_chars("=> "),
    );
    pb.set_prefix(prefix.to_string());
    pb
}

/// Header-less CSV writer, the layout of every manifest this tool writes.
pub fn csv_writer<P: AsRef<Path>>(path: P) -> Result<csv::Writer<fs::File>> {
    let writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    Ok(writer)
}

pub fn csv_reader<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<csv::Reader<fs::File>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)?;
    Ok(reader)
}

/// Regular files or directories directly under `dir`, sorted by name.
pub fn sorted_entries(dir: &Path, want_dirs: bool) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if (want_dirs && file_type.is_dir()) || (!want_dirs && file_type.is_file()) {
            entries.push(entry.path());
        }
    }
    entries.sort();
    Ok(entries)
}

/// Decodes `files` in parallel into one buffer of `w x h x 3` pixels in `[0, 1]`.
///
/// With `strict` set, anything but an 8-bit RGB image is rejected instead of
/// being converted.
pub fn load_rgb_images(files: &[PathBuf], w: u32, h: u32, strict: bool) -> Result<Vec<f32>> {
    let decoded: Vec<Vec<f32>> = files
        .par_iter()
        .map(|path| -> Result<Vec<f32>> {
            let img = image::io::Reader::open(path)?
                .with_guessed_format()?
                .decode()?;
            if strict && img.color() != ColorType::Rgb8 {
                return Err(Error::Verify(format!(
                    "{}: expected an 8-bit RGB image, got {:?}",
                    path.display(),
                    img.color()
                )));
            }
            let img = img.to_rgb8();
            if img.dimensions() != (w, h) {
                return Err(Error::Verify(format!(
                    "{}: expected {w}x{h}, got {:?}",
                    path.display(),
                    img.dimensions()
                )));
            }
            Ok(img.as_raw().iter().map(|&v| v as f32 / 255.0).collect())
        })
        .collect::<Result<_>>()?;
    Ok(decoded.concat())
}

/// Temporary directory removed on drop.
#[cfg(test)]
pub(crate) struct ScratchDir(PathBuf);

#[cfg(test)]
impl std::ops::Deref for ScratchDir {
    type Target = Path;
    fn deref(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
impl AsRef<Path> for ScratchDir {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

#[cfg(test)]
pub(crate) fn scratch_dir(name: &str) -> ScratchDir {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    let dir = std::env::temp_dir().join(format!(
        "dataset-convert-{}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst),
        name
    ));
    if dir.exists() {
        fs::remove_dir_all(&dir).unwrap();
    }
    fs::create_dir_all(&dir).unwrap();
    ScratchDir(dir)
}
