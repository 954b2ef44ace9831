//! The CIFAR-10 dataset.
//!
//! The python version of the batches is unpacked from
//! <https://www.cs.toronto.edu/~kriz/cifar.html> into one PNG per record,
//! plus the `labels_img.csv` and `labels_name.csv` manifests.
use crate::utils::error::{Error, Result};
use crate::utils::misc::{
    csv_reader, csv_writer, load_rgb_images, progress_bar, sorted_entries,
};
use crate::utils::nn_trait::DataSet;
use crate::utils::pickle::{self, NdArray, Object};
use anyhow::Context;
use image::{ImageFormat, RgbImage};
use indexmap::IndexMap;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

pub const W: usize = 32;
pub const H: usize = 32;
pub const C: usize = 3;
const PLANE: usize = W * H;
pub const BYTES_PER_IMAGE: usize = PLANE * C;

pub const LABELS_IMG: &str = "labels_img.csv";
pub const LABELS_NAME: &str = "labels_name.csv";
const TEST_BATCH: &str = "test_batch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }

    fn of_batch(path: &Path) -> Self {
        match path.file_name().and_then(|name| name.to_str()) {
            Some(TEST_BATCH) => Split::Test,
            _ => Split::Train,
        }
    }
}

/// One unpickled `data_batch_*` / `test_batch` file.
#[derive(Debug)]
pub struct CifarBatch {
    pub images: NdArray,
    pub filenames: Vec<String>,
    pub labels: Vec<i64>,
}

impl CifarBatch {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_object(pickle::load(path)?)
    }

    pub fn from_object(mut obj: Object) -> Result<Self> {
        let images = NdArray::try_from(obj.take("data")?)?;
        let filenames = Vec::<String>::try_from(obj.take("filenames")?)?;
        let labels = Vec::<i64>::try_from(obj.take("labels")?)?;

        if images.shape.get(1) != Some(&BYTES_PER_IMAGE) {
            return Err(Error::ShapeMismatch {
                buffer_size: images.data.len(),
                shape: images.shape.clone(),
            });
        }
        if images.rows() != filenames.len() || filenames.len() != labels.len() {
            return Err(Error::LengthMismatch {
                data: images.rows(),
                filenames: filenames.len(),
                labels: labels.len(),
            });
        }
        Ok(Self {
            images,
            filenames,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `(pixels, filename, label)` triples in batch order.
    pub fn records(&self) -> Result<impl Iterator<Item = (&[u8], &str, i64)> + '_> {
        let rows = self.images.u8_rows()?;
        Ok(rows
            .zip(self.filenames.iter())
            .zip(self.labels.iter())
            .map(|((row, name), &label)| (row, name.as_str(), label)))
    }
}

/// Class names from `batches.meta`.
pub fn load_label_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let mut obj = pickle::load(path)?;
    Vec::<String>::try_from(obj.take("label_names")?)
}

/// Interleaves the R, G and B planes of a flat record into a 32x32 image.
pub fn planes_to_image(flat: &[u8]) -> Result<RgbImage> {
    if flat.len() != BYTES_PER_IMAGE {
        return Err(Error::ShapeMismatch {
            buffer_size: flat.len(),
            shape: vec![C, H, W],
        });
    }
    let (r, rest) = flat.split_at(PLANE);
    let (g, b) = rest.split_at(PLANE);
    let buf: Vec<u8> = (0..PLANE).flat_map(|i| [r[i], g[i], b[i]]).collect();
    RgbImage::from_raw(W as u32, H as u32, buf).ok_or_else(|| Error::ShapeMismatch {
        buffer_size: flat.len(),
        shape: vec![H, W, C],
    })
}

fn check_file_name(name: &str) -> Result<()> {
    match Path::new(name).file_name() {
        Some(base) if base == name => Ok(()),
        _ => Err(Error::InvalidFileName(name.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertSummary {
    pub images: usize,
    pub labels: usize,
    pub classes: usize,
}

/// Unpacks every batch under `source_dir` into `output_dir`.
pub fn convert(source_dir: &Path, output_dir: &Path) -> anyhow::Result<ConvertSummary> {
    for split in [Split::Train, Split::Test] {
        let dir = output_dir.join(split.dir_name());
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create directory '{}'", dir.display()))?;
    }

    let mut labels: IndexMap<String, i64> = IndexMap::new();
    let mut label_names: Vec<String> = Vec::new();
    let mut images = 0;

    let files = sorted_entries(source_dir, false)
        .with_context(|| format!("failed to list '{}'", source_dir.display()))?;
    for file in files {
        match file.extension().and_then(|ext| ext.to_str()) {
            Some("html") => {
                debug!("skip {}", file.display());
            }
            Some("meta") => {
                label_names = load_label_names(&file)
                    .with_context(|| format!("failed to read meta file '{}'", file.display()))?;
            }
            _ => {
                let batch = CifarBatch::load(&file)
                    .with_context(|| format!("failed to read batch '{}'", file.display()))?;
                info!("Write image for {}", file.display());
                let dir = output_dir.join(Split::of_batch(&file).dir_name());
                let pb = progress_bar(batch.len() as u64, "write");
                for (flat, fname, label) in batch.records()? {
                    check_file_name(fname)?;
                    let path = dir.join(fname);
                    planes_to_image(flat)?
                        .save_with_format(&path, ImageFormat::Png)
                        .with_context(|| format!("failed to write '{}'", path.display()))?;
                    labels.insert(fname.to_string(), label);
                    images += 1;
                    pb.inc(1);
                }
                pb.finish_and_clear();
            }
        }
    }

    let path = output_dir.join(LABELS_IMG);
    let mut writer = csv_writer(&path)?;
    for (fname, label) in labels.iter() {
        writer.write_record(&[fname.as_str(), label.to_string().as_str()])?;
    }
    writer.flush()?;

    let path = output_dir.join(LABELS_NAME);
    let mut writer = csv_writer(&path)?;
    for (idx, name) in label_names.iter().enumerate() {
        writer.write_record(&[idx.to_string().as_str(), name.as_str()])?;
    }
    writer.flush()?;

    Ok(ConvertSummary {
        images,
        labels: labels.len(),
        classes: label_names.len(),
    })
}

fn parse_field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    idx: usize,
    path: &Path,
) -> Result<T> {
    let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
    let field = record.get(idx).ok_or_else(|| Error::MalformedRow {
        path: path.to_owned(),
        line,
        msg: format!("missing column {idx}"),
    })?;
    field.trim().parse().map_err(|_| Error::MalformedRow {
        path: path.to_owned(),
        line,
        msg: format!("cannot parse '{field}'"),
    })
}

/// Reads `labels_img.csv` back into a filename to label map. Every filename
/// must appear exactly once.
pub fn read_image_labels<P: AsRef<Path>>(path: P) -> Result<IndexMap<String, i64>> {
    let path = path.as_ref();
    let mut rows: IndexMap<String, (i64, usize)> = IndexMap::new();
    for record in csv_reader(path, b',')?.records() {
        let record = record?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        let name: String = parse_field(&record, 0, path)?;
        let label: i64 = parse_field(&record, 1, path)?;
        rows.entry(name).or_insert((label, 0)).1 += 1;
    }
    if let Some((name, &(_, count))) = rows.iter().find(|(_, (_, count))| *count > 1) {
        return Err(Error::RepeatedRow {
            path: path.to_owned(),
            name: name.clone(),
            count,
        });
    }
    Ok(rows
        .into_iter()
        .map(|(name, (label, _))| (name, label))
        .collect())
}

/// Reads `labels_name.csv`, which must list indices 0..N-1 in order.
pub fn read_label_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut names = Vec::new();
    for record in csv_reader(path, b',')?.records() {
        let record = record?;
        let idx: usize = parse_field(&record, 0, path)?;
        if idx != names.len() {
            return Err(Error::Verify(format!(
                "{}: expected class index {}, got {idx}",
                path.display(),
                names.len()
            )));
        }
        names.push(parse_field(&record, 1, path)?);
    }
    Ok(names)
}

/// Converted CIFAR images of one split, normalised to `[0, 1]`.
pub struct CifarImages {
    image: Vec<f32>,
    gt: Vec<u8>,
    names: Vec<String>,
}

impl CifarImages {
    pub fn load(split_dir: &Path, labels: &IndexMap<String, i64>) -> Result<Self> {
        let files = sorted_entries(split_dir, false)?;
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap_or_default().to_string_lossy().to_string())
            .collect();

        let mut gt = Vec::with_capacity(names.len());
        for name in names.iter() {
            let label = labels
                .get(name)
                .ok_or_else(|| Error::MissingLabel(name.clone()))?;
            let label = u8::try_from(*label)
                .map_err(|_| Error::Verify(format!("label {label} of '{name}' is out of range")))?;
            gt.push(label);
        }

        let image = load_rgb_images(&files, W as u32, H as u32, true)?;

        Ok(Self {
            image,
            gt,
            names,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl DataSet for CifarImages {
    fn dim(&self) -> usize {
        BYTES_PER_IMAGE
    }

    fn len(&self) -> usize {
        self.gt.len()
    }

    fn is_empty(&self) -> bool {
        self.gt.is_empty()
    }

    fn fetch_item(&self, idx: usize) -> (&[f32], u8) {
        if idx >= self.len() {
            panic!("fetch item with incorrect idx");
        }
        let dim = self.dim();
        (&self.image[idx * dim..(idx + 1) * dim], self.gt[idx])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CifarReport {
    pub train: usize,
    pub test: usize,
    pub classes: usize,
}

/// Reads a converted tree back and checks it against its manifests.
pub fn verify(output_dir: &Path) -> anyhow::Result<CifarReport> {
    let labels_path: PathBuf = output_dir.join(LABELS_IMG);
    let labels = read_image_labels(&labels_path)
        .with_context(|| format!("failed to read '{}'", labels_path.display()))?;
    let names_path = output_dir.join(LABELS_NAME);
    let classes = read_label_names(&names_path)
        .with_context(|| format!("failed to read '{}'", names_path.display()))?
        .len();

    if classes > 0 {
        if let Some((name, label)) = labels
            .iter()
            .find(|(_, &label)| label < 0 || label as usize >= classes)
        {
            anyhow::bail!("label {label} of '{name}' is outside 0..{classes}");
        }
    }

    let mut counts = [0usize; 2];
    for (count, split) in counts.iter_mut().zip([Split::Train, Split::Test]) {
        let dir = output_dir.join(split.dir_name());
        let images = CifarImages::load(&dir, &labels)
            .with_context(|| format!("failed to load images from '{}'", dir.display()))?;
        info!("{}: {} images", dir.display(), images.len());
        *count = images.len();
    }

    let [train, test] = counts;
    if train + test != labels.len() {
        anyhow::bail!(
            "{} images on disk but {} rows in {}",
            train + test,
            labels.len(),
            LABELS_IMG
        );
    }
    Ok(CifarReport {
        train,
        test,
        classes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::misc::scratch_dir;
    use crate::utils::pickle::test_utils::PickleWriter;

    fn record(seed: u8) -> Vec<u8> {
        (0..BYTES_PER_IMAGE)
            .map(|i| seed.wrapping_add((i % 251) as u8))
            .collect()
    }

    fn batch_pickle(records: &[Vec<u8>], names: &[&str], labels: &[i32]) -> Vec<u8> {
        let data = records.concat();
        let mut w = PickleWriter::new();
        w.op(b'}').put(0).op(b'(');
        w.py2_str(b"batch_label").py2_str(b"training batch 1 of 5");
        w.py2_str(b"labels").op(b']').put(1).op(b'(');
        for &label in labels {
            w.int(label);
        }
        w.op(b'e');
        w.py2_str(b"data")
            .u8_array(records.len(), BYTES_PER_IMAGE, &data);
        w.py2_str(b"filenames").op(b']').op(b'(');
        for name in names {
            w.py2_str(name.as_bytes());
        }
        w.op(b'e');
        w.op(b'u');
        w.finish()
    }

    fn meta_pickle(names: &[&str]) -> Vec<u8> {
        let mut w = PickleWriter::new();
        w.op(b'}').op(b'(');
        w.py2_str(b"num_cases_per_batch").int(10000);
        w.py2_str(b"label_names").op(b']').op(b'(');
        for name in names {
            w.py2_str(name.as_bytes());
        }
        w.op(b'e');
        w.py2_str(b"num_vis").int(3072);
        w.op(b'u');
        w.finish()
    }

    fn fake_source(dir: &Path) -> Vec<Vec<u8>> {
        let records: Vec<Vec<u8>> = (0..5).map(|i| record(i * 40)).collect();
        fs::write(
            dir.join("data_batch_1"),
            batch_pickle(&records[..3], &["a.png", "b.png", "c.png"], &[0, 1, 2]),
        )
        .unwrap();
        fs::write(
            dir.join(TEST_BATCH),
            batch_pickle(&records[3..], &["d.png", "e.png"], &[2, 0]),
        )
        .unwrap();
        fs::write(
            dir.join("batches.meta"),
            meta_pickle(&["airplane", "automobile", "bird"]),
        )
        .unwrap();
        fs::write(dir.join("readme.html"), b"<html></html>").unwrap();
        records
    }

    #[test]
    fn planes_are_interleaved() {
        let mut flat = vec![0u8; BYTES_PER_IMAGE];
        flat[1] = 10;
        flat[PLANE + 1] = 20;
        flat[2 * PLANE + 1] = 30;
        flat[PLANE + W] = 7;
        let img = planes_to_image(&flat).unwrap();
        assert_eq!(img.dimensions(), (32, 32));
        assert_eq!(img.get_pixel(1, 0).0, [10, 20, 30]);
        assert_eq!(img.get_pixel(0, 1).0, [0, 7, 0]);
        assert!(planes_to_image(&flat[1..]).is_err());
    }

    #[test]
    fn batch_decoding() {
        let records = vec![record(0), record(1)];
        let bytes = batch_pickle(&records, &["x.png", "y.png"], &[4, 9]);
        let obj = pickle::read_pickle(&mut &bytes[..]).unwrap();
        let batch = CifarBatch::from_object(obj).unwrap();
        assert_eq!(batch.len(), 2);
        let collected: Vec<_> = batch.records().unwrap().collect();
        assert_eq!(collected[1].0, records[1].as_slice());
        assert_eq!(collected[1].1, "y.png");
        assert_eq!(collected[1].2, 9);
    }

    #[test]
    fn batch_length_mismatch() {
        let records = vec![record(0), record(1)];
        let bytes = batch_pickle(&records, &["x.png"], &[4, 9]);
        let obj = pickle::read_pickle(&mut &bytes[..]).unwrap();
        assert!(matches!(
            CifarBatch::from_object(obj),
            Err(Error::LengthMismatch {
                data: 2,
                filenames: 1,
                labels: 2
            })
        ));
    }

    #[test]
    fn convert_then_verify() {
        let source = scratch_dir("cifar-src");
        let output = scratch_dir("cifar-out");
        let records = fake_source(&source);

        let summary = convert(&source, &output).unwrap();
        assert_eq!(
            summary,
            ConvertSummary {
                images: 5,
                labels: 5,
                classes: 3
            }
        );

        let img = image::open(output.join("train/b.png")).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (32, 32));
        let expected = planes_to_image(&records[1]).unwrap();
        assert_eq!(img.as_raw(), expected.as_raw());
        assert!(output.join("test/d.png").is_file());
        assert!(!output.join("train/d.png").exists());

        // batches are visited in name order: data_batch_1 before test_batch
        assert_eq!(
            fs::read_to_string(output.join(LABELS_IMG)).unwrap(),
            "a.png,0\nb.png,1\nc.png,2\nd.png,2\ne.png,0\n"
        );
        assert_eq!(
            fs::read_to_string(output.join(LABELS_NAME)).unwrap(),
            "0,airplane\n1,automobile\n2,bird\n"
        );

        let report = verify(&output).unwrap();
        assert_eq!(
            report,
            CifarReport {
                train: 3,
                test: 2,
                classes: 3
            }
        );

        let labels = read_image_labels(output.join(LABELS_IMG)).unwrap();
        let train = CifarImages::load(&output.join("train"), &labels).unwrap();
        assert_eq!(train.len(), 3);
        assert_eq!(train.names(), &["a.png", "b.png", "c.png"]);
        let (pixels, label) = train.fetch_item(2);
        assert_eq!(label, 2);
        assert_eq!(pixels.len(), 3072);
        assert!(pixels.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn repeated_filename_keeps_first_position() {
        let source = scratch_dir("cifar-dup-src");
        let output = scratch_dir("cifar-dup-out");
        let records: Vec<Vec<u8>> = (0..3).map(record).collect();
        fs::write(
            source.join("data_batch_1"),
            batch_pickle(&records, &["a.png", "b.png", "a.png"], &[1, 2, 3]),
        )
        .unwrap();

        let summary = convert(&source, &output).unwrap();
        assert_eq!(summary.images, 3);
        assert_eq!(summary.labels, 2);
        assert_eq!(summary.classes, 0);
        assert_eq!(
            fs::read_to_string(output.join(LABELS_IMG)).unwrap(),
            "a.png,3\nb.png,2\n"
        );
        assert_eq!(fs::read_to_string(output.join(LABELS_NAME)).unwrap(), "");
    }

    #[test]
    fn verify_detects_missing_label() {
        let source = scratch_dir("cifar-missing-src");
        let output = scratch_dir("cifar-missing-out");
        fake_source(&source);
        convert(&source, &output).unwrap();

        fs::write(
            output.join(LABELS_IMG),
            "a.png,0\nb.png,1\nd.png,2\ne.png,0\n",
        )
        .unwrap();
        let err = verify(&output).unwrap_err();
        assert!(
            err.chain()
                .any(|e| matches!(e.downcast_ref::<Error>(), Some(Error::MissingLabel(name)) if name == "c.png")),
            "{err:?}"
        );
    }

    #[test]
    fn verify_detects_stray_label_row() {
        let source = scratch_dir("cifar-stray-src");
        let output = scratch_dir("cifar-stray-out");
        fake_source(&source);
        convert(&source, &output).unwrap();
        fs::remove_file(output.join("test/e.png")).unwrap();
        assert!(verify(&output).is_err());
    }

    #[test]
    fn rejects_path_like_filenames() {
        let source = scratch_dir("cifar-path-src");
        let output = scratch_dir("cifar-path-out");
        fs::write(
            source.join("data_batch_1"),
            batch_pickle(&[record(0)], &["../escape.png"], &[0]),
        )
        .unwrap();
        let err = convert(&source, &output).unwrap_err();
        assert!(
            err.chain().any(|e| matches!(
                e.downcast_ref::<Error>(),
                Some(Error::InvalidFileName(name)) if name == "../escape.png"
            )),
            "{err:?}"
        );
    }

    #[test]
    fn verify_detects_repeated_label_row() {
        let source = scratch_dir("cifar-repeat-src");
        let output = scratch_dir("cifar-repeat-out");
        fs::write(
            source.join("data_batch_1"),
            batch_pickle(&[record(0), record(1)], &["a.png", "b.png"], &[0, 1]),
        )
        .unwrap();
        convert(&source, &output).unwrap();
        assert!(verify(&output).is_ok());

        fs::write(output.join(LABELS_IMG), "a.png,0\nb.png,1\na.png,0\n").unwrap();
        let err = verify(&output).unwrap_err();
        assert!(
            err.chain().any(|e| matches!(
                e.downcast_ref::<Error>(),
                Some(Error::RepeatedRow { name, count: 2, .. }) if name == "a.png"
            )),
            "{err:?}"
        );
        assert!(format!("{err:#}").contains("'a.png' appears 2 times in"));
    }
}
