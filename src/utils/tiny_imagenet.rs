//! The Tiny-ImageNet dataset (200 classes, 64x64 images).
//!
//! Training images live in one directory per class; validation labels are
//! given by `val/val_annotations.txt`. Conversion writes `label_ids.csv`
//! and `val_labels.csv` next to them.
use crate::utils::error::{Error, Result};
use crate::utils::misc::{csv_reader, csv_writer, load_rgb_images, sorted_entries};
use crate::utils::nn_trait::DataSet;
use anyhow::Context;
use indexmap::IndexMap;
use log::info;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const LABEL_IDS: &str = "label_ids.csv";
pub const VAL_LABELS: &str = "val_labels.csv";
const VAL_ANNOTATIONS: &str = "val/val_annotations.txt";
const VAL_IMAGES: &str = "val/images";

pub const W: usize = 64;
pub const H: usize = 64;
pub const C: usize = 3;

/// A row of `val_annotations.txt`; the bounding box is not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub id: String,
    pub class_name: String,
}

/// Class directory name to dense index, in name order.
pub fn scan_classes(train_dir: &Path) -> Result<IndexMap<String, usize>> {
    let dirs = sorted_entries(train_dir, true)?;
    let classes = dirs
        .iter()
        .filter_map(|dir| dir.file_name())
        .enumerate()
        .map(|(idx, name)| (name.to_string_lossy().to_string(), idx))
        .collect();
    Ok(classes)
}

/// Reads the tab-separated `id, class, x0, y0, x1, y1` annotations.
pub fn read_annotations<P: AsRef<Path>>(path: P) -> Result<Vec<Annotation>> {
    let path = path.as_ref();
    let mut annotations = Vec::new();
    for record in csv_reader(path, b'\t')?.records() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        match (record.get(0), record.get(1)) {
            (Some(id), Some(class_name)) => annotations.push(Annotation {
                id: id.trim().to_string(),
                class_name: class_name.trim().to_string(),
            }),
            _ => {
                return Err(Error::MalformedRow {
                    path: path.to_owned(),
                    line: record.position().map(|p| p.line() as usize).unwrap_or(0),
                    msg: "expected at least two tab-separated columns".to_string(),
                })
            }
        }
    }
    Ok(annotations)
}

/// Resolves each annotation's class name to its index.
pub fn resolve_labels(
    annotations: &[Annotation],
    classes: &IndexMap<String, usize>,
) -> Result<Vec<(String, usize)>> {
    annotations
        .iter()
        .map(|a| {
            let label = classes
                .get(&a.class_name)
                .ok_or_else(|| Error::UnknownClass(a.class_name.clone()))?;
            Ok((a.id.clone(), *label))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertSummary {
    pub classes: usize,
    pub val_images: usize,
}

pub fn convert(root: &Path) -> anyhow::Result<ConvertSummary> {
    let train_dir = root.join("train");
    let classes = scan_classes(&train_dir)
        .with_context(|| format!("failed to list '{}'", train_dir.display()))?;
    info!("found {} classes in {}", classes.len(), train_dir.display());

    let annotation_path = root.join(VAL_ANNOTATIONS);
    let annotations = read_annotations(&annotation_path)
        .with_context(|| format!("failed to read '{}'", annotation_path.display()))?;
    let val_labels = resolve_labels(&annotations, &classes)
        .with_context(|| format!("failed to resolve '{}'", annotation_path.display()))?;

    let path = root.join(VAL_LABELS);
    let mut writer = csv_writer(&path)?;
    for (id, label) in val_labels.iter() {
        writer.write_record(&[id.as_str(), label.to_string().as_str()])?;
    }
    writer.flush()?;
    info!("wrote {} validation labels to {}", val_labels.len(), path.display());

    let path = root.join(LABEL_IDS);
    let mut writer = csv_writer(&path)?;
    for (name, label) in classes.iter() {
        writer.write_record(&[name.as_str(), label.to_string().as_str()])?;
    }
    writer.flush()?;

    Ok(ConvertSummary {
        classes: classes.len(),
        val_images: val_labels.len(),
    })
}

fn read_pairs(path: &Path) -> Result<Vec<(String, usize)>> {
    let mut pairs = Vec::new();
    for record in csv_reader(path, b',')?.records() {
        let record = record?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let malformed = |msg: String| Error::MalformedRow {
            path: path.to_owned(),
            line,
            msg,
        };
        let (key, value) = match (record.get(0), record.get(1), record.len()) {
            (Some(key), Some(value), 2) => (key, value),
            _ => return Err(malformed("expected two columns".to_string())),
        };
        let value: usize = value
            .trim()
            .parse()
            .map_err(|_| malformed(format!("cannot parse '{value}'")))?;
        pairs.push((key.to_string(), value));
    }
    Ok(pairs)
}

/// Decoded Tiny-ImageNet images, normalised to `[0, 1]`.
pub struct TinyImageNetImages {
    image: Vec<f32>,
    gt: Vec<u8>,
    names: Vec<String>,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

fn label_u8(label: usize, name: &str) -> Result<u8> {
    u8::try_from(label)
        .map_err(|_| Error::Verify(format!("label {label} of '{name}' is out of range")))
}

impl TinyImageNetImages {
    /// Images under `train/<class>/*/`, labelled by their class directory.
    pub fn load_train(train_dir: &Path, classes: &HashMap<String, usize>) -> Result<Self> {
        let mut files = Vec::new();
        let mut gt = Vec::new();
        for class_dir in sorted_entries(train_dir, true)? {
            let class_name = file_name(&class_dir);
            let label = classes
                .get(&class_name)
                .ok_or_else(|| Error::UnknownClass(class_name.clone()))?;
            let label = label_u8(*label, &class_name)?;
            for sub_dir in sorted_entries(&class_dir, true)? {
                for file in sorted_entries(&sub_dir, false)? {
                    files.push(file);
                    gt.push(label);
                }
            }
        }
        Self::decode(files, gt)
    }

    /// Images under `val/images/`, labelled through `val_labels.csv`.
    pub fn load_val(image_dir: &Path, val_labels: &HashMap<String, usize>) -> Result<Self> {
        let files = sorted_entries(image_dir, false)?;
        let mut gt = Vec::with_capacity(files.len());
        for file in files.iter() {
            let name = file_name(file);
            let label = val_labels
                .get(&name)
                .ok_or_else(|| Error::MissingLabel(name.clone()))?;
            gt.push(label_u8(*label, &name)?);
        }
        Self::decode(files, gt)
    }

    // the dataset holds a few grayscale JPEGs, they are expanded to RGB
    fn decode(files: Vec<PathBuf>, gt: Vec<u8>) -> Result<Self> {
        let image = load_rgb_images(&files, W as u32, H as u32, false)?;
        let names = files.iter().map(|f| file_name(f)).collect();
        Ok(Self { image, gt, names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl DataSet for TinyImageNetImages {
    fn dim(&self) -> usize {
        W * H * C
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
pub struct TinyImageNetReport {
    pub classes: usize,
    pub train_images: usize,
    pub val_images: usize,
}

/// Checks the manifests written by [convert] against the dataset tree and
/// decodes every image through them.
pub fn verify(root: &Path) -> anyhow::Result<TinyImageNetReport> {
    let train_dir = root.join("train");
    let train_classes = scan_classes(&train_dir)
        .with_context(|| format!("failed to list '{}'", train_dir.display()))?;

    let label_ids_path = root.join(LABEL_IDS);
    let label_ids = read_pairs(&label_ids_path)
        .with_context(|| format!("failed to read '{}'", label_ids_path.display()))?;
    if label_ids.len() != train_classes.len() {
        anyhow::bail!(
            "{} has {} rows but {} has {} class directories",
            LABEL_IDS,
            label_ids.len(),
            train_dir.display(),
            train_classes.len()
        );
    }
    let mut seen = vec![false; label_ids.len()];
    let mut class_map = HashMap::new();
    for (name, label) in label_ids {
        if !train_classes.contains_key(&name) {
            anyhow::bail!("class '{name}' in {LABEL_IDS} has no training directory");
        }
        match seen.get_mut(label) {
            Some(slot) if !*slot => *slot = true,
            _ => anyhow::bail!("label index {label} of '{name}' is repeated or out of range"),
        }
        class_map.insert(name, label);
    }

    let annotation_path = root.join(VAL_ANNOTATIONS);
    let annotations = read_annotations(&annotation_path)
        .with_context(|| format!("failed to read '{}'", annotation_path.display()))?;
    let val_labels_path = root.join(VAL_LABELS);
    let val_labels = read_pairs(&val_labels_path)
        .with_context(|| format!("failed to read '{}'", val_labels_path.display()))?;

    let mut written: HashMap<&str, (usize, usize)> = HashMap::new();
    for (id, label) in val_labels.iter() {
        written.entry(id.as_str()).or_insert((*label, 0)).1 += 1;
    }
    for a in annotations.iter() {
        let expected = class_map
            .get(&a.class_name)
            .ok_or_else(|| Error::UnknownClass(a.class_name.clone()))?;
        match written.get(a.id.as_str()) {
            Some(&(label, 1)) if label == *expected => {}
            Some(&(label, 1)) => {
                anyhow::bail!("'{}' has label {label}, expected {expected}", a.id)
            }
            Some(&(_, n)) => anyhow::bail!("'{}' appears {n} times in {VAL_LABELS}", a.id),
            None => anyhow::bail!("'{}' is missing from {VAL_LABELS}", a.id),
        }
    }
    if val_labels.len() != annotations.len() {
        anyhow::bail!(
            "{} has {} rows for {} annotations",
            VAL_LABELS,
            val_labels.len(),
            annotations.len()
        );
    }

    let train = TinyImageNetImages::load_train(&train_dir, &class_map)
        .with_context(|| format!("failed to load images from '{}'", train_dir.display()))?;
    info!("{}: {} images", train_dir.display(), train.len());

    let val_dir = root.join(VAL_IMAGES);
    let val_map: HashMap<String, usize> = val_labels.iter().cloned().collect();
    let val = TinyImageNetImages::load_val(&val_dir, &val_map)
        .with_context(|| format!("failed to load images from '{}'", val_dir.display()))?;
    info!("{}: {} images", val_dir.display(), val.len());
    if val.len() != val_labels.len() {
        anyhow::bail!(
            "{} validation images on disk but {} rows in {}",
            val.len(),
            val_labels.len(),
            VAL_LABELS
        );
    }

    Ok(TinyImageNetReport {
        classes: class_map.len(),
        train_images: train.len(),
        val_images: val.len(),
    })
}
