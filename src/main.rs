use crate::utils::head::{softmax, SoftmaxLayer};
use crate::utils::mat::Matrix;
use crate::utils::nn_trait::Layer;
use crate::utils::relu::relu;
use crate::utils::{cifar, tiny_imagenet};
use anyhow::Result;
use clap::Parser;
use log::{info, LevelFilter};
use std::env;
use std::path::PathBuf;

pub mod utils;

#[derive(Debug, Clone, Parser)]
/// Convert image classification datasets into per-image files and CSV manifests
enum Opts {
    /// Unpack the python CIFAR-10 batches into PNG files
    Cifar {
        /// directory holding data_batch_*, test_batch and batches.meta
        #[clap(long, default_value = "data/cifar-10-batches-py")]
        source_dir: PathBuf,
        /// output directory, receives train/, test/ and the label CSVs
        #[clap(long, default_value = "data/cifar-10")]
        output_dir: PathBuf,
    },
    /// Write label_ids.csv and val_labels.csv for Tiny-ImageNet
    TinyImagenet {
        #[clap(long, default_value = "data/tiny-imagenet-200")]
        root: PathBuf,
    },
    /// Print ReLU and softmax of fixed inputs
    Activations,
    /// Read converted CIFAR-10 images back and check them against the manifests
    VerifyCifar {
        #[clap(long, default_value = "data/cifar-10")]
        output_dir: PathBuf,
    },
    /// Check the Tiny-ImageNet manifests against the dataset tree
    VerifyTinyImagenet {
        #[clap(long, default_value = "data/tiny-imagenet-200")]
        root: PathBuf,
    },
}

fn init_logger() {
    let mut builder = pretty_env_logger::formatted_builder();
    match env::var("RUST_LOG") {
        Ok(filters) => builder.parse_filters(&filters),
        Err(_) => builder.filter_level(LevelFilter::Info),
    };
    builder.init();
}

fn main() -> Result<()> {
    init_logger();

    match Opts::parse() {
        Opts::Cifar {
            source_dir,
            output_dir,
        } => {
            let summary = cifar::convert(&source_dir, &output_dir)?;
            info!(
                "wrote {} images, {} labels and {} class names to {}",
                summary.images,
                summary.labels,
                summary.classes,
                output_dir.display()
            );
        }
        Opts::TinyImagenet { root } => {
            let summary = tiny_imagenet::convert(&root)?;
            info!(
                "wrote {} classes and {} validation labels to {}",
                summary.classes,
                summary.val_images,
                root.display()
            );
        }
        Opts::Activations => activations(),
        Opts::VerifyCifar { output_dir } => {
            let report = cifar::verify(&output_dir)?;
            info!(
                "ok: {} train and {} test images, {} classes",
                report.train, report.test, report.classes
            );
        }
        Opts::VerifyTinyImagenet { root } => {
            let report = tiny_imagenet::verify(&root)?;
            info!(
                "ok: {} classes, {} training images, {} validation images",
                report.classes, report.train_images, report.val_images
            );
        }
    }

    Ok(())
}

fn activations() {
    let x = Matrix::from_rows(&[[-1.0f32, -2.0, 3.0], [4.0, 5.0, -6.0]]);
    // [[0 0 3]
    //  [4 5 0]]
    println!("{}", relu(&x));

    let y = [3.0f32, 1.0, 0.2];
    println!("{:?}", softmax(&y));

    let mut layer = SoftmaxLayer::new();
    println!("{}", layer.forward(Matrix::column(&y)));
}
