pub mod cifar;
pub mod error;
pub mod pickle;
pub mod tiny_imagenet;

pub mod head;
pub mod mat;
pub mod nn_trait;
pub mod relu;

pub mod misc;
