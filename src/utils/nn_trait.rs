use crate::utils::mat::Matrix;

pub trait Layer {
    fn forward(&mut self, input: Matrix) -> Matrix;
    fn backward(&mut self, d_loss: Matrix) -> Matrix;
}

/// A labelled image collection read back from converted output.
pub trait DataSet {
    fn dim(&self) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;
    fn fetch_item(&self, idx: usize) -> (&[f32], u8);
}
