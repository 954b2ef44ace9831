use crate::utils::mat::Matrix;
use crate::utils::nn_trait;

/// Softmax of a vector, shifted by its max so large inputs do not overflow.
pub fn softmax(x: &[f32]) -> Vec<f32> {
    let max_val = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = x.iter().map(|&v| (v - max_val).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|v| v / sum).collect()
}

/// Softmax over each column (numpy `axis=0`).
#[derive(Debug, Default)]
pub struct SoftmaxLayer {
    last_output: Matrix,
}

impl SoftmaxLayer {
    pub fn new() -> Self {
        Self {
            last_output: Matrix::null(),
        }
    }
}

impl nn_trait::Layer for SoftmaxLayer {
    fn forward(&mut self, input: Matrix) -> Matrix {
        let (h, w) = input.shape();
        let mut output = Matrix::new(h, w);
        for j in 0..w {
            let column: Vec<f32> = (0..h).map(|i| input.at(i, j)).collect();
            for (i, v) in softmax(&column).into_iter().enumerate() {
                output.set(i, j, v);
            }
        }
        self.last_output = output.clone();
        output
    }

    // dx = s * (g - <g, s>) per column
    fn backward(&mut self, d_loss: Matrix) -> Matrix {
        let (h, w) = d_loss.shape();
        assert_eq!(
            (h, w),
            self.last_output.shape(),
            "backward called with a gradient of the wrong shape"
        );
        let s = &self.last_output;
        let mut grad = Matrix::new(h, w);
        for j in 0..w {
            let dot: f32 = (0..h).map(|i| d_loss.at(i, j) * s.at(i, j)).sum();
            for i in 0..h {
                grad.set(i, j, s.at(i, j) * (d_loss.at(i, j) - dot));
            }
        }
        grad
    }
}
