use crate::utils::mat::Matrix;
use crate::utils::nn_trait;

/// Element-wise `max(x, 0)`.
pub fn relu(input: &Matrix) -> Matrix {
    input.map(|x| if x > 0.0 { x } else { 0.0 })
}

#[derive(Debug, Default)]
pub struct ReluLayer {
    last_input: Matrix,
}

impl ReluLayer {
    pub fn new() -> Self {
        Self {
            last_input: Matrix::null(),
        }
    }
}

impl nn_trait::Layer for ReluLayer {
    fn forward(&mut self, input: Matrix) -> Matrix {
        let output = relu(&input);
        self.last_input = input;
        output
    }

    fn backward(&mut self, mut d_loss: Matrix) -> Matrix {
        assert_eq!(
            d_loss.shape(),
            self.last_input.shape(),
            "backward called with a gradient of the wrong shape"
        );
        let (h, _) = d_loss.shape();
        for idx in 0..h {
            let src = self.last_input.row(idx);
            let dst = d_loss.row_mut(idx);
            dst.iter_mut()
                .zip(src.iter())
                .filter(|(_, x)| **x <= 0.0)
                .for_each(|(g, _)| *g = 0.0);
        }
        d_loss
    }
}
