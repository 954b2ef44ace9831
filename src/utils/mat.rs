use std::fmt::Formatter;

/// Dense row-major `f32` matrix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    data: Vec<f32>,
    row: usize,
    col: usize,
}

impl Matrix {
    pub fn null() -> Self {
        Self::default()
    }

    pub fn new(n: usize, m: usize) -> Self {
        Matrix {
            data: vec![0.0; n * m],
            row: n,
            col: m,
        }
    }

    /// # Panics
    /// If the rows are ragged.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Self {
        let col = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * col);
        for r in rows {
            let r = r.as_ref();
            assert_eq!(r.len(), col, "matrix rows must have the same length");
            data.extend_from_slice(r);
        }
        Matrix {
            data,
            row: rows.len(),
            col,
        }
    }

    /// Column vector `n x 1`.
    pub fn column(values: &[f32]) -> Self {
        Matrix {
            data: values.to_vec(),
            row: values.len(),
            col: 1,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    pub fn at(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.col + j]
    }

    pub fn set(&mut self, i: usize, j: usize, val: f32) {
        self.data[i * self.col + j] = val;
    }

    pub fn row(&self, i: usize) -> &[f32] {
        if i >= self.row {
            panic!("matrix visit row over bound");
        }
        &self.data[i * self.col..(i + 1) * self.col]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        if i >= self.row {
            panic!("matrix visit row over bound");
        }
        &mut self.data[i * self.col..(i + 1) * self.col]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn fill_(&mut self, val: f32) {
        self.data.iter_mut().for_each(|x| *x = val);
    }

    /// Element-wise map into a new matrix of the same shape.
    pub fn map<F: Fn(f32) -> f32>(&self, f: F) -> Matrix {
        Matrix {
            data: self.data.iter().map(|&x| f(x)).collect(),
            row: self.row,
            col: self.col,
        }
    }

    pub fn is_close(&self, rhs: &Matrix, eps: f32) -> bool {
        self.shape() == rhs.shape()
            && self
                .data
                .iter()
                .zip(rhs.data.iter())
                .all(|(a, b)| (a - b).abs() <= eps)
    }
}

impl std::fmt::Display for Matrix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Matrix Sized [{}, {}]\n", self.row, self.col))?;
        for i in 0..self.row {
            for j in 0..self.col {
                f.write_fmt(format_args!("{}", self.at(i, j)))?;
                if j + 1 == self.col {
                    f.write_str("\n")?;
                } else {
                    f.write_str(" ")?;
                }
            }
        }
        Ok(())
    }
}
