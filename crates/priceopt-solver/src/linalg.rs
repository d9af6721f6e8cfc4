/// Dense square matrix stored row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.n + j] = value;
    }

    pub fn add(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.n + j] += value;
    }

    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Adds `scale * u * u^T`
    pub fn add_outer(&mut self, u: &[f64], scale: f64) {
        for i in 0..self.n {
            if u[i] == 0.0 {
                continue;
            }
            let ui = scale * u[i];
            for j in 0..self.n {
                self.data[i * self.n + j] += ui * u[j];
            }
        }
    }

    pub fn max_abs_diagonal(&self) -> f64 {
        (0..self.n).map(|i| self.get(i, i).abs()).fold(0.0, f64::max)
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Cholesky factorization of `self + shift * I`.
    ///
    /// Returns `None` when the shifted matrix is not positive definite.
    pub fn cholesky(&self, shift: f64) -> Option<Cholesky> {
        let n = self.n;
        let mut l = vec![0.0; n * n];
        for j in 0..n {
            let mut diag = self.get(j, j) + shift;
            for k in 0..j {
                diag -= l[j * n + k] * l[j * n + k];
            }
            if !(diag > 0.0) || !diag.is_finite() {
                return None;
            }
            let ljj = diag.sqrt();
            l[j * n + j] = ljj;
            for i in (j + 1)..n {
                let mut v = self.get(i, j);
                for k in 0..j {
                    v -= l[i * n + k] * l[j * n + k];
                }
                l[i * n + j] = v / ljj;
            }
        }
        Some(Cholesky { n, l })
    }
}

/// Lower-triangular factor `L` with `A = L L^T`
#[derive(Debug, Clone)]
pub struct Cholesky {
    n: usize,
    l: Vec<f64>,
}

impl Cholesky {
    pub fn solve(&self, rhs: &[f64]) -> Vec<f64> {
        let n = self.n;
        let mut y = rhs.to_vec();
        for i in 0..n {
            for k in 0..i {
                y[i] -= self.l[i * n + k] * y[k];
            }
            y[i] /= self.l[i * n + i];
        }
        for i in (0..n).rev() {
            for k in (i + 1)..n {
                y[i] -= self.l[k * n + i] * y[k];
            }
            y[i] /= self.l[i * n + i];
        }
        y
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm_inf(a: &[f64]) -> f64 {
    a.iter().fold(0.0, |m, v| m.max(v.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cholesky_solve() {
        // [4 2; 2 3] x = [2; 1] -> x = [0.5, 0]
        let mut a = Matrix::zeros(2);
        a.set(0, 0, 4.0);
        a.set(0, 1, 2.0);
        a.set(1, 0, 2.0);
        a.set(1, 1, 3.0);

        let x = a.cholesky(0.0).expect("positive definite").solve(&[2.0, 1.0]);
        assert_relative_eq!(x[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(x[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cholesky_rejects_indefinite_until_shifted() {
        let mut a = Matrix::zeros(2);
        a.set(0, 0, 1.0);
        a.set(1, 1, -2.0);

        assert!(a.cholesky(0.0).is_none());
        assert!(a.cholesky(3.0).is_some());
    }

    #[test]
    fn test_add_outer() {
        let mut a = Matrix::zeros(2);
        a.add_outer(&[1.0, 2.0], 0.5);
        assert_eq!(a.get(0, 0), 0.5);
        assert_eq!(a.get(0, 1), 1.0);
        assert_eq!(a.get(1, 0), 1.0);
        assert_eq!(a.get(1, 1), 2.0);
    }
}
