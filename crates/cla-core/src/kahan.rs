//! Kahan (compensated) summation.

/// Running sum with a compensation term for lost low-order bits.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KahanSum {
    sum: f64,
    correction: f64,
}

impl KahanSum {
    /// Creates an empty sum.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sum: 0.0,
            correction: 0.0,
        }
    }

    /// Adds one value.
    #[inline]
    pub fn add(&mut self, value: f64) {
        // Infinities and NaN would poison the correction term.
        if !value.is_finite() || !self.sum.is_finite() {
            self.sum += value;
            return;
        }
        let y = value - self.correction;
        let t = self.sum + y;
        self.correction = (t - self.sum) - y;
        self.sum = t;
    }

    /// Folds another partial sum into this one.
    pub fn merge(&mut self, other: &Self) {
        self.add(other.sum);
        self.add(-other.correction);
    }

    /// Current corrected value.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kahan_beats_naive_summation() {
        // Arrange
        let mut kahan = KahanSum::new();
        let mut naive = 0.0_f64;

        // Act
        kahan.add(1.0);
        naive += 1.0;
        for _ in 0..10_000 {
            kahan.add(1e-16);
            naive += 1e-16;
        }

        // Assert
        let expected = 1.0 + 1e-12;
        assert!((kahan.value() - expected).abs() < 1e-15);
        assert!((naive - expected).abs() > (kahan.value() - expected).abs());
    }

    #[test]
    fn test_merge_partial_sums() {
        let mut a = KahanSum::new();
        let mut b = KahanSum::new();
        for i in 0..100 {
            a.add(f64::from(i));
            b.add(f64::from(i) * 2.0);
        }

        a.merge(&b);

        assert!((a.value() - 14_850.0).abs() < 1e-9);
    }

    #[test]
    fn test_infinity_propagates() {
        let mut k = KahanSum::new();
        k.add(1.0);
        k.add(f64::INFINITY);
        k.add(2.0);
        assert!(k.value().is_infinite());
    }
}
