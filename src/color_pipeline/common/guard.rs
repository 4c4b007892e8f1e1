use std::ops::AddAssign;

/// Counts divisions that hit a zero divisor and were replaced by 0.
///
/// A nonzero flat-field count points at dead pixels; a nonzero white count
/// means the reference patch measured as black.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardStats {
    pub flat_field_zeros: usize,
    pub white_point_zeros: usize,
}

impl GuardStats {
    pub fn total(&self) -> usize {
        self.flat_field_zeros + self.white_point_zeros
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

impl AddAssign for GuardStats {
    fn add_assign(&mut self, rhs: Self) {
        self.flat_field_zeros += rhs.flat_field_zeros;
        self.white_point_zeros += rhs.white_point_zeros;
    }
}
