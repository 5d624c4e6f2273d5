use std::cmp;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// An immutable numeric value stored as its raw 64-bit representation.
///
/// `Number` represents either an integral or a floating point value. It
/// needs to be accompanied by a source of [`NumberKind`] that describes the
/// actual type of the value stored within.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Number(u64);

impl Number {
    /// Casts the number to `i64`. May result in data/precision loss.
    pub fn to_i64(&self, number_kind: &NumberKind) -> i64 {
        match number_kind {
            NumberKind::F64 => u64_to_f64(self.0) as i64,
            NumberKind::U64 | NumberKind::I64 => self.0 as i64,
        }
    }

    /// Casts the number to `u64`. May result in data/precision loss.
    pub fn to_u64(&self, number_kind: &NumberKind) -> u64 {
        match number_kind {
            NumberKind::F64 => u64_to_f64(self.0) as u64,
            NumberKind::U64 | NumberKind::I64 => self.0,
        }
    }

    /// Casts the number to `f64`. May result in data/precision loss.
    pub fn to_f64(&self, number_kind: &NumberKind) -> f64 {
        match number_kind {
            NumberKind::I64 => (self.0 as i64) as f64,
            NumberKind::F64 => u64_to_f64(self.0),
            NumberKind::U64 => self.0 as f64,
        }
    }

    /// Compares this number to the given other number. Both should be of
    /// the same kind.
    pub fn partial_cmp(&self, number_kind: &NumberKind, other: &Number) -> Option<cmp::Ordering> {
        match number_kind {
            NumberKind::I64 => (self.0 as i64).partial_cmp(&(other.0 as i64)),
            NumberKind::F64 => u64_to_f64(self.0).partial_cmp(&u64_to_f64(other.0)),
            NumberKind::U64 => self.0.partial_cmp(&other.0),
        }
    }

    /// Checks if this value is an f64 nan value. Do not use on non-f64
    /// values.
    pub fn is_nan(&self) -> bool {
        u64_to_f64(self.0).is_nan()
    }

    /// `true` if the actual value is less than zero.
    pub fn is_negative(&self, number_kind: &NumberKind) -> bool {
        match number_kind {
            NumberKind::I64 => (self.0 as i64).is_negative(),
            NumberKind::F64 => u64_to_f64(self.0) < 0.0,
            NumberKind::U64 => false,
        }
    }

    /// Return loaded data for debugging purposes
    pub fn to_debug(&self, kind: &NumberKind) -> Box<dyn fmt::Debug> {
        match kind {
            NumberKind::I64 => Box::new(self.0 as i64),
            NumberKind::F64 => Box::new(u64_to_f64(self.0)),
            NumberKind::U64 => Box::new(self.0),
        }
    }

    /// Convert this number into an atomically updatable cell holding the
    /// same value.
    pub fn to_atomic(self) -> AtomicNumber {
        AtomicNumber(AtomicU64::new(self.0))
    }
}

impl fmt::Debug for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Number").field(&self.0).finish()
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number(f64_to_u64(f))
    }
}

impl From<i64> for Number {
    fn from(i: i64) -> Self {
        Number(i as u64)
    }
}

impl From<u64> for Number {
    fn from(u: u64) -> Self {
        Number(u)
    }
}

/// An atomic version of [`Number`], suitable for concurrent accumulation.
#[derive(Debug, Default)]
pub struct AtomicNumber(AtomicU64);

impl AtomicNumber {
    /// Stores a value into the atomic number.
    pub fn store(&self, val: &Number) {
        self.0.store(val.0, Ordering::Release)
    }

    /// Loads a value from the atomic number.
    pub fn load(&self) -> Number {
        Number(self.0.load(Ordering::Acquire))
    }

    /// Adds to the current number. Both numbers must be of the same kind.
    ///
    /// This operation wraps around on overflow for `u64` and `i64` kinds.
    pub fn fetch_add(&self, number_kind: &NumberKind, val: &Number) {
        match number_kind {
            NumberKind::I64 => {
                let mut old = self.0.load(Ordering::Acquire);
                loop {
                    let new = (old as i64).wrapping_add(val.0 as i64) as u64;
                    match self
                        .0
                        .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire)
                    {
                        Ok(_) => break,
                        Err(v) => old = v,
                    }
                }
            }
            NumberKind::F64 => {
                let mut old = self.0.load(Ordering::Acquire);
                loop {
                    let new = f64_to_u64(u64_to_f64(old) + u64_to_f64(val.0));
                    match self
                        .0
                        .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire)
                    {
                        Ok(_) => break,
                        Err(v) => old = v,
                    }
                }
            }
            NumberKind::U64 => {
                self.0.fetch_add(val.0, Ordering::AcqRel);
            }
        }
    }

    /// Loads the current value, and stores the minimum of the current value
    /// and the given value.
    pub fn fetch_set_min(&self, number_kind: &NumberKind, val: &Number) {
        let mut old = self.0.load(Ordering::Acquire);
        loop {
            if Number(old).partial_cmp(number_kind, val) != Some(cmp::Ordering::Greater) {
                return;
            }
            match self
                .0
                .compare_exchange_weak(old, val.0, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(v) => old = v,
            }
        }
    }

    /// Loads the current value, and stores the maximum of the current value
    /// and the given value.
    pub fn fetch_set_max(&self, number_kind: &NumberKind, val: &Number) {
        let mut old = self.0.load(Ordering::Acquire);
        loop {
            if Number(old).partial_cmp(number_kind, val) != Some(cmp::Ordering::Less) {
                return;
            }
            match self
                .0
                .compare_exchange_weak(old, val.0, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(v) => old = v,
            }
        }
    }
}

impl Clone for AtomicNumber {
    fn clone(&self) -> Self {
        AtomicNumber(AtomicU64::new(self.0.load(Ordering::Acquire)))
    }
}

impl From<Number> for AtomicNumber {
    fn from(number: Number) -> Self {
        number.to_atomic()
    }
}

/// A descriptor for the encoded data type of a [`Number`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NumberKind {
    /// A number that stores `i64` values.
    I64,
    /// A number that stores `f64` values.
    F64,
    /// A number that stores `u64` values.
    U64,
}

impl NumberKind {
    /// Returns the zero value for each kind
    pub fn zero(&self) -> Number {
        match self {
            NumberKind::I64 => 0i64.into(),
            NumberKind::F64 => 0f64.into(),
            NumberKind::U64 => 0u64.into(),
        }
    }

    /// Returns the max value for each kind
    pub fn max(&self) -> Number {
        match self {
            NumberKind::I64 => i64::MAX.into(),
            NumberKind::F64 => f64::MAX.into(),
            NumberKind::U64 => u64::MAX.into(),
        }
    }

    /// Returns the min value for each kind
    pub fn min(&self) -> Number {
        match self {
            NumberKind::I64 => i64::MIN.into(),
            NumberKind::F64 => f64::MIN.into(),
            NumberKind::U64 => u64::MIN.into(),
        }
    }
}

#[inline]
fn u64_to_f64(val: u64) -> f64 {
    f64::from_bits(val)
}

#[inline]
fn f64_to_u64(val: f64) -> u64 {
    f64::to_bits(val)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_add_per_kind() {
        let n = AtomicNumber::default();
        n.fetch_add(&NumberKind::U64, &5u64.into());
        n.fetch_add(&NumberKind::U64, &7u64.into());
        assert_eq!(n.load().to_u64(&NumberKind::U64), 12);

        let f = NumberKind::F64.zero().to_atomic();
        f.fetch_add(&NumberKind::F64, &1.5f64.into());
        f.fetch_add(&NumberKind::F64, &2.25f64.into());
        assert!((f.load().to_f64(&NumberKind::F64) - 3.75).abs() < f64::EPSILON);

        let i = NumberKind::I64.zero().to_atomic();
        i.fetch_add(&NumberKind::I64, &10i64.into());
        i.fetch_add(&NumberKind::I64, &(-4i64).into());
        assert_eq!(i.load().to_i64(&NumberKind::I64), 6);
    }

    #[test]
    fn atomic_min_max() {
        let min = NumberKind::F64.max().to_atomic();
        let max = NumberKind::F64.min().to_atomic();
        for v in [12.1f64, 13.1, 14.1] {
            min.fetch_set_min(&NumberKind::F64, &v.into());
            max.fetch_set_max(&NumberKind::F64, &v.into());
        }
        assert!((min.load().to_f64(&NumberKind::F64) - 12.1).abs() < f64::EPSILON);
        assert!((max.load().to_f64(&NumberKind::F64) - 14.1).abs() < f64::EPSILON);
    }

    #[test]
    fn negative_detection() {
        assert!(Number::from(-1i64).is_negative(&NumberKind::I64));
        assert!(Number::from(-0.5f64).is_negative(&NumberKind::F64));
        assert!(!Number::from(0u64).is_negative(&NumberKind::U64));
        assert!(!Number::from(1.5f64).is_negative(&NumberKind::F64));
    }
}
