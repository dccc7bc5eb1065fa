//! Associative binary reduction operators over numeric scalars.
//!
//! The distilled system this crate is based on duplicated a single reduction
//! implementation into per-type variants with a source-code template
//! generator. This crate uses generics and monomorphization instead: each
//! operator is a zero-sized marker type implementing [`ReduceOp<T>`] for the
//! four scalar types a barrier can reduce over (`i32`, `i64`, `f32`, `f64`).

/// A pure, side-effect-free binary combine over `T`.
///
/// Implementations must be referentially transparent: no allocation, no
/// shared mutable state. Spin-based barrier fold loops call this on the
/// hot path and a non-terminating or blocking implementation livelocks
/// every party.
pub trait ReduceOp<T> {
    /// Combine `a` and `b` in that order.
    fn combine(a: T, b: T) -> T;
}

/// Minimum of two values. Ties keep the left operand.
#[derive(Debug, Clone, Copy, Default)]
pub struct Min;

/// Maximum of two values. Ties keep the left operand.
#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

/// Sum of two values: wrapping for integers, IEEE-754 addition for floats.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

macro_rules! impl_min_max_int {
    ($t:ty) => {
        impl ReduceOp<$t> for Min {
            #[inline]
            fn combine(a: $t, b: $t) -> $t {
                if a <= b {
                    a
                } else {
                    b
                }
            }
        }

        impl ReduceOp<$t> for Max {
            #[inline]
            fn combine(a: $t, b: $t) -> $t {
                if a >= b {
                    a
                } else {
                    b
                }
            }
        }

        impl ReduceOp<$t> for Sum {
            #[inline]
            fn combine(a: $t, b: $t) -> $t {
                a.wrapping_add(b)
            }
        }
    };
}

macro_rules! impl_min_max_float {
    ($t:ty) => {
        impl ReduceOp<$t> for Min {
            #[inline]
            fn combine(a: $t, b: $t) -> $t {
                if a <= b {
                    a
                } else {
                    b
                }
            }
        }

        impl ReduceOp<$t> for Max {
            #[inline]
            fn combine(a: $t, b: $t) -> $t {
                if a >= b {
                    a
                } else {
                    b
                }
            }
        }

        impl ReduceOp<$t> for Sum {
            #[inline]
            fn combine(a: $t, b: $t) -> $t {
                a + b
            }
        }
    };
}

impl_min_max_int!(i32);
impl_min_max_int!(i64);
impl_min_max_float!(f32);
impl_min_max_float!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_sum_i32() {
        assert_eq!(Min::combine(3, 7), 3);
        assert_eq!(Min::combine(7, 3), 3);
        assert_eq!(Max::combine(3, 7), 7);
        assert_eq!(Sum::combine(3, 7), 10);
    }

    #[test]
    fn min_max_tie_break_keeps_left_operand() {
        // With equal values there's no observable difference, but both
        // branches of the `<=`/`>=` comparison must be exercised.
        assert_eq!(Min::combine(5, 5), 5);
        assert_eq!(Max::combine(5, 5), 5);
    }

    #[test]
    fn sum_wraps_for_integers() {
        assert_eq!(Sum::combine(i32::MAX, 1), i32::MIN);
        assert_eq!(Sum::combine(i64::MAX, 1), i64::MIN);
    }

    #[test]
    fn float_sum_and_bounds() {
        assert_eq!(Sum::combine(1.0f64, 2.0f64), 3.0f64);
        assert_eq!(Min::combine(1.5f32, -2.5f32), -2.5f32);
        assert_eq!(Max::combine(1.5f32, -2.5f32), 1.5f32);
    }

    #[test]
    fn left_fold_matches_mathematical_reduction_for_commutative_ops() {
        let values = [7i32, 3, 9, 1];
        let folded = values[1..]
            .iter()
            .fold(values[0], |acc, &v| Sum::combine(acc, v));
        assert_eq!(folded, values.iter().sum::<i32>());

        let min_folded = values[1..]
            .iter()
            .fold(values[0], |acc, &v| Min::combine(acc, v));
        assert_eq!(min_folded, *values.iter().min().unwrap());
    }
}
