//! Table-driven test helpers shared by the shape library crates.

use std::fmt::Debug;
use std::panic::{catch_unwind, RefUnwindSafe};

/// Run a test function over a table of cases.
///
/// Each case is a value of a `Debug` struct, conventionally named `Case`.
/// Every case is run even if an earlier one fails. Once all cases have run,
/// `test_each` panics with the debug representation of each failing case.
///
/// ```
/// use rten_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     shape: Vec<usize>,
///     len: usize,
/// }
///
/// let cases = [
///     Case { shape: vec![], len: 1 },
///     Case { shape: vec![2, 3], len: 6 },
///     Case { shape: vec![4, 0], len: 0 },
/// ];
///
/// cases.test_each(|case| {
///     assert_eq!(case.shape.iter().product::<usize>(), case.len);
/// });
/// ```
///
/// Cases and values captured by the test function must be
/// [unwind safe](std::panic::UnwindSafe), so they should not hold interior
/// mutability. Values which are not can be created inside the test function
/// instead, or wrapped in [`AssertUnwindSafe`](std::panic::AssertUnwindSafe).
pub trait TestCases {
    type Case;

    /// Call `test` with a reference to each case, collecting failures.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        I::Item: Debug + RefUnwindSafe,
    {
        let total_and_failures =
            self.into_iter()
                .fold((0, Vec::new()), |(total, mut failures), case| {
                    if catch_unwind(|| test(&case)).is_err() {
                        failures.push(case);
                    }
                    (total + 1, failures)
                });
        let (total, failures) = total_and_failures;
        assert!(
            failures.is_empty(),
            "{} of {} test cases failed: {:?}",
            failures.len(),
            total,
            failures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::TestCases;

    #[derive(Debug)]
    struct Case {
        dims: [usize; 2],
    }

    #[test]
    fn test_each_success() {
        let cases = [Case { dims: [1, 2] }, Case { dims: [3, 4] }];
        cases.test_each(|case| assert!(case.dims[0] < case.dims[1]));
    }

    #[test]
    #[should_panic(expected = "1 of 2 test cases failed")]
    fn test_each_reports_failures() {
        let cases = [Case { dims: [1, 2] }, Case { dims: [4, 3] }];
        cases.test_each(|case| assert!(case.dims[0] < case.dims[1]));
    }

    #[test]
    fn test_each_empty() {
        let cases: [Case; 0] = [];
        cases.test_each(|_| panic!("no cases to run"));
    }
}
