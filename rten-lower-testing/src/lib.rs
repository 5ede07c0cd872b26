//! Internal testing utilities for the rten-lower crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Run table-driven tests, where each case is a value describing one
/// scenario.
///
/// All cases are run even if earlier cases fail. Panics raised by the test
/// function are caught, and after the last case has run the failures are
/// reported together, each with its position in the table and its debug
/// representation.
///
/// ```
/// use rten_lower_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     in_len: usize,
///     kernel: usize,
///     expected: usize,
/// }
///
/// let cases = [
///     Case { in_len: 32, kernel: 2, expected: 31 },
///     Case { in_len: 5, kernel: 5, expected: 1 },
/// ];
///
/// cases.test_each(|case| {
///     assert_eq!(case.in_len - case.kernel + 1, case.expected);
/// });
/// ```
///
/// The test function and any values it captures must be unwind safe. Wrap
/// values that are not in [`AssertUnwindSafe`](std::panic::AssertUnwindSafe),
/// or construct them inside the test function.
pub trait TestCases {
    /// Data for one test case.
    type Case;

    /// Run `test` with a reference to each case.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Run `test` with each case passed by value.
    ///
    /// The debug representation of each case is captured before it is moved
    /// into the test function.
    fn test_each_value(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + UnwindSafe;
}

/// Panic with a summary of failed cases, if there are any.
fn report_failures(total: usize, failures: &[(usize, String)]) {
    if failures.is_empty() {
        return;
    }
    let details: Vec<String> = failures
        .iter()
        .map(|(index, case)| format!("  case #{}: {}", index, case))
        .collect();
    panic!(
        "{} of {} test cases failed:\n{}",
        failures.len(),
        total,
        details.join("\n")
    );
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        I::Item: Debug + RefUnwindSafe,
    {
        let mut failures = Vec::new();
        let mut total = 0;
        for (index, case) in self.into_iter().enumerate() {
            total += 1;
            let result = std::panic::catch_unwind(|| test(&case));
            if result.is_err() {
                failures.push((index, format!("{:?}", case)));
            }
        }
        report_failures(total, &failures);
    }

    fn test_each_value(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        I::Item: Debug + UnwindSafe,
    {
        let mut failures = Vec::new();
        let mut total = 0;
        for (index, case) in self.into_iter().enumerate() {
            total += 1;
            let description = format!("{:?}", case);
            let test = &test;
            let result = std::panic::catch_unwind(move || test(case));
            if result.is_err() {
                failures.push((index, description));
            }
        }
        report_failures(total, &failures);
    }
}
