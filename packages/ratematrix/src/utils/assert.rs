#[macro_export]
macro_rules! pretty_assert_eq {
  ($left:expr, $right:expr) => {{
    pretty_assertions::assert_eq!(
      format!("{:#?}", $left).replace("\n", "\u{0085}"),
      format!("{:#?}", $right).replace("\n", "\u{0085}")
    );
  }};
}

/// Approximate equality (ulps or epsilon) with a readable diff of both sides on failure
#[macro_export]
macro_rules! pretty_assert_ulps_eq {
  ($left:expr, $right:expr $(, $opt:ident = $val:expr)* $(,)?) => {{
    let left = &$left;
    let right = &$right;
    if !approx::ulps_eq!(*left, *right $(, $opt = $val)*) {
      pretty_assertions::assert_eq!(format!("{:#?}", left), format!("{:#?}", right));
      std::panic!("values differ beyond tolerance, but their printed forms are identical");
    }
  }};
}

/// Asserts that every row of a square matrix sums to the given value
#[macro_export]
macro_rules! assert_rows_sum_to {
  ($matrix:expr, $expected:expr, epsilon = $eps:expr) => {{
    for (i, row) in $matrix.rows().into_iter().enumerate() {
      let sum: f64 = row.sum();
      std::assert!(
        (sum - $expected).abs() <= $eps,
        "row {i} sums to {sum}, expected {}",
        $expected
      );
    }
  }};
}
