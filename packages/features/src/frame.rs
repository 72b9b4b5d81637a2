//! A minimal named-column table.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};

/// Equal-length `f64` columns addressed by name.
///
/// A column is either present for every row or absent entirely; there
/// are no per-cell gaps once a frame is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    rows: usize,
    columns: BTreeMap<String, Array1<f64>>,
}

impl FeatureFrame {
    /// An empty frame with `rows` rows and no columns.
    #[must_use]
    pub const fn new(rows: usize) -> Self {
        Self {
            rows,
            columns: BTreeMap::new(),
        }
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Whether `name` is present.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Column names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// The column called `name`, if present.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Array1<f64>> {
        self.columns.get(name)
    }

    /// The column called `name`, or a column filled with `fill`.
    #[must_use]
    pub fn column_or(&self, name: &str, fill: f64) -> Array1<f64> {
        self.columns
            .get(name)
            .cloned()
            .unwrap_or_else(|| Array1::from_elem(self.rows, fill))
    }

    /// Inserts or replaces a column.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not have one entry per row.
    pub fn insert(&mut self, name: impl Into<String>, values: Array1<f64>) {
        let name = name.into();
        assert_eq!(
            values.len(),
            self.rows,
            "column {name} has {} values for {} rows",
            values.len(),
            self.rows
        );
        self.columns.insert(name, values);
    }

    /// Inserts a column built from optional values, filling gaps with
    /// `fill`. Nothing is inserted if every value is `None`.
    pub fn insert_sparse(&mut self, name: &str, values: &[Option<f64>], fill: f64) {
        if values.iter().all(Option::is_none) {
            return;
        }
        let column: Array1<f64> = values.iter().map(|v| v.unwrap_or(fill)).collect();
        self.insert(name, column);
    }

    /// Renames `from` to `to`, replacing any existing `to`. No-op if
    /// `from` is absent.
    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(column) = self.columns.remove(from) {
            self.columns.insert(to.to_string(), column);
        }
    }

    /// Builds a `rows x order.len()` matrix with columns in `order`.
    /// Absent columns are filled with `default(name)`.
    #[must_use]
    pub fn select(&self, order: &[&str], default: impl Fn(&str) -> f64) -> Array2<f64> {
        let mut matrix = Array2::zeros((self.rows, order.len()));
        for (j, name) in order.iter().enumerate() {
            match self.columns.get(*name) {
                Some(column) => matrix.column_mut(j).assign(column),
                None => matrix.column_mut(j).fill(default(name)),
            }
        }
        matrix
    }
}
