use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ForecastError, Result};

pub const TARGET_COL: &str = "y";
pub const MASK_COL: &str = "available_mask";

/// Ordered, unique channel names with name -> position lookup.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ColumnIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl PartialEq for ColumnIndex {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl TryFrom<Vec<String>> for ColumnIndex {
    type Error = ForecastError;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::new(names.as_slice())
    }
}

impl From<ColumnIndex> for Vec<String> {
    fn from(cols: ColumnIndex) -> Self {
        cols.names
    }
}

impl ColumnIndex {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut positions = HashMap::with_capacity(names.len());
        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();

        for (idx, name) in names.iter().enumerate() {
            if positions.insert(name.clone(), idx).is_some() {
                return Err(ForecastError::DuplicateColumn(name.clone()));
            }
        }

        Ok(Self { names, positions })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn get_loc(&self, name: &str) -> Result<usize> {
        self.positions
            .get(name)
            .copied()
            .ok_or_else(|| ForecastError::MissingColumn(name.to_string()))
    }

    pub fn get_locs<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        names.iter().map(|n| self.get_loc(n.as_ref())).collect()
    }

    /// Appends a column, failing if it is already present.
    pub fn with_column(&self, name: &str) -> Result<Self> {
        let mut names = self.names.clone();
        names.push(name.to_string());
        Self::new(names.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_positions_by_name() {
        let cols = ColumnIndex::new(&["y", "price", MASK_COL]).unwrap();

        assert_eq!(cols.len(), 3);
        assert_eq!(cols.get_loc("y").unwrap(), 0);
        assert_eq!(cols.get_loc(MASK_COL).unwrap(), 2);
        assert_eq!(cols.get_locs(&["price", "y"]).unwrap(), vec![1, 0]);
    }

    #[test]
    fn missing_name_is_reported() {
        let cols = ColumnIndex::new(&["y", MASK_COL]).unwrap();

        match cols.get_loc("promo") {
            Err(ForecastError::MissingColumn(name)) => assert_eq!(name, "promo"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicates() {
        let err = ColumnIndex::new(&["y", "y"]).unwrap_err();
        assert!(matches!(err, ForecastError::DuplicateColumn(_)));
    }

    #[test]
    fn with_column_appends() {
        let cols = ColumnIndex::new(&["y"]).unwrap().with_column(MASK_COL).unwrap();
        assert_eq!(cols.names(), &["y".to_string(), MASK_COL.to_string()]);
    }
}
