use ahash::AHashMap;
use ndarray::{Array1, Array2, Axis};

/// Name of the coordinate block. Always carried by an extraction because
/// the containment mask needs it.
pub const COORDINATES: &str = "Coordinates";

/// Co-indexed particle attributes: one (n, 3) co-moving coordinate block
/// plus any number of scalar columns of the same length. `row i` across
/// every column describes the same particle.
#[derive(Debug, Clone)]
pub struct ParticleTable {
    coords: Array2<f64>,
    names: Vec<String>,
    columns: Vec<Array1<f64>>,
    index: AHashMap<String, usize>,
}

impl ParticleTable {
    pub fn new(coords: Array2<f64>) -> Self {
        ParticleTable {
            coords,
            names: Vec::new(),
            columns: Vec::new(),
            index: AHashMap::new(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Array2::zeros((0, 3)))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.coords.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn coords(&self) -> &Array2<f64> {
        &self.coords
    }

    /// Scalar column names, in insertion order.
    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&Array1<f64>> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    /// Scalar columns in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array1<f64>)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter())
    }

    /// Insert or replace a scalar column. All columns stay co-indexed, so
    /// the length must match the coordinate block.
    pub fn insert(&mut self, name: &str, values: Array1<f64>) {
        assert_eq!(values.len(), self.len(), "column {name:?} length mismatch");
        match self.index.get(name) {
            Some(&i) => self.columns[i] = values,
            None => {
                self.index.insert(name.to_string(), self.columns.len());
                self.names.push(name.to_string());
                self.columns.push(values);
            }
        }
    }

    /// Keep only the particles whose mask entry is true, truncating every
    /// column in place.
    pub fn retain(&mut self, mask: &[bool]) {
        assert_eq!(mask.len(), self.len(), "mask length mismatch");
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, &m)| m)
            .map(|(i, _)| i)
            .collect();
        self.coords = self.coords.select(Axis(0), &keep);
        for column in &mut self.columns {
            *column = column.select(Axis(0), &keep);
        }
    }

    /// Append another table with the same column set (shard accumulation).
    pub fn append(&mut self, other: &ParticleTable) {
        assert_eq!(self.names, other.names, "column sets differ");
        if other.is_empty() {
            return;
        }
        self.coords
            .append(Axis(0), other.coords.view())
            .expect("coordinate blocks are both (n, 3)");
        for (column, more) in self.columns.iter_mut().zip(&other.columns) {
            column
                .append(Axis(0), more.view())
                .expect("scalar columns are 1-d");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn table() -> ParticleTable {
        let mut t = ParticleTable::new(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        t.insert("Density", array![0.1, 0.2, 0.3]);
        t.insert("Temperature", array![10.0, 20.0, 30.0]);
        t
    }

    #[test]
    fn columns_are_co_indexed() {
        let t = table();
        assert_eq!(t.len(), 3);
        assert_eq!(t.names(), ["Density", "Temperature"]);
        assert_eq!(t.column("Density").unwrap()[1], 0.2);
        assert!(t.column("Pressure").is_none());
    }

    #[test]
    fn insert_replaces_existing_column() {
        let mut t = table();
        t.insert("Density", array![9.0, 9.0, 9.0]);
        assert_eq!(t.names().len(), 2);
        assert_eq!(t.column("Density").unwrap()[0], 9.0);
    }

    #[test]
    fn retain_truncates_every_column() {
        let mut t = table();
        t.retain(&[true, false, true]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.coords()[[1, 0]], 7.0);
        assert_eq!(t.column("Density").unwrap().to_vec(), vec![0.1, 0.3]);
        assert_eq!(t.column("Temperature").unwrap().to_vec(), vec![10.0, 30.0]);
    }

    #[test]
    fn append_concatenates_shards() {
        let mut a = table();
        let b = table();
        a.append(&b);
        assert_eq!(a.len(), 6);
        assert_eq!(a.column("Temperature").unwrap()[5], 30.0);
    }

    #[test]
    fn append_of_empty_is_a_noop() {
        let mut a = table();
        let mut b = ParticleTable::empty();
        b.insert("Density", Array1::zeros(0));
        b.insert("Temperature", Array1::zeros(0));
        a.append(&b);
        assert_eq!(a.len(), 3);
    }
}
