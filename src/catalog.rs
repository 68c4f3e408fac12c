use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleCatalog {
    years: BTreeMap<u32, Vec<String>>,
}

impl SampleCatalog {
    pub fn new(years: BTreeMap<u32, Vec<String>>) -> Self {
        Self { years }
    }

    pub fn builtin() -> Self {
        let table: [(u32, &[&str]); 3] = [
            (
                2016,
                &[
                    "LHC19a1a_1",
                    "LHC19a1a_2",
                    "LHC19a1b_1",
                    "LHC19a1b_2",
                    "LHC19a1c_1",
                    "LHC19a1c_2",
                ],
            ),
            (2017, &["LHC18f5_1", "LHC18f5_2"]),
            (
                2018,
                &["LHC19d3_1", "LHC19d3_1_extra", "LHC19d3_2", "LHC19d3_2_extra"],
            ),
        ];
        table
            .into_iter()
            .map(|(year, samples)| (year, samples.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    pub fn samples(&self, year: u32) -> Option<&[String]> {
        self.years.get(&year).map(Vec::as_slice)
    }

    pub fn contains(&self, year: u32, sample: &str) -> bool {
        self.samples(year)
            .map(|samples| samples.iter().any(|s| s == sample))
            .unwrap_or(false)
    }

    pub fn years(&self) -> impl Iterator<Item = u32> + '_ {
        self.years.keys().copied()
    }
}

impl Default for SampleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FromIterator<(u32, Vec<String>)> for SampleCatalog {
    fn from_iter<T: IntoIterator<Item = (u32, Vec<String>)>>(iter: T) -> Self {
        Self {
            years: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_order_is_stable() {
        let catalog = SampleCatalog::builtin();
        assert_eq!(catalog.years().collect::<Vec<_>>(), vec![2016, 2017, 2018]);
        assert_eq!(
            catalog.samples(2018).unwrap(),
            ["LHC19d3_1", "LHC19d3_1_extra", "LHC19d3_2", "LHC19d3_2_extra"]
        );
        assert!(catalog.contains(2017, "LHC18f5_2"));
        assert!(!catalog.contains(2017, "LHC19d3_1"));
        assert!(catalog.samples(2015).is_none());
    }

    #[test]
    fn deserializes_year_keys() {
        let catalog: SampleCatalog =
            serde_json::from_str(r#"{"2018": ["A", "B"], "2012": ["C"]}"#).unwrap();
        assert_eq!(catalog.samples(2018).unwrap(), ["A", "B"]);
        assert_eq!(catalog.samples(2012).unwrap(), ["C"]);
    }
}
