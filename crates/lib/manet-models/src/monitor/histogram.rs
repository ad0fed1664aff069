use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bin {
    pub index: u64,
    pub start: f64,
    pub width: f64,
    pub count: u64,
}

/// Fixed width histogram. Only bins that received a value are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bin_width: f64,
    bins: BTreeMap<u64, u64>,
}

impl Histogram {
    pub fn new(bin_width: f64) -> Self {
        Self {
            bin_width,
            bins: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, value: f64) {
        let index = (value.max(0.0) / self.bin_width).floor() as u64;
        *self.bins.entry(index).or_default() += 1;
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn total(&self) -> u64 {
        self.bins.values().sum()
    }

    pub fn bins(&self) -> Vec<Bin> {
        self.bins
            .iter()
            .map(|(index, count)| Bin {
                index: *index,
                start: *index as f64 * self.bin_width,
                width: self.bin_width,
                count: *count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_land_in_their_bins() {
        let mut histogram = Histogram::new(0.01);
        histogram.add(0.004);
        histogram.add(0.006);
        histogram.add(0.025);
        let bins = histogram.bins();
        assert_eq!(bins.len(), 2);
        assert_eq!((bins[0].index, bins[0].count), (0, 2));
        assert_eq!((bins[1].index, bins[1].count), (2, 1));
        assert_eq!(histogram.total(), 3);
    }
}
