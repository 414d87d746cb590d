use crate::consts::{DEFAULT_NUM_ENTRIES, DEFAULT_NUM_HASHES, MAX_NUM_HASHES, MAX_TOTAL_BITS};
use crate::errors::{Result, SeenError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_num_entries() -> usize { DEFAULT_NUM_ENTRIES }
fn default_num_hashes() -> usize { DEFAULT_NUM_HASHES }

/// Filter shape: K arrays (`num_hashes`) of N bits (`num_entries`) each.
/// Missing JSON fields fall back to 256 / 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_num_entries")]
    pub num_entries: usize,
    #[serde(default = "default_num_hashes")]
    pub num_hashes: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            num_entries: DEFAULT_NUM_ENTRIES,
            num_hashes: DEFAULT_NUM_HASHES,
        }
    }
}

impl FilterConfig {
    pub fn new(num_entries: usize, num_hashes: usize) -> Self {
        Self { num_entries, num_hashes }
    }

    /// Both dimensions must be non-zero, K at most `MAX_NUM_HASHES`, N within
    /// the u32 snapshot header, and K·N at most `MAX_TOTAL_BITS`.
    pub fn validate(&self) -> Result<()> {
        if self.num_entries == 0 {
            return Err(SeenError::Config("num_entries must be > 0".into()));
        }
        if self.num_hashes == 0 {
            return Err(SeenError::Config("num_hashes must be > 0".into()));
        }
        if self.num_hashes > MAX_NUM_HASHES {
            return Err(SeenError::Config(format!(
                "num_hashes {} exceeds {MAX_NUM_HASHES}",
                self.num_hashes
            )));
        }
        if u32::try_from(self.num_entries).is_err() {
            return Err(SeenError::Config(format!("num_entries {} exceeds u32", self.num_entries)));
        }
        match self.num_entries.checked_mul(self.num_hashes) {
            Some(total) if total <= MAX_TOTAL_BITS => Ok(()),
            _ => Err(SeenError::Config(format!(
                "num_entries * num_hashes exceeds {MAX_TOTAL_BITS} bits"
            ))),
        }
    }

    /// Reads a JSON config file; the result is validated.
    pub fn load(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: FilterConfig = serde_json::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Classic bound `(1 - e^(-K·m/N))^K` after `m` distinct inserts.
    pub fn false_positive_bound(&self, m: usize) -> f64 {
        let k = self.num_hashes as f64;
        let n = self.num_entries as f64;
        (1.0 - (-k * m as f64 / n).exp()).powf(k)
    }

    /// Rate for K partitioned arrays with one hash each: `(1 - e^(-m/N))^K`.
    pub fn expected_false_positive_rate(&self, m: usize) -> f64 {
        let n = self.num_entries as f64;
        (1.0 - (-(m as f64) / n).exp()).powf(self.num_hashes as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let c = FilterConfig::default();
        assert_eq!((c.num_entries, c.num_hashes), (256, 3));
        c.validate().unwrap();
        let partial: FilterConfig = serde_json::from_str(r#"{"num_entries":1024}"#).unwrap();
        assert_eq!((partial.num_entries, partial.num_hashes), (1024, 3));
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(matches!(FilterConfig::new(0, 3).validate(), Err(SeenError::Config(_))));
        assert!(matches!(FilterConfig::new(256, 0).validate(), Err(SeenError::Config(_))));
    }

    #[test]
    fn oversized_dimensions_rejected() {
        for cfg in [
            FilterConfig::new(256, u32::MAX as usize),
            FilterConfig::new(256, MAX_NUM_HASHES + 1),
            FilterConfig::new(u32::MAX as usize, MAX_NUM_HASHES),
            FilterConfig::new(usize::MAX, 3),
        ] {
            assert!(matches!(cfg.validate(), Err(SeenError::Config(_))), "{cfg:?}");
        }
        FilterConfig::new(256, MAX_NUM_HASHES).validate().unwrap();
        FilterConfig::new(1 << 29, 4).validate().unwrap();
    }

    #[test]
    fn load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(br#"{"num_entries":512,"num_hashes":4}"#).unwrap();
        let c = FilterConfig::load(f.path()).unwrap();
        assert_eq!(c, FilterConfig::new(512, 4));
    }

    #[test]
    fn load_rejects_negative_and_zero() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(br#"{"num_entries":-1}"#).unwrap();
        assert!(matches!(FilterConfig::load(f.path()), Err(SeenError::SerdeJson(_))));

        let mut g = tempfile::NamedTempFile::new().unwrap();
        g.write_all(br#"{"num_hashes":0}"#).unwrap();
        assert!(matches!(FilterConfig::load(g.path()), Err(SeenError::Config(_))));
    }

    #[test]
    fn fpr_formulas() {
        let c = FilterConfig::default();
        assert_eq!(c.false_positive_bound(0), 0.0);
        let bound = c.false_positive_bound(10);
        assert!((bound - 0.001353).abs() < 1e-4, "{bound}");
        // partitioned arrays sit under the classic bound for small loads
        assert!(c.expected_false_positive_rate(10) < bound);
    }
}
