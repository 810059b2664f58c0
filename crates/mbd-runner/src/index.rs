//! File indices.
//!
//! Every input file name embeds a numeric index (the first run of digits).
//! The same index is stamped into output names, which is what makes a rerun
//! skip files that already produced output.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use mbd_core::ConfigError;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid digit pattern"));

/// First integer embedded in `name` (`"sim-005.csv"` -> `5`).
pub fn file_index(name: &str) -> Option<u32> {
    DIGITS.find(name)?.as_str().parse().ok()
}

/// Text that follows the first digit run, if any digits are present.
pub(crate) fn after_index(name: &str) -> Option<&str> {
    DIGITS.find(name).map(|m| &name[m.end()..])
}

/// Parse an allow-list such as `10-14,40,85-89` (ranges are inclusive).
pub fn parse_index_list(list: &str) -> Result<BTreeSet<u32>, ConfigError> {
    let invalid = |part: &str| ConfigError::InvalidParameter {
        name: "indices",
        reason: format!("'{}' is not an index or an a-b range", part),
    };

    let mut indices = BTreeSet::new();
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u32 = lo.trim().parse().map_err(|_| invalid(part))?;
                let hi: u32 = hi.trim().parse().map_err(|_| invalid(part))?;
                if lo > hi {
                    return Err(invalid(part));
                }
                indices.extend(lo..=hi);
            }
            None => {
                indices.insert(part.parse().map_err(|_| invalid(part))?);
            }
        }
    }
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_digit_run_wins() {
        assert_eq!(file_index("log005.csv"), Some(5));
        assert_eq!(file_index("art-result123-subj.csv"), Some(123));
        assert_eq!(file_index("run7_part2.csv"), Some(7));
        assert_eq!(file_index("notes.txt"), None);
    }

    #[test]
    fn test_text_after_index() {
        assert_eq!(after_index("ssc-result005-subj"), Some("-subj"));
        assert_eq!(after_index("ssc-result005"), Some(""));
        assert_eq!(after_index("summary"), None);
    }

    #[test]
    fn test_index_lists() {
        let set = parse_index_list("10-14, 40,42").unwrap();
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![10, 11, 12, 13, 14, 40, 42]);
        assert!(parse_index_list("").unwrap().is_empty());
        assert!(parse_index_list("5-1").is_err());
        assert!(parse_index_list("a-b").is_err());
        assert!(parse_index_list("x").is_err());
    }
}
