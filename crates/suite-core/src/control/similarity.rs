//! "Did you mean" support: similarity between a requested name and the
//! names found in control files

use super::TestDefinition;

/// What to compare a requested name against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Similarity {
    TestName(String),
    TestFile(String),
    SuiteName(String),
}

impl Similarity {
    /// Candidate names of `test` with their similarity ratio
    pub fn scores(&self, test: &TestDefinition) -> Vec<(String, f64)> {
        match self {
            Similarity::TestName(wanted) => {
                vec![(test.name.clone(), similarity_ratio(&test.name, wanted))]
            }
            Similarity::TestFile(wanted) => {
                vec![(test.path.clone(), similarity_ratio(&test.path, wanted))]
            }
            Similarity::SuiteName(wanted) => test
                .suite_tags
                .iter()
                .map(|tag| (tag.clone(), similarity_ratio(tag, wanted)))
                .collect(),
        }
    }
}

/// Ratcliff/Obershelp ratio `2*M / T`, where `M` counts characters in
/// matching blocks and `T` is the combined length. 1.0 for two empty strings.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let (i, j, len) = longest_match(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_characters(&a[..i], &b[..j])
        + matching_characters(&a[i + len..], &b[j + len..])
}

/// Longest common block; ties go to the earliest start in `a`, then in `b`
fn longest_match(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut row = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                row[j + 1] = prev[j] + 1;
                let len = row[j + 1];
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        prev = row;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_values() {
        assert_eq!(similarity_ratio("abcd", "abcd"), 1.0);
        assert_eq!(similarity_ratio("abcd", "wxyz"), 0.0);
        assert_eq!(similarity_ratio("", ""), 1.0);
        // "abcd" vs "bcde": block "bcd" -> 2*3/8
        assert!((similarity_ratio("abcd", "bcde") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_ratio_recurses_into_both_sides() {
        // blocks "dummy_" and "ass" -> 2*9/20
        let ratio = similarity_ratio("dummy_Pass", "dummy_Bass");
        assert!((ratio - 0.9).abs() < 1e-9);
    }
}
