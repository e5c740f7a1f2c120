// WHY: alias clustering compares names with a symmetric 0-100 Indel ratio
// (insertions and deletions only, no substitutions)

/// Case-insensitive similarity in `0.0..=100.0`: `100 * (1 - indel / (len_a + len_b))`
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.to_lowercase().chars().collect();
    let b_chars: Vec<char> = b.to_lowercase().chars().collect();
    let total = a_chars.len() + b_chars.len();

    if total == 0 {
        return 100.0;
    }

    let lcs = longest_common_subsequence(&a_chars, &b_chars);
    let indel_distance = total - 2 * lcs;
    100.0 * (1.0 - indel_distance as f64 / total as f64)
}

/// Length of the longest common subsequence, two-row dynamic programming
fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];

    for &a_char in a {
        for (j, &b_char) in b.iter().enumerate() {
            current[j + 1] = if a_char == b_char {
                previous[j] + 1
            } else {
                current[j].max(previous[j + 1])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
