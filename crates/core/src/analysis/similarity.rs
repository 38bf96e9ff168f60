//! Jaro-Winkler string similarity

/// Longest shared prefix that earns the Winkler boost
const MAX_PREFIX: usize = 4;

/// Weight of each shared prefix character
const PREFIX_SCALE: f64 = 0.1;

/// Jaro-Winkler similarity in `[0, 1]`.
///
/// Characters match greedily left to right inside a window of
/// `max(len)/2 - 1`; transpositions are counted raw and halved in the
/// final formula.
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_matched = vec![false; a.len()];
    let mut b_matched = vec![false; b.len()];
    let mut matches = 0usize;

    for i in 0..a.len() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(b.len());
        for j in start..end {
            if b_matched[j] || a[i] != b[j] {
                continue;
            }
            a_matched[i] = true;
            b_matched[j] = true;
            matches += 1;
            break;
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let mut transpositions = 0usize;
    let mut k = 0usize;
    for i in 0..a.len() {
        if !a_matched[i] {
            continue;
        }
        while !b_matched[k] {
            k += 1;
        }
        if a[i] != b[k] {
            transpositions += 1;
        }
        k += 1;
    }

    let m = matches as f64;
    let t = transpositions as f64 / 2.0;
    let jaro = (m / a.len() as f64 + m / b.len() as f64 + (m - t) / m) / 3.0;

    let prefix = a
        .iter()
        .zip(b.iter())
        .take(MAX_PREFIX)
        .take_while(|(x, y)| x == y)
        .count();

    jaro + prefix as f64 * PREFIX_SCALE * (1.0 - jaro)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_identity_and_empty() {
        for s in ["", "a", "hello", "error CS0103"] {
            assert_eq!(jaro_winkler(s, s), 1.0);
        }
        assert_eq!(jaro_winkler("abc", ""), 0.0);
        assert_eq!(jaro_winkler("", "abc"), 0.0);
    }

    #[test]
    fn test_known_values() {
        assert!(close(jaro_winkler("MARTHA", "MARHTA"), 0.9611));
        assert!(close(jaro_winkler("DWAYNE", "DUANE"), 0.84));
        assert_eq!(jaro_winkler("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let pairs = [
            ("MARTHA", "MARHTA"),
            ("DWAYNE", "DUANE"),
            ("connection refused", "connection reset"),
            ("a", "ab"),
        ];
        for (a, b) in pairs {
            assert_eq!(jaro_winkler(a, b), jaro_winkler(b, a), "{} / {}", a, b);
        }
    }

    #[test]
    fn test_near_duplicate_diagnostics() {
        let score = jaro_winkler(
            "error CS0103: The name 'foo' does not exist",
            "error CS0103: The name 'bar' does not exist",
        );
        assert!(score >= 0.85, "score was {}", score);
        assert!(score < 1.0);
    }

    #[test]
    fn test_unicode_is_char_based() {
        assert_eq!(jaro_winkler("héllo", "héllo"), 1.0);
        assert!(jaro_winkler("héllo", "hello") > 0.8);
    }
}
