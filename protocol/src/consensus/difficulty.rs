//! Leading-zero difficulty check on hex hash text.

/// Number of consecutive `'0'` characters at the start of `hash`.
pub fn leading_zeros(hash: &str) -> usize {
    hash.chars().take_while(|c| *c == '0').count()
}

/// Whether `hash` carries at least `difficulty` leading zeros.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    leading_zeros(hash) >= difficulty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_only_the_leading_run() {
        assert_eq!(leading_zeros("000abc"), 3);
        assert_eq!(leading_zeros("abc"), 0);
        assert_eq!(leading_zeros("0a0b00"), 1);
        assert_eq!(leading_zeros(""), 0);
        assert_eq!(leading_zeros("0000"), 4);
    }

    #[test]
    fn never_exceeds_length() {
        for h in ["", "0", "00x", "f00", "0000000000000000000000000000000000000000"] {
            assert!(leading_zeros(h) <= h.len());
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(meets_difficulty("00ff", 2));
        assert!(!meets_difficulty("00ff", 3));
        assert!(meets_difficulty("ffff", 0));
        assert!(!meets_difficulty("ffff", 1));
    }
}
