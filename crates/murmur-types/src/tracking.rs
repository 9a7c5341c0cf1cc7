use rand::Rng;

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of the random suffix of a tracking code.
const RANDOM_LEN: usize = 6;

/// Generate a tracking code of the form `TRK-<base36 millis>-<base36 random>`.
pub fn generate_tracking_code() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = rand::rng();
    let suffix: String = (0..RANDOM_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("TRK-{}-{}", to_base36(millis), suffix)
}

/// Cheap shape check used before touching the database with a client-supplied code.
pub fn is_tracking_code(code: &str) -> bool {
    let mut parts = code.split('-');
    let (Some("TRK"), Some(stamp), Some(random), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let valid = |s: &str| {
        !s.is_empty()
            && s.len() <= 16
            && s.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
    };
    valid(stamp) && valid(random)
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn base36_encoding() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "LOYW3V28");
    }

    #[test]
    fn generated_codes_match_pattern() {
        for _ in 0..100 {
            let code = generate_tracking_code();
            assert!(is_tracking_code(&code), "bad code {code}");
            assert_eq!(code, code.to_uppercase());
        }
    }

    #[test]
    fn codes_generated_back_to_back_are_distinct() {
        let codes: HashSet<String> = (0..200).map(|_| generate_tracking_code()).collect();
        assert_eq!(codes.len(), 200);
    }

    #[test]
    fn shape_check_rejects_garbage() {
        assert!(!is_tracking_code("TRK-ABC"));
        assert!(!is_tracking_code("trk-abc-def"));
        assert!(!is_tracking_code("TRK-ABC-DEF-GHI"));
        assert!(!is_tracking_code("TRK--DEF"));
        assert!(!is_tracking_code("TRK-AB/C-DEF"));
        assert!(is_tracking_code("TRK-LOYW3V28-X9Q2KA"));
    }
}
