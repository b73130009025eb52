// GW2 coin: 1 gold = 100 silver = 10,000 copper
pub const COPPER_PER_GOLD: i64 = 10_000;
pub const COPPER_PER_SILVER: i64 = 100;

/// Split a copper amount into (gold, silver, copper).
pub fn decompose(amount: i64) -> (i64, i64, i64) {
    let gold = amount / COPPER_PER_GOLD;
    let silver = (amount % COPPER_PER_GOLD) / COPPER_PER_SILVER;
    let copper = amount % COPPER_PER_SILVER;
    (gold, silver, copper)
}

/// "Xg Ys Zc". Gold only when non-zero, silver whenever gold is shown.
pub fn format_gsc(amount: i64) -> String {
    if amount < 0 {
        return format!("-{}", format_gsc(amount.saturating_neg()));
    }

    let (g, s, c) = decompose(amount);
    let mut parts = Vec::with_capacity(3);
    if g != 0 {
        parts.push(format!("{}g", group_thousands(g)));
    }
    if s != 0 || g != 0 {
        parts.push(format!("{}s", s));
    }
    parts.push(format!("{}c", c));
    parts.join(" ")
}

/// Same as `format_gsc` for averaged (fractional) copper values.
pub fn format_gsc_f64(amount: f64) -> String {
    if !amount.is_finite() {
        return "0c".to_string();
    }
    format_gsc(amount.round() as i64)
}

/// "1234567" -> "1,234,567".
pub fn group_thousands(n: i64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_known_amounts() {
        assert_eq!(format_gsc(12345), "1g 23s 45c");
        assert_eq!(format_gsc(123456), "12g 34s 56c");
        assert_eq!(format_gsc(45), "45c");
        assert_eq!(format_gsc(99), "99c");
        assert_eq!(format_gsc(100), "1s 0c");
        assert_eq!(format_gsc(0), "0c");
        assert_eq!(format_gsc(10_000), "1g 0s 0c");
    }

    #[test]
    fn groups_large_gold_amounts() {
        assert_eq!(format_gsc(12_345_670_001), "1,234,567g 0s 1c");
        assert_eq!(format_gsc(9_990_000), "999g 0s 0c");
    }

    #[test]
    fn decompose_splits_tiers() {
        assert_eq!(decompose(123456), (12, 34, 56));
        assert_eq!(decompose(99), (0, 0, 99));
        assert_eq!(decompose(0), (0, 0, 0));
    }

    #[test]
    fn format_agrees_with_decompose() {
        let mut amount = 0i64;
        while amount < 5_000_000 {
            let (g, s, c) = decompose(amount);
            assert_eq!(g * COPPER_PER_GOLD + s * COPPER_PER_SILVER + c, amount);

            let expected = if g != 0 {
                format!("{}g {}s {}c", group_thousands(g), s, c)
            } else if s != 0 {
                format!("{}s {}c", s, c)
            } else {
                format!("{}c", c)
            };
            assert_eq!(format_gsc(amount), expected, "amount {}", amount);

            amount += 7919;
        }
    }

    #[test]
    fn negative_amounts_get_a_sign() {
        assert_eq!(format_gsc(-12345), "-1g 23s 45c");
    }

    #[test]
    fn fractional_values_round() {
        assert_eq!(format_gsc_f64(99.6), "1s 0c");
        assert_eq!(format_gsc_f64(f64::NAN), "0c");
    }
}
