fn group_thousands(int_part: &str) -> String {
    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    with_commas.chars().rev().collect()
}

/// Format a figure with thousands separators and a fixed number of
/// decimals: 1,234.57
pub fn amount(val: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, val.abs());
    let (int_part, dec_part) = match fixed.split_once('.') {
        Some((i, d)) => (i, Some(d)),
        None => (fixed.as_str(), None),
    };
    let sign = if val < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
        "-"
    } else {
        ""
    };
    match dec_part {
        Some(d) => format!("{sign}{}.{d}", group_thousands(int_part)),
        None => format!("{sign}{}", group_thousands(int_part)),
    }
}

/// Format a float as a dollar amount with thousands separators: $1,234.56
pub fn money(val: f64) -> String {
    let formatted = amount(val, 2);
    match formatted.strip_prefix('-') {
        Some(rest) => format!("-${rest}"),
        None => format!("${formatted}"),
    }
}
