//! Display formatting for stat cards

/// `$1,234.56`; negative amounts render as `-$1,234.56`
pub fn format_currency(amount: f64) -> String {
    let amount = sanitize(amount);
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}${}.{}", sign, group_thousands(whole), cents)
}

/// `2,350`; fractional values are rounded
pub fn format_integer(value: f64) -> String {
    let rounded = sanitize(value).round();
    let digits = format!("{:.0}", rounded.abs());
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{}{}", sign, group_thousands(&digits))
}

/// `15.3%`, one decimal place
pub fn format_percentage(value: f64) -> String {
    format!("{:.1}%", sanitize(value))
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
