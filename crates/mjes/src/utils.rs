/// Surnames the site writes with more than one token. Swapping them by moving
/// the first token would produce a name nobody uses.
const SWAP_EXCEPTIONS: &[(&str, &str)] = &[("Szynkowski vel Sęk Szymon", "Szymon Szynkowski vel Sęk")];

/// Converts between "Surname Firstname" and "Firstname Surname" ordering.
///
/// The speech index lists members surname-first while member pages put the
/// first name first. For ordinary names the leading token is moved to the end.
pub fn swap_name_with_surname(full_name: &str) -> String {
    for (surname_first, name_first) in SWAP_EXCEPTIONS {
        if full_name == *surname_first {
            return name_first.to_string();
        }
        if full_name == *name_first {
            return surname_first.to_string();
        }
    }

    let mut parts = full_name.split_whitespace();
    let Some(first) = parts.next() else {
        return String::new();
    };

    parts.chain(std::iter::once(first)).collect::<Vec<_>>().join(" ")
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Renders a parliamentary term number the way the site labels terms.
pub fn to_roman(mut n: u32) -> String {
    const NUMERALS: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];

    let mut out = String::new();
    for (value, numeral) in NUMERALS {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    out
}
