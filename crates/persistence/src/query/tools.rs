//! Helpers for post-processing generated SQL.

use std::cmp::Ordering;

/// Removes the given placeholders from the `IN (...)` lists of `sql`.
///
/// Placeholders are removed in reverse natural order so that `:id_1` is
/// handled after `:id_10`. Leftover `, )` separators are closed up.
pub fn without_query_params(sql: &str, params: &[&str]) -> String {
    let mut sorted: Vec<&str> = params.to_vec();
    sorted.sort_by(|a, b| natural_cmp(b, a));

    let mut filtered = sql.to_string();
    for param in sorted {
        filtered = filtered.replace(&format!(" {},", param), "");
        filtered = filtered.replace(&format!("({},", param), "(");
        filtered = filtered.replace(&format!("{})", param), ")");
    }
    filtered.replace(", )", ")")
}

/// Compares strings treating embedded digit runs as numbers.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let left = take_digits(&mut a);
                let right = take_digits(&mut b);
                let ordering = left
                    .trim_start_matches('0')
                    .len()
                    .cmp(&right.trim_start_matches('0').len())
                    .then_with(|| left.trim_start_matches('0').cmp(right.trim_start_matches('0')))
                    .then_with(|| left.len().cmp(&right.len()));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        chars.next();
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = "SELECT * FROM \"products\" WHERE \"product_id\" IN (:product_id_0, :product_id_1, :product_id_2, :product_id_9, :product_id_10, :product_id_11, :product_id_12, :product_id_15, :product_id_18, :product_id_19) AND 1=1 ";

    #[test]
    fn test_removes_listed_params() {
        let removed = [
            ":product_id_0",
            ":product_id_1",
            ":product_id_12",
            ":product_id_18",
            ":product_id_19",
        ];
        let expected = "SELECT * FROM \"products\" WHERE \"product_id\" IN ( :product_id_2, :product_id_9, :product_id_10, :product_id_11, :product_id_15) AND 1=1 ";
        assert_eq!(without_query_params(QUERY, &removed), expected);
    }

    #[test]
    fn test_no_params_is_identity() {
        assert_eq!(without_query_params(QUERY, &[]), QUERY);
    }

    #[test]
    fn test_remove_last_param_only() {
        let sql = "\"a\" IN (:a_0, :a_1) AND 1=1 ";
        assert_eq!(without_query_params(sql, &[":a_1"]), "\"a\" IN (:a_0) AND 1=1 ");
    }

    #[test]
    fn test_natural_order() {
        let mut names = vec![":p_10", ":p_2", ":p_1", ":p_02"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec![":p_1", ":p_2", ":p_02", ":p_10"]);
    }
}
