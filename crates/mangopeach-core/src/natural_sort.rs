//! Natural ("human") string ordering.
//!
//! Digit runs compare numerically so `"2"` sorts before `"10"`. Letters compare
//! case-insensitively; exact ties fall back to a byte comparison so the order
//! is total.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

/// Compare two strings in natural order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let lhs = take_digits(&mut left);
                let rhs = take_digits(&mut right);
                match compare_numeric(&lhs, &rhs) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            (Some(l), Some(r)) => {
                let ordering = fold(l).cmp(&fold(r));
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left.next();
                right.next();
            }
        }
    }
}

/// Sort a list of strings in natural order, returning a new vector.
pub fn natural_sort<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    let mut sorted: Vec<String> = items.iter().map(|s| s.as_ref().to_string()).collect();
    sorted.sort_by(|a, b| natural_cmp(a, b));
    sorted
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

/// Compare two digit runs by value without parsing (no overflow on long runs).
fn compare_numeric(lhs: &str, rhs: &str) -> Ordering {
    let l = lhs.trim_start_matches('0');
    let r = rhs.trim_start_matches('0');
    l.len()
        .cmp(&r.len())
        .then_with(|| l.cmp(r))
        // "01" after "1"
        .then_with(|| lhs.len().cmp(&rhs.len()))
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}
