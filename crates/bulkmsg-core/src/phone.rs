//! Phone number canonicalization.
//!
//! Operators paste heterogeneous digit dumps (spreadsheet exports, chat
//! copies) with or without separators. `canonicalize` recovers every
//! individually valid domestic number from such input:
//!
//! - every non-digit is dropped;
//! - a leading country code `55` is removed once when the stream is longer
//!   than a single mobile number;
//! - the stream is split into 10- and 11-digit candidates, preferring splits
//!   that account for every digit and rewrite the fewest numbers;
//! - candidates are validated and normalized (10-digit mobiles gain their `9`).
//!
//! Invalid candidates are dropped silently.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Country code stripped from pasted input and prepended for the gateway.
pub const COUNTRY_CODE: &str = "55";

const FIXED_LEN: usize = 10;
const MOBILE_LEN: usize = 11;
const DOUBLED_MARKER_LEN: usize = 12;
const CANDIDATE_LENS: [usize; 2] = [FIXED_LEN, MOBILE_LEN];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumberKind {
    Fixed,
    Mobile,
}

/// Domestic phone number in canonical form: 10 digits for fixed lines,
/// 11 digits (`AA9XXXXXXXX`) for mobiles. Country code is not included.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalPhoneNumber {
    digits: String,
}

impl CanonicalPhoneNumber {
    /// Validate one closed candidate (digits only, 10 to 12 long).
    ///
    /// Returns `None` instead of a partially formed number.
    pub fn from_candidate(candidate: &str) -> Option<Self> {
        normalize_candidate(candidate.as_bytes()).map(|digits| Self { digits })
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn area_code(&self) -> u8 {
        area_code(self.digits.as_bytes()).unwrap_or_default()
    }

    pub fn local_number(&self) -> &str {
        &self.digits[2..]
    }

    pub fn kind(&self) -> NumberKind {
        if self.digits.len() == MOBILE_LEN {
            NumberKind::Mobile
        } else {
            NumberKind::Fixed
        }
    }

    /// Address with the country code, as expected by the gateway.
    pub fn international(&self) -> String {
        format!("{COUNTRY_CODE}{}", self.digits)
    }
}

impl fmt::Display for CanonicalPhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digits)
    }
}

impl TryFrom<String> for CanonicalPhoneNumber {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_candidate(&value)
            .filter(|n| n.digits == value)
            .ok_or_else(|| Error::Validation(format!("not a canonical phone number: {value}")))
    }
}

impl From<CanonicalPhoneNumber> for String {
    fn from(value: CanonicalPhoneNumber) -> Self {
        value.digits
    }
}

/// Extract every valid number from `raw`, in input order, without duplicates.
pub fn canonicalize(raw: &str) -> Vec<CanonicalPhoneNumber> {
    canonicalize_excluding(raw, &HashSet::new())
}

/// Like [`canonicalize`], also skipping numbers already in `existing`.
pub fn canonicalize_excluding(
    raw: &str,
    existing: &HashSet<CanonicalPhoneNumber>,
) -> Vec<CanonicalPhoneNumber> {
    let digits = strip_country_code(digits_only(raw));

    let mut seen: HashSet<CanonicalPhoneNumber> = HashSet::new();
    let mut out = Vec::new();
    for candidate in segment(&digits) {
        let Some(number) = CanonicalPhoneNumber::from_candidate(candidate) else {
            continue;
        };
        if existing.contains(&number) || !seen.insert(number.clone()) {
            continue;
        }
        out.push(number);
    }
    out
}

fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn strip_country_code(digits: String) -> String {
    if digits.len() > MOBILE_LEN && digits.starts_with(COUNTRY_CODE) {
        digits[COUNTRY_CODE.len()..].to_string()
    } else {
        digits
    }
}

/// Split a digit stream into closed candidates.
///
/// A whole 11-digit stream, or a whole 12-digit stream carrying a doubled
/// marker, is one number as typed. Otherwise the stream is split into valid
/// 10- and 11-digit candidates covering every digit; noisy streams with no
/// such split fall back to greedy accumulation.
fn segment(digits: &str) -> Vec<&str> {
    let d = digits.as_bytes();
    if d.len() == MOBILE_LEN
        || (d.len() == DOUBLED_MARKER_LEN && normalize_candidate(d).is_some())
    {
        return vec![digits];
    }

    exact_cover(digits).unwrap_or_else(|| greedy_segment(digits))
}

/// Split covering the whole stream with valid candidates, if one exists.
///
/// The split with the fewest rewritten candidates (10-digit mobiles missing
/// their `9`) wins. Remaining ties take the 10-digit reading first.
fn exact_cover(digits: &str) -> Option<Vec<&str>> {
    let d = digits.as_bytes();
    let n = d.len();
    if n == 0 {
        return None;
    }

    // rewrites[i]: fewest rewritten candidates in a full split of d[i..].
    let mut rewrites: Vec<Option<usize>> = vec![None; n + 1];
    rewrites[n] = Some(0);
    for i in (0..n).rev() {
        let best = CANDIDATE_LENS
            .iter()
            .filter_map(|&len| split_cost(d, i, len, &rewrites))
            .min();
        rewrites[i] = best;
    }

    let mut out = Vec::new();
    let mut i = 0usize;
    while i < n {
        let best = rewrites[i]?;
        let len = CANDIDATE_LENS
            .into_iter()
            .find(|&len| split_cost(d, i, len, &rewrites) == Some(best))?;
        out.push(&digits[i..i + len]);
        i += len;
    }
    Some(out)
}

/// Cost of closing `d[i..i + len]` and fully splitting what follows.
fn split_cost(d: &[u8], i: usize, len: usize, rewrites: &[Option<usize>]) -> Option<usize> {
    let rest = rewrites.get(i + len).copied().flatten()?;
    let candidate = &d[i..i + len];
    normalize_candidate(candidate)?;
    Some(rest + usize::from(is_rewritten(candidate)))
}

/// 11 digits always close a candidate. 10 digits close one when more digits
/// follow, unless the third digit is the mobile marker, the next digit
/// completes a valid 11-digit mobile, and that reading does not strand the
/// digits after it. A trailing 10-digit remainder closes as the last
/// candidate; shorter remainders are discarded.
fn greedy_segment(digits: &str) -> Vec<&str> {
    let d = digits.as_bytes();
    let mut out = Vec::new();
    let mut start = 0usize;
    for i in 0..d.len() {
        let len = i + 1 - start;
        let more_follow = i + 1 < d.len();

        if len == MOBILE_LEN {
            out.push(&digits[start..=i]);
            start = i + 1;
        } else if len == FIXED_LEN && more_follow {
            let continues_as_mobile = d[start + 2] == b'9'
                && valid_mobile(&d[start..=i + 1])
                && (starts_with_candidate(&d[i + 2..]) || !starts_with_candidate(&d[i + 1..]));
            if !continues_as_mobile {
                out.push(&digits[start..=i]);
                start = i + 1;
            }
        }
    }

    if d.len() - start >= FIXED_LEN {
        out.push(&digits[start..]);
    }
    out
}

fn starts_with_candidate(rest: &[u8]) -> bool {
    rest.is_empty()
        || CANDIDATE_LENS
            .iter()
            .any(|&len| rest.len() >= len && normalize_candidate(&rest[..len]).is_some())
}

fn is_rewritten(c: &[u8]) -> bool {
    c.len() == FIXED_LEN && matches!(c[2], b'6'..=b'9')
}

fn normalize_candidate(c: &[u8]) -> Option<String> {
    if !c.iter().all(u8::is_ascii_digit) {
        return None;
    }
    area_code(c)?;

    match c.len() {
        FIXED_LEN => match c[2] {
            b'2'..=b'5' => Some(ascii(c)),
            b'6'..=b'9' => {
                // Mobile typed without its leading 9.
                let mut s = ascii(&c[..2]);
                s.push('9');
                s.push_str(&ascii(&c[2..]));
                Some(s)
            }
            _ => None,
        },
        MOBILE_LEN => valid_mobile(c).then(|| ascii(c)),
        DOUBLED_MARKER_LEN => {
            if c[2] != b'9' || c[3] != b'9' {
                return None;
            }
            let mut fixed = c[..2].to_vec();
            fixed.extend_from_slice(&c[3..]);
            valid_mobile(&fixed).then(|| ascii(&fixed))
        }
        _ => None,
    }
}

fn valid_mobile(c: &[u8]) -> bool {
    c.len() == MOBILE_LEN
        && area_code(c).is_some()
        && c[2] == b'9'
        && matches!(c[3], b'6'..=b'9')
}

/// Area code of a candidate, if within 11..=99.
fn area_code(c: &[u8]) -> Option<u8> {
    if c.len() < 2 || !c[0].is_ascii_digit() || !c[1].is_ascii_digit() {
        return None;
    }
    let code = (c[0] - b'0') * 10 + (c[1] - b'0');
    (11..=99).contains(&code).then_some(code)
}

fn ascii(c: &[u8]) -> String {
    c.iter().map(|b| *b as char).collect()
}
