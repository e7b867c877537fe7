use std::sync::LazyLock;

use fake::Fake;
use fake::faker::address::en::{
    BuildingNumber, CityName, CountryName, StateName, StreetName, ZipCode,
};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{DomainSuffix, IPv4, Password, SafeEmail, Username};
use fake::faker::job::en::Title;
use fake::faker::lorem::en::{Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use regex::Regex;

type Produce = fn(&mut ChaCha8Rng) -> String;

struct ColumnPattern {
    regex: Regex,
    id: &'static str,
    produce: Produce,
}

fn pattern(expr: &str, id: &'static str, produce: Produce) -> ColumnPattern {
    ColumnPattern {
        regex: Regex::new(expr).expect("valid column pattern"),
        id,
        produce,
    }
}

// First match wins; specific names precede generic ones.
static PATTERNS: LazyLock<Vec<ColumnPattern>> = LazyLock::new(|| {
    vec![
        pattern(r"(?i)(^|_)e[-_]?mail(_|$)", "email", |rng| {
            SafeEmail().fake_with_rng(rng)
        }),
        pattern(r"(?i)(^|_)(user[-_]?name|uname|login)(_|$)", "username", |rng| {
            Username().fake_with_rng(rng)
        }),
        pattern(
            r"(?i)(^|_)(first[-_]?name|fname|given[-_]?name)(_|$)",
            "first_name",
            |rng| FirstName().fake_with_rng(rng),
        ),
        pattern(
            r"(?i)(^|_)(last[-_]?name|lname|surname|family[-_]?name)(_|$)",
            "last_name",
            |rng| LastName().fake_with_rng(rng),
        ),
        pattern(
            r"(?i)^name$|(^|_)(full[-_]?name|display[-_]?name)(_|$)",
            "full_name",
            |rng| Name().fake_with_rng(rng),
        ),
        pattern(r"(?i)(^|_)(phone|mobile|cell|telephone|tel)(_|$)", "phone", |rng| {
            PhoneNumber().fake_with_rng(rng)
        }),
        // Before address so `ip_address` is an ip.
        pattern(r"(?i)(^|_)(ip|ip[-_]?addr(ess)?)(_|$)", "ip", |rng| {
            IPv4().fake_with_rng(rng)
        }),
        pattern(r"(?i)^(url|website|link|homepage)$", "url", |rng| {
            let word: String = Word().fake_with_rng(rng);
            let suffix: String = DomainSuffix().fake_with_rng(rng);
            format!("https://{word}.{suffix}")
        }),
        pattern(
            r"(?i)(^|_)(street[-_]?address|address[-_]?line|address|street)(_|$)",
            "address",
            |rng| {
                let number: String = BuildingNumber().fake_with_rng(rng);
                let street: String = StreetName().fake_with_rng(rng);
                format!("{number} {street}")
            },
        ),
        pattern(r"(?i)^city$", "city", |rng| CityName().fake_with_rng(rng)),
        pattern(r"(?i)^(state|province|region)$", "state", |rng| {
            StateName().fake_with_rng(rng)
        }),
        pattern(r"(?i)^country$", "country", |rng| {
            CountryName().fake_with_rng(rng)
        }),
        pattern(r"(?i)(^|_)(zip|postal|postcode)(_|$)", "zip", |rng| {
            ZipCode().fake_with_rng(rng)
        }),
        pattern(r"(?i)(^|_)(company|organization|org)(_|$)", "company", |rng| {
            CompanyName().fake_with_rng(rng)
        }),
        pattern(
            r"(?i)(^|_)(job[-_]?title|title|position|role)(_|$)",
            "job_title",
            |rng| Title().fake_with_rng(rng),
        ),
        pattern(
            r"(?i)(^|_)(description|bio|about|summary)(_|$)",
            "description",
            |rng| Sentence(5..12).fake_with_rng(rng),
        ),
        pattern(r"(?i)^(latitude|lat)$", "latitude", |rng| {
            format!("{:.6}", rng.random_range(-90.0..=90.0_f64))
        }),
        pattern(r"(?i)^(longitude|lng|lon)$", "longitude", |rng| {
            format!("{:.6}", rng.random_range(-180.0..=180.0_f64))
        }),
        pattern(
            r"(?i)(^|_)(password|passwd|pwd|secret|api[-_]?key|token)(_|$)",
            "password",
            |rng| Password(12..20).fake_with_rng(rng),
        ),
    ]
});

/// Realistic raw text for a column whose name matches a known pattern.
///
/// Returns the pattern id alongside the produced text; the caller decides
/// whether the text fits the column's type.
pub fn match_column(column: &str, rng: &mut ChaCha8Rng) -> Option<(&'static str, String)> {
    PATTERNS
        .iter()
        .find(|pattern| pattern.regex.is_match(column))
        .map(|pattern| (pattern.id, (pattern.produce)(rng)))
}

/// Email that fits in `max_len` characters.
pub fn short_email(max_len: usize, rng: &mut ChaCha8Rng) -> String {
    let user: String = (0..max_len.saturating_sub(12).clamp(1, 5))
        .map(|_| char::from(rng.random_range(b'a'..=b'z')))
        .collect();
    let email = format!("{user}@example.com");
    email.chars().take(max_len).collect()
}
