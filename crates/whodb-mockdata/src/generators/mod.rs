//! Cell value synthesis for one column.

pub mod primitives;
pub mod semantic;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use whodb_core::{CanonicalType, Column, Value};

/// A synthesized cell and the generator that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub value: Value,
    pub generator: &'static str,
}

/// Value for `column`: allowed values first, then name patterns, then type.
pub fn generate(column: &Column, rng: &mut ChaCha8Rng) -> Generated {
    if !column.allowed_values.is_empty() {
        let pick = &column.allowed_values[rng.random_range(0..column.allowed_values.len())];
        let value = Value::parse_text(&column.canonical, pick)
            .unwrap_or_else(|_| Value::Text(pick.clone()));
        return Generated {
            value,
            generator: "allowed_values",
        };
    }

    if accepts_patterns(&column.canonical)
        && let Some((id, text)) = semantic::match_column(&column.name, rng)
    {
        let text = fit_scale(fit_length(id, text, &column.canonical, rng), &column.canonical);
        if let Ok(value) = Value::parse_text(&column.canonical, &text) {
            return Generated {
                value,
                generator: id,
            };
        }
    }

    Generated {
        value: primitives::value_for_type(&column.canonical, &column.name, rng),
        generator: primitives::type_label(&column.canonical),
    }
}

fn accepts_patterns(ty: &CanonicalType) -> bool {
    ty.is_textual() || matches!(ty, CanonicalType::Float | CanonicalType::Decimal { .. })
}

fn fit_length(id: &str, text: String, ty: &CanonicalType, rng: &mut ChaCha8Rng) -> String {
    let CanonicalType::Text {
        max_len: Some(max_len),
    } = ty
    else {
        return text;
    };
    let max_len = *max_len as usize;
    if text.chars().count() <= max_len {
        return text;
    }
    if id == "email" {
        return semantic::short_email(max_len, rng);
    }
    text.chars().take(max_len).collect()
}

/// Round patterned numbers to the fraction digits a decimal column keeps.
fn fit_scale(text: String, ty: &CanonicalType) -> String {
    let CanonicalType::Decimal { precision, scale } = ty else {
        return text;
    };
    let max_scale = match precision {
        Some(_) => scale.unwrap_or(0),
        None => match scale {
            Some(scale) => *scale,
            None => return text,
        },
    };
    match text.parse::<f64>() {
        Ok(number) => format!("{number:.prec$}", prec = max_scale as usize),
        Err(_) => text,
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn allowed_values_take_priority() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let column = Column::new("email", "text").with_allowed_values(["a", "b"]);
        for _ in 0..20 {
            let generated = generate(&column, &mut rng);
            assert_eq!(generated.generator, "allowed_values");
            assert!(matches!(generated.value.as_str(), Some("a" | "b")));
        }
    }

    #[test]
    fn patterns_apply_to_text_columns_only() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let text = generate(&Column::new("email", "varchar(255)"), &mut rng);
        assert_eq!(text.generator, "email");

        let number = generate(&Column::new("phone", "integer"), &mut rng);
        assert_eq!(number.generator, "type:integer");
    }

    #[test]
    fn patterned_text_fits_short_columns() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let column = Column::new("email", "varchar(16)");
        for _ in 0..20 {
            let generated = generate(&column, &mut rng);
            let text = generated.value.as_str().unwrap().to_string();
            assert!(text.chars().count() <= 16, "{text}");
        }
    }

    #[test]
    fn latitude_fills_numeric_columns() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let generated = generate(&Column::new("lat", "double precision"), &mut rng);
        assert_eq!(generated.generator, "latitude");
        let value = generated.value.as_f64().unwrap();
        assert!((-90.0..=90.0).contains(&value));
    }

    #[test]
    fn coordinates_keep_the_column_scale() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for name in ["lat", "longitude"] {
            let column = Column::new(name, "numeric(9,2)");
            for _ in 0..20 {
                let generated = generate(&column, &mut rng);
                assert_ne!(generated.generator, "type:decimal");
                let Value::Decimal(text) = &generated.value else {
                    panic!("expected a decimal, got {:?}", generated.value);
                };
                let fraction = text.split_once('.').map_or("", |(_, frac)| frac);
                assert!(fraction.len() <= 2, "{text}");
            }
        }
    }
}
