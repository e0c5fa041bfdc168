use rust_decimal::Decimal;

use crate::domain::service::{FieldKind, FieldSpec};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldRejection {
    Empty,
    NotNumeric,
    OutOfRange,
    UnknownOption,
}

/// Validates raw user input against a field and returns the normalized value to store.
pub fn validate_field_value(field: &FieldSpec, raw: &str) -> Result<String, FieldRejection> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FieldRejection::Empty);
    }

    match &field.kind {
        FieldKind::Text => Ok(trimmed.to_string()),
        FieldKind::Number { min, max, unit } => {
            let value = parse_number(trimmed, unit.as_deref()).ok_or(FieldRejection::NotNumeric)?;
            let above_min = min.map_or(true, |min| value >= min);
            let below_max = max.map_or(true, |max| value <= max);
            if above_min && below_max {
                Ok(value.normalize().to_string())
            } else {
                Err(FieldRejection::OutOfRange)
            }
        }
        FieldKind::Choice { options } => {
            match_option(options, trimmed).cloned().ok_or(FieldRejection::UnknownOption)
        }
    }
}

/// Exact case-insensitive match first, then substring containment in either direction.
pub fn match_option<'a>(options: &'a [String], raw: &str) -> Option<&'a String> {
    let wanted = raw.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    options.iter().find(|option| option.to_lowercase() == wanted).or_else(|| {
        options.iter().find(|option| {
            let option = option.to_lowercase();
            option.contains(&wanted) || wanted.contains(&option)
        })
    })
}

/// Best-effort value for untrusted input: valid input is kept, numbers are clamped,
/// anything else falls back to the field default.
pub fn coerce_field_value(field: &FieldSpec, raw: Option<&str>) -> String {
    if let Some(value) = raw.and_then(|raw| validate_field_value(field, raw).ok()) {
        return value;
    }

    match &field.kind {
        FieldKind::Number { min, max, unit } => {
            let parsed = raw.and_then(|raw| parse_number(raw.trim(), unit.as_deref()));
            let fallback = field
                .default
                .as_deref()
                .and_then(|default| parse_number(default, None))
                .or(*min)
                .unwrap_or(Decimal::ZERO);
            let mut value = parsed.unwrap_or(fallback);
            if let Some(min) = min {
                value = value.max(*min);
            }
            if let Some(max) = max {
                value = value.min(*max);
            }
            value.normalize().to_string()
        }
        FieldKind::Choice { options } => field
            .default
            .as_deref()
            .and_then(|default| match_option(options, default))
            .or_else(|| options.first())
            .cloned()
            .unwrap_or_default(),
        FieldKind::Text => field.default.clone().unwrap_or_default(),
    }
}

pub fn field_hint(field: &FieldSpec) -> Option<String> {
    match &field.kind {
        FieldKind::Text => None,
        FieldKind::Number { min, max, unit } => {
            let unit = unit.as_deref().map(|unit| format!(" {unit}")).unwrap_or_default();
            match (min, max) {
                (Some(min), Some(max)) => Some(format!("Enter a number from {min} to {max}{unit}.")),
                (Some(min), None) => Some(format!("Enter a number of at least {min}{unit}.")),
                (None, Some(max)) => Some(format!("Enter a number up to {max}{unit}.")),
                (None, None) => Some(format!("Enter a number{unit}.")),
            }
        }
        FieldKind::Choice { options } => Some(format!("Options: {}.", options.join(", "))),
    }
}

fn parse_number(raw: &str, unit: Option<&str>) -> Option<Decimal> {
    let mut cleaned = raw.trim().replace(',', "");
    if let Some(unit) = unit {
        if cleaned.to_ascii_lowercase().ends_with(&unit.to_ascii_lowercase()) {
            cleaned.truncate(cleaned.len() - unit.len());
        }
    }
    cleaned.trim().parse::<Decimal>().ok()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{coerce_field_value, match_option, validate_field_value, FieldRejection};
    use crate::domain::service::{FieldKind, FieldSpec};

    fn number(min: i64, max: i64) -> FieldSpec {
        FieldSpec {
            key: "count".to_string(),
            label: "Instance count".to_string(),
            kind: FieldKind::Number {
                min: Some(Decimal::from(min)),
                max: Some(Decimal::from(max)),
                unit: Some("instances".to_string()),
            },
            prompt: "How many?".to_string(),
            default: Some("1".to_string()),
        }
    }

    fn choice() -> FieldSpec {
        FieldSpec {
            key: "instanceType".to_string(),
            label: "Instance type".to_string(),
            kind: FieldKind::Choice {
                options: vec![
                    "ecs.t6.small".to_string(),
                    "ecs.g6.large".to_string(),
                    "ecs.g6.xlarge".to_string(),
                ],
            },
            prompt: "Which type?".to_string(),
            default: Some("ecs.g6.large".to_string()),
        }
    }

    #[test]
    fn number_interval_is_closed_on_both_ends() {
        let field = number(1, 100);

        assert_eq!(validate_field_value(&field, "1"), Ok("1".to_string()));
        assert_eq!(validate_field_value(&field, "100"), Ok("100".to_string()));
        assert_eq!(validate_field_value(&field, "0"), Err(FieldRejection::OutOfRange));
        assert_eq!(validate_field_value(&field, "101"), Err(FieldRejection::OutOfRange));
        assert_eq!(validate_field_value(&field, "100.01"), Err(FieldRejection::OutOfRange));
    }

    #[test]
    fn numbers_accept_units_and_separators_but_not_words() {
        let field = number(1, 5000);

        assert_eq!(validate_field_value(&field, " 2 instances "), Ok("2".to_string()));
        assert_eq!(validate_field_value(&field, "1,200"), Ok("1200".to_string()));
        assert_eq!(validate_field_value(&field, "2.50"), Ok("2.5".to_string()));
        assert_eq!(validate_field_value(&field, "two"), Err(FieldRejection::NotNumeric));
        assert_eq!(validate_field_value(&field, "   "), Err(FieldRejection::Empty));
    }

    #[test]
    fn options_match_case_insensitively_then_by_containment() {
        let field = choice();

        assert_eq!(validate_field_value(&field, "ECS.G6.XLARGE"), Ok("ecs.g6.xlarge".to_string()));
        assert_eq!(validate_field_value(&field, "g6"), Ok("ecs.g6.large".to_string()));
        assert_eq!(
            validate_field_value(&field, "I'd like ecs.t6.small please"),
            Ok("ecs.t6.small".to_string())
        );
        assert_eq!(validate_field_value(&field, "m5.large"), Err(FieldRejection::UnknownOption));
    }

    #[test]
    fn exact_match_wins_over_earlier_containment_match() {
        let options = vec!["Standard Plus".to_string(), "Standard".to_string()];
        assert_eq!(match_option(&options, "standard"), Some(&options[1]));
    }

    #[test]
    fn coercion_clamps_numbers_and_defaults_unknown_options() {
        assert_eq!(coerce_field_value(&number(1, 100), Some("250")), "100");
        assert_eq!(coerce_field_value(&number(1, 100), Some("0")), "1");
        assert_eq!(coerce_field_value(&number(1, 100), Some("lots")), "1");
        assert_eq!(coerce_field_value(&number(1, 100), None), "1");
        assert_eq!(coerce_field_value(&choice(), Some("m5.large")), "ecs.g6.large");
        assert_eq!(coerce_field_value(&choice(), Some("xlarge")), "ecs.g6.xlarge");
    }
}
