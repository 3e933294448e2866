//! Validation logic for label and metric names.

const fn is_valid_start_name_char(ch: u8) -> bool {
    ch == b'_' || ch.is_ascii_lowercase()
}

const fn is_valid_name_char(ch: u8) -> bool {
    ch == b'_' || ch.is_ascii_lowercase() || ch.is_ascii_digit()
}

pub(crate) const fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("name cannot be empty");
    }

    let name_bytes = name.as_bytes();
    let mut idx = 0;
    while idx < name.len() {
        if name_bytes[idx] > 127 {
            return Err("name contains non-ASCII chars");
        }
        if idx == 0 && !is_valid_start_name_char(name_bytes[idx]) {
            return Err("name starts with disallowed char (allowed chars: [_a-z])");
        } else if !is_valid_name_char(name_bytes[idx]) {
            return Err("name contains disallowed char (allowed chars: [_a-z0-9])");
        }
        idx += 1;
    }
    Ok(())
}

pub(crate) fn validate_label_name(name: &str) -> Result<(), &'static str> {
    validate_name(name)?;
    if name.starts_with("__") {
        return Err("names starting with `__` are reserved");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validating_names() {
        let valid_names = ["test", "_private", "snake_case", "l33t_c0d3"];
        for name in valid_names {
            validate_name(name).unwrap();
            validate_label_name(name).unwrap();
        }

        validate_name("").unwrap_err();
        validate_name("нет").unwrap_err();
        validate_name("t!st").unwrap_err();
        validate_name("1est").unwrap_err();
        validate_name("Schema").unwrap_err();
    }

    #[test]
    fn reserved_label_names() {
        validate_name("__name__").unwrap();
        let err = validate_label_name("__name__").unwrap_err();
        assert!(err.contains("reserved"), "{err}");
    }
}
