//! Validation helpers for car payloads.

use validator::ValidationError;

/// Validates that a car name has at least one non-whitespace character.
pub fn validate_car_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("car_name_empty");
        err.message = Some("Car name must not be empty".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a color is a `#rrggbb` hex string (either case).
///
/// ```ignore
/// validate_car_color("#ff00AA") // Ok
/// validate_car_color("ff00aa")  // Err - missing hash
/// validate_car_color("#ff00a")  // Err - too short
/// ```
pub fn validate_car_color(color: &str) -> Result<(), ValidationError> {
    let Some(hex) = color.strip_prefix('#') else {
        let mut err = ValidationError::new("car_color_format");
        err.message = Some("Car color must start with `#`".into());
        return Err(err);
    };

    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        let mut err = ValidationError::new("car_color_format");
        err.message = Some(format!("Car color must be 6 hex digits (got `{color}`)").into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_car_name() {
        assert!(validate_car_name("Tesla Model S").is_ok());
        assert!(validate_car_name("").is_err());
        assert!(validate_car_name("   ").is_err());
    }

    #[test]
    fn test_validate_car_color_valid() {
        assert!(validate_car_color("#000000").is_ok());
        assert!(validate_car_color("#ff00AA").is_ok());
    }

    #[test]
    fn test_validate_car_color_invalid() {
        assert!(validate_car_color("ff00aa").is_err()); // missing hash
        assert!(validate_car_color("#ff00a").is_err()); // too short
        assert!(validate_car_color("#ff00aa0").is_err()); // too long
        assert!(validate_car_color("#gg00aa").is_err()); // invalid hex
    }
}
