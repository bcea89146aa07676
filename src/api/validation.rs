use crate::error::AppError;

/// Trim `value` and require 1..=`max_len` characters
pub fn required_text(field: &str, value: &str, max_len: usize) -> Result<String, AppError> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    if trimmed.chars().count() > max_len {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }

    Ok(trimmed.to_string())
}

/// Like `required_text`, but absent or blank input is `None`
pub fn optional_text(
    field: &str,
    value: Option<&str>,
    max_len: usize,
) -> Result<Option<String>, AppError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => required_text(field, v, max_len).map(Some),
    }
}

pub fn score_in_range(field: &str, value: i64, min: i64, max: i64) -> Result<i64, AppError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(AppError::Validation(format!(
            "{} must be between {} and {}",
            field, min, max
        )))
    }
}

/// Validate and normalize a username
pub fn username(username: &str) -> Result<String, AppError> {
    let trimmed = username.trim();

    if trimmed.len() < 3 || trimmed.len() > 32 {
        return Err(AppError::Validation("Username must be 3-32 characters".to_string()));
    }

    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::Validation(
            "Username must be alphanumeric, underscore, or hyphen".to_string(),
        ));
    }

    // Convert to lowercase for consistency
    Ok(trimmed.to_lowercase())
}

pub fn email(email: &str) -> Result<String, AppError> {
    let trimmed = email.trim().to_lowercase();

    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        None => false,
    };

    if !valid || trimmed.len() > 254 || trimmed.chars().any(char::is_whitespace) {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }

    Ok(trimmed)
}

pub fn password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if password.len() > 256 {
        return Err(AppError::Validation("Password is too long".to_string()));
    }

    Ok(())
}
