use crate::error::ApiError;

pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.len();
    if len < min || len > max {
        return Err(ApiError::BadRequest(format!(
            "{field} must be between {min} and {max} characters (got {len})"
        )));
    }
    Ok(())
}

pub fn check_name(field: &str, value: &str) -> Result<(), ApiError> {
    check_length(field, value, 1, 255)?;
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be blank")));
    }
    Ok(())
}

pub fn check_email(value: &str) -> Result<(), ApiError> {
    check_length("email", value, 3, 254)?;
    let Some((local, domain)) = value.split_once('@') else {
        return Err(ApiError::BadRequest("invalid email address".into()));
    };
    if local.is_empty() || domain.is_empty() || value.chars().any(char::is_whitespace) {
        return Err(ApiError::BadRequest("invalid email address".into()));
    }
    Ok(())
}

/// Phone numbers: digits plus the usual separators, 7-20 digits.
pub fn check_phone(value: &str) -> Result<(), ApiError> {
    check_length("phone", value, 1, 32)?;
    let allowed = value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'));
    let digits = value.chars().filter(char::is_ascii_digit).count();
    if !allowed || !(7..=20).contains(&digits) {
        return Err(ApiError::BadRequest("invalid phone number".into()));
    }
    Ok(())
}

pub fn check_url(value: &str) -> Result<(), ApiError> {
    check_length("url", value, 1, 2048)?;
    let parsed = url::Url::parse(value).map_err(|_| ApiError::BadRequest("invalid url".into()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::BadRequest(
            "url must use http or https scheme".into(),
        ));
    }
    Ok(())
}

pub fn check_non_negative(field: &str, value: i64) -> Result<(), ApiError> {
    if value < 0 {
        return Err(ApiError::BadRequest(format!("{field} must not be negative")));
    }
    Ok(())
}

/// Both bounds optional; when both are present `min` must not exceed `max`.
pub fn check_range<T: PartialOrd + Copy>(
    field: &str,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), ApiError> {
    if let (Some(lo), Some(hi)) = (min, max)
        && lo > hi
    {
        return Err(ApiError::BadRequest(format!(
            "{field}: minimum must not exceed maximum"
        )));
    }
    Ok(())
}

pub fn check_password(value: &str) -> Result<(), ApiError> {
    check_length("password", value, 8, 128)
}

/// Hex colour such as `#1e90ff` or `#fff`.
pub fn check_color(value: &str) -> Result<(), ApiError> {
    let Some(hex) = value.strip_prefix('#') else {
        return Err(ApiError::BadRequest("color must start with '#'".into()));
    };
    if !matches!(hex.len(), 3 | 6) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::BadRequest("color must be #rgb or #rrggbb".into()));
    }
    Ok(())
}

pub fn check_one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), ApiError> {
    if !allowed.contains(&value) {
        return Err(ApiError::BadRequest(format!(
            "{field} must be one of: {}",
            allowed.join(", ")
        )));
    }
    Ok(())
}

/// Collects field errors so a request reports every problem at once.
#[derive(Debug, Default)]
pub struct Checks {
    errors: Vec<String>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: Result<(), ApiError>) -> &mut Self {
        if let Err(err) = result {
            self.errors.push(match err {
                ApiError::BadRequest(msg) => msg,
                other => other.to_string(),
            });
        }
        self
    }

    /// Run `check` only when the optional value is present.
    pub fn opt<T>(
        &mut self,
        value: Option<T>,
        check: impl FnOnce(T) -> Result<(), ApiError>,
    ) -> &mut Self {
        if let Some(v) = value {
            self.add(check(v));
        }
        self
    }

    pub fn required<T>(&mut self, field: &str, value: Option<&T>) -> &mut Self
    where
        T: ?Sized,
    {
        if value.is_none() {
            self.errors.push(format!("{field} is required"));
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}
