use crate::utils::error::{EtlError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: &str, reason: impl Into<String>) -> EtlError {
    EtlError::InvalidConfigValue {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| EtlError::MissingConfig {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            &value.to_string(),
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

/// Cloud Storage bucket naming rules (the subset that can be checked offline).
pub fn validate_gcs_bucket_name(field_name: &str, bucket_name: &str) -> Result<()> {
    if bucket_name.len() < 3 || bucket_name.len() > 222 {
        return Err(invalid(
            field_name,
            bucket_name,
            "Bucket name must be between 3 and 222 characters",
        ));
    }

    if !bucket_name.chars().all(|c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' || c == '.'
    }) {
        return Err(invalid(
            field_name,
            bucket_name,
            "Bucket name can only contain lowercase letters, numbers, hyphens, underscores, and dots",
        ));
    }

    let first = bucket_name.chars().next();
    let last = bucket_name.chars().last();
    let alnum = |c: Option<char>| c.map(|c| c.is_ascii_alphanumeric()).unwrap_or(false);
    if !alnum(first) || !alnum(last) {
        return Err(invalid(
            field_name,
            bucket_name,
            "Bucket name must start and end with a letter or number",
        ));
    }

    Ok(())
}

/// BigQuery dataset and table ids: letters, digits and underscores, at most 1024 chars.
pub fn validate_bigquery_identifier(field_name: &str, value: &str) -> Result<()> {
    validate_non_empty_string(field_name, value)?;

    if value.len() > 1024 {
        return Err(invalid(field_name, value, "Identifier is longer than 1024 characters"));
    }

    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid(
            field_name,
            value,
            "Identifier can only contain letters, numbers, and underscores",
        ));
    }

    Ok(())
}
