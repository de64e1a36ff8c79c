use core::str::FromStr;

use churchos_core::DomainError;

use crate::app::errors::ApiError;

/// Parse a path id, answering 400 in the uniform error shape.
pub fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(|e: DomainError| ApiError::bad_request(e.to_string()))
}
