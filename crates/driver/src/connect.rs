//! Connection-id parsing.
//!
//! Connection ids are URL-like, `<type>://<opaque locator>`. Only the type
//! tag is interpreted here; the locator is passed through to the driver.

use crate::error::DriverError;

/// Extract the lowercase data-source type tag from a connect id.
pub fn ds_type(connect_id: &str) -> Result<String, DriverError> {
    let (tag, _) = connect_id
        .split_once("://")
        .ok_or_else(|| DriverError::MalformedConnectId(connect_id.to_string()))?;

    if tag.is_empty() {
        return Err(DriverError::MalformedConnectId(connect_id.to_string()));
    }

    Ok(tag.to_ascii_lowercase())
}
