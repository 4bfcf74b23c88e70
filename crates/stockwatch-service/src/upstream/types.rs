use serde::Deserialize;

use stockwatch_core::product::ProductSnapshot;

#[derive(Debug, Clone, Deserialize)]
pub struct PincodeResponse {
    #[serde(default)]
    pub records: Vec<PincodeRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PincodeRecord {
    pub pincode: String,
    pub substore: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub tid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductsResponse {
    #[serde(default)]
    pub data: Vec<ProductSnapshot>,
}

/// Parses the `session = {...}` script returned by `/user/info.js`.
pub(crate) fn parse_session_script(body: &str) -> Result<SessionInfo, serde_json::Error> {
    let json = body.trim();
    let json = json.strip_prefix("session =").unwrap_or(json).trim();
    let json = json.strip_suffix(';').unwrap_or(json);
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_script_yields_tid() {
        let body = r#"session = {"tid":"abc123","data":{"isBot":false}};"#;
        let info = parse_session_script(body).unwrap();
        assert_eq!(info.tid.as_deref(), Some("abc123"));
    }

    #[test]
    fn pincode_records_ignore_extra_fields() {
        let raw = r#"{"records":[{"_id":"x","pincode":"110001","substore":"delhi","_size":1}],"count":1}"#;
        let parsed: PincodeResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.records,
            vec![PincodeRecord {
                pincode: "110001".to_string(),
                substore: "delhi".to_string()
            }]
        );
    }
}
