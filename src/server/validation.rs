use serde_json::Value;

use crate::error::{Error, Result};
use crate::server::dto::{CreateAssetRequest, UpdateAssetRequest};
use crate::types::{AssetChanges, NewAsset};

/// Any non-empty string is a valid name, including ones that cannot be
/// addressed through the `by_name` route.
pub fn validate_asset_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidData("Asset name cannot be empty".to_string()));
    }
    Ok(())
}

/// Asset data must be a structured document. A bare string is rejected even
/// if it happens to contain JSON text.
pub fn validate_asset_data(data: &Value) -> Result<()> {
    if data.is_string() {
        return Err(Error::InvalidData("JSON data is invalid".to_string()));
    }
    Ok(())
}

pub fn new_asset(req: CreateAssetRequest) -> Result<NewAsset> {
    validate_asset_name(&req.name)?;

    let data = req.data.unwrap_or_else(|| Value::Object(Default::default()));
    validate_asset_data(&data)?;

    Ok(NewAsset::new(req.name, data))
}

pub fn asset_changes(req: UpdateAssetRequest) -> Result<AssetChanges> {
    if let Some(name) = &req.name {
        validate_asset_name(name)?;
    }
    if let Some(data) = &req.data {
        validate_asset_data(data)?;
    }

    Ok(AssetChanges {
        name: req.name,
        data: req.data,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_only_empty_names_are_rejected() {
        assert!(matches!(validate_asset_name(""), Err(Error::InvalidData(_))));

        let long = "x".repeat(300);
        for name in ["Test asset", "db_prod", "   ", "env/db", "tab\tname", long.as_str()] {
            assert!(validate_asset_name(name).is_ok(), "{name:?} should be accepted");
        }
    }

    #[test]
    fn test_missing_data_defaults_to_empty_object() {
        let asset = new_asset(CreateAssetRequest {
            name: "New asset".to_string(),
            data: None,
        })
        .unwrap();
        assert_eq!(asset.data, json!({}));
    }

    #[test]
    fn test_string_data_is_rejected() {
        let result = new_asset(CreateAssetRequest {
            name: "New asset".to_string(),
            data: Some(json!("invalid json")),
        });
        assert!(matches!(result, Err(Error::InvalidData(_))));

        let result = asset_changes(UpdateAssetRequest {
            name: None,
            data: Some(json!("{\"k\": 1}")),
        });
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_structured_values_are_accepted() {
        for data in [json!({}), json!([1, 2]), json!(42), json!(true), json!({"k": {"n": [1]}})] {
            assert!(validate_asset_data(&data).is_ok(), "{data} should be accepted");
        }
    }

    #[test]
    fn test_changes_pass_through() {
        let changes = asset_changes(UpdateAssetRequest {
            name: Some("renamed".to_string()),
            data: None,
        })
        .unwrap();
        assert_eq!(changes.name.as_deref(), Some("renamed"));
        assert!(changes.data.is_none());
        assert!(asset_changes(UpdateAssetRequest::default()).unwrap().is_empty());
    }
}
